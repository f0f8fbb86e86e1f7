//! quill-vm — the bytecode dispatch loop, call-frame lifecycle, and
//! everything that only makes sense while bytecode is running: inline
//! arithmetic, metamethod *invocation*, protected calls, to-be-closed
//! unwinding, and coroutines.
//!
//! Grounded on `lvm.c`/`ldo.c`/`ldebug.c`'s split from `lobject.c`/
//! `ltable.c`/`lstate.c`: `quill-core` owns the data, this crate owns the
//! loop that walks it. [`interp::run`] is the trampoline every Lua call
//! re-enters, which is what lets [`coroutine::resume`] suspend and resume
//! a thread at arbitrary call depth without unwinding the host's own
//! Rust stack.

pub mod arith;
pub mod callinfo;
pub mod coroutine;
pub mod error;
pub mod interp;
pub mod metamethod_dispatch;
pub mod tbc;
pub mod unwind;

pub use error::{VmError, VmResult, VmStatus};
pub use interp::{call_for_results, call_value, protected_call, run, RunOutcome};
