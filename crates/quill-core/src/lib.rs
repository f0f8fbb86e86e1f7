//! quill-core — the tagged-value object model: `Value`, string interning,
//! `Table`, closures/upvalues, function prototypes, threads, and the
//! object arena (`GlobalState`) that ties them to `quill-gc`.
//!
//! This crate has no interpreter loop and no opcode encoding of its own —
//! those live in `quill-vm`, which depends on this crate the way `lvm.c`
//! depends on `lobject.c`/`ltable.c`/`lstate.c` in the source this engine
//! is modeled on. What stays here is everything the collector needs to
//! see (`quill_gc::heap::Heap`, implemented by `ObjectHeap`) and every
//! operation that doesn't require running bytecode: raw table access,
//! string interning, metamethod *lookup* (not invocation), upvalue
//! open/close bookkeeping.

pub mod closure;
pub mod error;
pub mod global_state;
pub mod metamethod;
pub mod object;
pub mod opcode;
pub mod proto;
pub mod string_table;
pub mod table;
pub mod thread;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use global_state::{GlobalState, ObjectHeap};
pub use metamethod::{MetaEvent, MetaSearchOrder};
pub use object::GcObject;
pub use opcode::{ArithOp, Instruction};
pub use proto::Proto;
pub use table::{Table, TableKeyOps};
pub use value::{HostFn, TypeTag, Value};
