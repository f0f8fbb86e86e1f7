//! State lifecycle (spec §6.1 "State lifecycle").
//!
//! Grounded on `faxc-runtime::gc`'s init/shutdown pair, but instance-owned
//! rather than a process-wide `OnceLock`: spec §5 requires multiple
//! independent VM instances, so construction just returns an owned value
//! instead of reaching for a static.

use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::config::VmConfig;

/// One embeddable VM instance: the object arena, collector, and main
/// thread, configured from a [`VmConfig`] (spec §6.1/§6.3).
pub struct State {
    pub(crate) global: GlobalState,
    pub(crate) main_thread: GcObjectId,
}

impl State {
    /// `new_state(alloc, seed)` (spec §6.1) — the allocator facade is
    /// `quill-gc`'s own debt-tracking allocator (component D), always
    /// present; `seed` seeds the string/table hash (`None` draws from OS
    /// randomness, spec §9's open question resolved in that direction).
    pub fn new_state(config: &VmConfig, seed: Option<u64>) -> Self {
        let mut global = GlobalState::new(config.to_gc_config(), seed.or(config.hash_seed));
        global.heap.set_short_string_cap(config.short_string_cap);
        let main_thread = global.heap.main_thread;
        {
            let th = global.heap.thread_mut(main_thread);
            th.max_c_calls = config.max_c_calls;
        }
        let _ = quill_vm::callinfo::ensure_stack(&mut global, main_thread, config.min_stack);
        tracing::debug!(short_string_cap = config.short_string_cap, max_c_calls = config.max_c_calls, min_stack = config.min_stack, "state constructed");
        State { global, main_thread }
    }

    /// The main thread every `State` starts with (spec §3.6); coroutines
    /// created from it are independent `GcObjectId`s tracked by the same
    /// arena.
    pub fn main_thread(&self) -> GcObjectId {
        self.main_thread
    }

    pub fn global(&self) -> &GlobalState {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut GlobalState {
        &mut self.global
    }

    /// `close(state)` (spec §6.1): run every coroutine's pending
    /// to-be-closed variables and finalizers, then drop the arena. In
    /// this port that's just `Drop` on `GlobalState` plus the main
    /// thread's own to-be-closed unwind, since there is no separate
    /// native resource to release beyond the Rust allocations the arena
    /// already owns.
    pub fn close(mut self) {
        if let Err(e) = quill_vm::tbc::close_from(&mut self.global, self.main_thread, 0, None, |_, _, _, _| Ok(())) {
            tracing::warn!(error = %e, "error unwinding to-be-closed variables during state close");
        }
    }

    pub fn push_nil(&mut self, thread: GcObjectId) {
        self.global.heap.thread_mut(thread).push_value(Value::NIL);
    }
}
