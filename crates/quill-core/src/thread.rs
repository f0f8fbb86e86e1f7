//! Thread (coroutine) state and the call-info chain (components H, K).
//!
//! Grounded on `lstate.h`'s `lua_State`/`CallInfo` and spec §3.6, §4.8,
//! §4.11. `quill-vm`'s interpreter owns *dispatch* (what an opcode does to
//! a `Thread`); this module owns the state the dispatch loop mutates.

use quill_gc::GcObjectId;

use crate::value::{HostFn, Value};

/// Default minimum stack size available to a host callee (spec §6.3).
pub const DEFAULT_MIN_STACK: usize = 20;
/// Default maximum nested host-call depth (spec §6.3).
pub const DEFAULT_MAX_CCALLS: u32 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Ok,
    Yield,
    ErrRun,
    ErrSyntax,
    ErrMem,
    ErrErr,
}

/// How many results a call site expects back (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedResults {
    Fixed(u8),
    /// `C = 0` in the source: "fill to top", i.e. all results.
    Variadic,
}

/// A continuation registered by a host function so it can resume after a
/// yield without unwinding the host's own call stack (spec §4.11).
#[derive(Clone, Copy)]
pub struct Continuation {
    pub func: HostFn,
    pub context: i64,
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation").field("context", &self.context).finish()
    }
}

#[derive(Clone, Debug)]
pub enum CallInfoKind {
    Lua { proto: GcObjectId, closure: GcObjectId, saved_pc: usize },
    C { continuation: Option<Continuation> },
}

#[derive(Clone, Debug)]
pub struct CallInfo {
    /// Stack index of the called function itself.
    pub func_slot: usize,
    /// Highest register this frame is currently using.
    pub top: usize,
    pub kind: CallInfoKind,
    pub expected_results: ExpectedResults,
    pub is_tail_call: bool,
    pub is_hook: bool,
    /// `true` if a yield across this C frame is permitted (spec §4.8's
    /// "yieldable-protected-call" flag).
    pub yieldable: bool,
    pub has_to_be_closed: bool,
    pub in_finalization: bool,
    /// Index into the owning thread's `tbc_list`/error-handler stack in
    /// effect when this frame was pushed, restored on unwind.
    pub saved_error_handler: Option<usize>,
    /// Extra positional arguments beyond the prototype's fixed parameters,
    /// set aside by `adjust_varargs` for a vararg function (spec §4.8's
    /// "..." expression). Always empty for a `C` frame.
    pub extra_args: Vec<Value>,
    /// Set just before a `yield` suspends execution mid-`CALL`: the
    /// function slot and expected-result arity of the call that is
    /// yielding, so `resume` can land its arguments through the same
    /// result-adjustment rule an ordinary return uses (spec §4.11).
    pub pending_call: Option<(usize, ExpectedResults)>,
}

impl CallInfo {
    pub fn new_lua(func_slot: usize, top: usize, proto: GcObjectId, closure: GcObjectId) -> Self {
        CallInfo {
            func_slot,
            top,
            kind: CallInfoKind::Lua { proto, closure, saved_pc: 0 },
            expected_results: ExpectedResults::Fixed(0),
            is_tail_call: false,
            is_hook: false,
            yieldable: true,
            has_to_be_closed: false,
            in_finalization: false,
            saved_error_handler: None,
            extra_args: Vec::new(),
            pending_call: None,
        }
    }

    pub fn new_c(func_slot: usize, top: usize) -> Self {
        CallInfo {
            func_slot,
            top,
            kind: CallInfoKind::C { continuation: None },
            expected_results: ExpectedResults::Fixed(0),
            is_tail_call: false,
            is_hook: false,
            yieldable: true,
            has_to_be_closed: false,
            in_finalization: false,
            saved_error_handler: None,
            extra_args: Vec::new(),
            pending_call: None,
        }
    }

    pub fn is_c(&self) -> bool {
        matches!(self.kind, CallInfoKind::C { .. })
    }
}

/// One open upvalue, pointed at by register slot for fast sorted-insert
/// during closure creation (spec §4.6).
#[derive(Clone, Copy, Debug)]
struct OpenUpvalue {
    register: usize,
    handle: GcObjectId,
}

/// A thread of execution: its own stack and call-info chain, sharing the
/// rest of the VM (string table, GC, registry) via `GlobalState` (spec
/// §3.6). The main thread lives embedded in `GlobalState` itself.
#[derive(Clone, Debug)]
pub struct Thread {
    pub stack: Vec<Value>,
    pub call_infos: Vec<CallInfo>,
    open_upvalues: Vec<OpenUpvalue>,
    /// Stack indices marked `<close>`, LIFO (spec §4.12).
    pub tbc_list: Vec<usize>,
    pub status: ThreadStatus,
    pub nested_c_calls: u32,
    /// Nested host-call depth ceiling (spec §6.3), copied from
    /// [`DEFAULT_MAX_CCALLS`] at construction and overridable per-instance
    /// by an embedder's configuration.
    pub max_c_calls: u32,
    pub non_yieldable_depth: u32,
    pub hook_mask: u8,
    /// Hook-count reload value for the count hook; stored for an
    /// embedder to read back, not consulted by the dispatch loop.
    pub hook_count: u32,
    /// `true` while this thread is the one actually running (spec
    /// §4.11's `status` distinguishes `running` from `normal`).
    pub is_running: bool,
}

impl Thread {
    pub fn new() -> Self {
        Thread {
            stack: vec![Value::NIL; DEFAULT_MIN_STACK],
            call_infos: Vec::new(),
            open_upvalues: Vec::new(),
            tbc_list: Vec::new(),
            status: ThreadStatus::Ok,
            nested_c_calls: 0,
            max_c_calls: DEFAULT_MAX_CCALLS,
            non_yieldable_depth: 0,
            hook_mask: 0,
            hook_count: 0,
            is_running: false,
        }
    }

    pub fn is_yieldable(&self) -> bool {
        self.non_yieldable_depth == 0
    }

    /// Reuse an existing open upvalue for `register` if one is already
    /// tracked, otherwise caller allocates a new one and calls
    /// [`Thread::track_open_upvalue`] (spec §4.6's "look up, reuse else
    /// allocate").
    pub fn find_open_upvalue(&self, register: usize) -> Option<GcObjectId> {
        self.open_upvalues.iter().find(|u| u.register == register).map(|u| u.handle)
    }

    pub fn track_open_upvalue(&mut self, register: usize, handle: GcObjectId) {
        let pos = self.open_upvalues.partition_point(|u| u.register < register);
        self.open_upvalues.insert(pos, OpenUpvalue { register, handle });
    }

    /// Every open upvalue at or above `from_register`, in ascending
    /// order — the set a frame exit must close (spec §4.6).
    pub fn open_upvalues_from(&self, from_register: usize) -> Vec<GcObjectId> {
        self.open_upvalues.iter().filter(|u| u.register >= from_register).map(|u| u.handle).collect()
    }

    pub fn untrack_closed_from(&mut self, from_register: usize) {
        self.open_upvalues.retain(|u| u.register < from_register);
    }

    pub fn open_upvalue_handles(&self) -> impl Iterator<Item = GcObjectId> + '_ {
        self.open_upvalues.iter().map(|u| u.handle)
    }

    pub fn push_value(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub fn current_call_info(&self) -> Option<&CallInfo> {
        self.call_infos.last()
    }

    pub fn current_call_info_mut(&mut self) -> Option<&mut CallInfo> {
        self.call_infos.last_mut()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Objects a [`Thread`] references; used by `GlobalState`'s `trace_children`.
pub fn trace_thread(t: &Thread, mut out: impl FnMut(GcObjectId)) {
    for v in &t.stack {
        if let Value::Object(id) = v {
            out(*id);
        }
    }
    for u in &t.open_upvalues {
        out(u.handle);
    }
    for ci in &t.call_infos {
        if let CallInfoKind::Lua { proto, closure, .. } = &ci.kind {
            out(*proto);
            out(*closure);
        }
    }
}
