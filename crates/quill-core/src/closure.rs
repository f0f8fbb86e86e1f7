//! Closures and upvalues (component F).
//!
//! Grounded on `lobject.h`'s `LClosure`/`CClosure`/`UpVal` and spec §4.6's
//! open/closed transition.

use quill_gc::GcObjectId;

use crate::value::{HostFn, Value};

/// An upvalue is either a live window into a frame's register, or an
/// owned value once that frame has exited (spec §3.5, §4.6).
#[derive(Clone, Debug)]
pub enum UpvalueState {
    /// `thread` + `register` locate the live stack slot. Kept as a
    /// `(GcObjectId, usize)` pair rather than a raw pointer so a stack
    /// reallocation never invalidates it (spec §4.8's stack-reallocation
    /// invariant, §5's "save as index, re-derive after").
    Open { thread: GcObjectId, register: usize },
    Closed(Value),
}

#[derive(Clone, Debug)]
pub struct Upvalue {
    pub state: UpvalueState,
}

impl Upvalue {
    pub fn open(thread: GcObjectId, register: usize) -> Self {
        Upvalue { state: UpvalueState::Open { thread, register } }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, UpvalueState::Open { .. })
    }
}

/// A Lua-level closure: a `Proto` plus the upvalues it captured at
/// creation time (spec §3.5).
#[derive(Clone, Debug)]
pub struct LuaClosure {
    pub proto: GcObjectId,
    pub upvalues: Vec<GcObjectId>,
}

/// A host closure: fixed function pointer plus captured values inline —
/// no upvalue indirection, since host code cannot observe Lua's
/// open/closed distinction (spec §3.5).
#[derive(Clone)]
pub struct CClosure {
    pub func: HostFn,
    pub upvalues: Vec<Value>,
}

impl std::fmt::Debug for CClosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CClosure").field("upvalues", &self.upvalues.len()).finish()
    }
}

pub fn trace_lua_closure(c: &LuaClosure, mut out: impl FnMut(GcObjectId)) {
    out(c.proto);
    for &u in &c.upvalues {
        out(u);
    }
}

pub fn trace_cclosure(c: &CClosure, mut out: impl FnMut(GcObjectId)) {
    for v in &c.upvalues {
        if let Value::Object(id) = v {
            out(*id);
        }
    }
}

pub fn trace_upvalue(u: &Upvalue, mut out: impl FnMut(GcObjectId)) {
    match &u.state {
        UpvalueState::Open { thread, .. } => out(*thread),
        UpvalueState::Closed(Value::Object(id)) => out(*id),
        UpvalueState::Closed(_) => {}
    }
}
