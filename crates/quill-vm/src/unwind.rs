//! Error propagation and the protected-call boundary (component J, spec
//! §4.10).
//!
//! Grounded on `ldo.c`'s `luaD_throw`/`luaD_rawrunprotected` and `lvm.c`'s
//! `luaV_execute` error paths. Quill has no C stack to longjmp out of, so
//! "throw" here is a plain `Result::Err` that the interpreter loop and
//! `pcall`'s host function both propagate with `?`; this module is the
//! bookkeeping that has to happen at the boundary regardless of how the
//! error got there: closing to-be-closed variables between the fault and
//! the nearest protected frame, and restoring the stack to where the
//! protected call started.

use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::error::{VmError, VmResult};
use crate::tbc::close_from;

/// A snapshot taken when a protected call begins, so unwinding can put
/// the thread back exactly as `pcall` found it (spec §4.10 step 1).
#[derive(Clone, Copy, Debug)]
pub struct ProtectedMark {
    pub call_info_depth: usize,
    pub stack_top: usize,
    pub nested_c_calls: u32,
}

pub fn mark_protected(state: &GlobalState, thread: GcObjectId) -> ProtectedMark {
    let th = state.heap.thread(thread);
    ProtectedMark { call_info_depth: th.call_infos.len(), stack_top: th.stack.len(), nested_c_calls: th.nested_c_calls }
}

/// Unwind `thread` back to `mark` after a protected call fails: close any
/// to-be-closed variables opened after the mark was taken, pop the call
/// frames pushed since, and truncate the stack (spec §4.10 steps 2-4).
///
/// `invoke_close` has the same shape as [`crate::tbc::close_from`]'s
/// callback; `error_in_flight` is the error that triggered the unwind and
/// becomes the value `pcall` returns unless closing a variable replaces
/// it.
pub fn unwind_to(
    state: &mut GlobalState,
    thread: GcObjectId,
    mark: ProtectedMark,
    error_in_flight: Value,
    invoke_close: impl FnMut(&mut GlobalState, Value, Value, Value) -> VmResult<()>,
) -> Value {
    let close_result = close_from(state, thread, mark.stack_top, Some(error_in_flight), invoke_close);
    let th = state.heap.thread_mut(thread);
    th.call_infos.truncate(mark.call_info_depth);
    th.nested_c_calls = mark.nested_c_calls;
    th.stack.truncate(mark.stack_top);
    th.stack.resize(mark.stack_top, Value::NIL);
    match close_result {
        Err(VmError::Raised(v)) => v,
        Err(other) => other.into_value(state),
        Ok(()) => error_in_flight,
    }
}

/// The error-in-error-handler guard (spec §4.10: "if the message handler
/// itself errors, stop recursing and report a fixed error instead").
/// `depth` is how many message handlers are currently nested for this
/// protected call; anything past one nested handler triggers the guard.
pub fn guard_handler_recursion(depth: u32, handler_error: Value) -> VmError {
    if depth > 0 {
        VmError::ErrorInHandler(handler_error)
    } else {
        VmError::Raised(handler_error)
    }
}
