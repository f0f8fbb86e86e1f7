//! To-be-closed variable bookkeeping (component L, spec §4.12).
//!
//! A local marked `<close>` has its `__close` metamethod invoked when the
//! block exits, in reverse declaration order, whether the exit is normal,
//! a `break`/`goto`, or an unwinding error. Grounded on `lvm.c`'s
//! `luaV_poscall`/`luaD_closeprotected` for the "close down to this
//! level" shape and `ldebug.c`'s `luaG_close` for the error-during-close
//! rule.

use quill_core::metamethod::MetaEvent;
use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::error::{VmError, VmResult};

/// Record `register` as to-be-closed. `value` must already be nil, false,
/// or have a `__close` metamethod (spec §4.12's "checked at the point the
/// local is declared").
pub fn mark_tbc(state: &mut GlobalState, thread: GcObjectId, register: usize, value: Value) -> VmResult<()> {
    if value.is_nil() || matches!(value, Value::Boolean(false)) {
        state.heap.thread_mut(thread).tbc_list.push(register);
        return Ok(());
    }
    let close_mm = state.heap.get_metamethod(&value, MetaEvent::Close);
    if close_mm.is_nil() {
        return Err(VmError::Core(quill_core::CoreError::TypeError { op: "close", ty: "value" }));
    }
    state.heap.thread_mut(thread).tbc_list.push(register);
    Ok(())
}

/// Pop and close every to-be-closed variable at or above `from_register`,
/// LIFO, substituting `error_in_flight` into the callback `invoke_close`
/// as the value passed to `__close`. If closing one of them raises, that
/// new error replaces `error_in_flight` for subsequent closes and for the
/// caller (spec §4.12: "an error during close supersedes the pending
/// error but every remaining variable still gets a chance to close").
///
/// `invoke_close` is supplied by `interp.rs`/`unwind.rs` since actually
/// calling the `__close` function requires the call machinery this
/// module doesn't have access to. It receives the `__close` function,
/// the to-be-closed value itself (`__close`'s first argument), and the
/// pending error (`__close`'s second argument, nil on a normal exit).
pub fn close_from(
    state: &mut GlobalState,
    thread: GcObjectId,
    from_register: usize,
    mut error_in_flight: Option<Value>,
    mut invoke_close: impl FnMut(&mut GlobalState, Value, Value, Value) -> VmResult<()>,
) -> VmResult<()> {
    loop {
        let next = {
            let list = &mut state.heap.thread_mut(thread).tbc_list;
            match list.last().copied() {
                Some(r) if r >= from_register => list.pop(),
                _ => None,
            }
        };
        let Some(register) = next else { break };
        let value = state.heap.thread(thread).stack.get(register).copied().unwrap_or(Value::NIL);
        if value.is_nil() || matches!(value, Value::Boolean(false)) {
            continue;
        }
        let close_mm = state.heap.get_metamethod(&value, MetaEvent::Close);
        let err_value = error_in_flight.unwrap_or(Value::NIL);
        if let Err(e) = invoke_close(state, close_mm, value, err_value) {
            error_in_flight = Some(match e {
                VmError::Raised(v) => v,
                other => other.into_value(state),
            });
        }
    }
    match error_in_flight {
        Some(v) => Err(VmError::Raised(v)),
        None => Ok(()),
    }
}
