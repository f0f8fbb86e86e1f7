//! Call/pcall and coroutine control (spec §6.1 "Call/pcall").

use quill_core::Value;
use quill_gc::GcObjectId;

use crate::error::{EmbedResult, VmStatus};
use crate::state::State;

/// Invoke `func` with `args`, propagating any error (spec §6.1's
/// unprotected call).
pub fn call(state: &mut State, thread: GcObjectId, func: Value, args: &[Value], nresults: usize) -> EmbedResult<Vec<Value>> {
    Ok(quill_vm::call_for_results(&mut state.global, thread, func, args, nresults)?)
}

/// The protected variant: errors are captured as `Err(VmError)` instead
/// of propagating past this call (spec §6.1, §7's "Protected call").
pub fn pcall(state: &mut State, thread: GcObjectId, func: Value, args: &[Value], nresults: usize) -> (VmStatus, Vec<Value>) {
    quill_vm::protected_call(&mut state.global, thread, func, args, None, nresults)
}

pub fn is_yieldable(state: &State, thread: GcObjectId) -> bool {
    quill_vm::coroutine::is_yieldable(&state.global, thread)
}

/// `lua_status` (spec §6.1's debug surface, coroutine status query).
pub fn coroutine_status(state: &State, thread: GcObjectId, is_running: bool) -> VmStatus {
    quill_vm::coroutine::status(&state.global, thread, is_running)
}

/// `coroutine.create`: `body` must be a Lua closure (spec §4.11).
pub fn create_coroutine(state: &mut State, body: Value) -> EmbedResult<GcObjectId> {
    Ok(quill_vm::coroutine::create(&mut state.global, body)?)
}

/// `coroutine.resume` (spec §4.11, §8 scenario S4).
pub fn resume_coroutine(state: &mut State, thread: GcObjectId, args: &[Value]) -> (VmStatus, Vec<Value>) {
    quill_vm::coroutine::resume(&mut state.global, thread, args)
}

/// `coroutine.close`: force-close a suspended or dead coroutine.
pub fn close_coroutine(state: &mut State, thread: GcObjectId) -> EmbedResult<()> {
    Ok(quill_vm::coroutine::close(&mut state.global, thread)?)
}
