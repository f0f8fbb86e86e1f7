//! Call-frame lifecycle (component H, spec §4.8).
//!
//! Grounded on `ldo.c`'s `luaD_precall`/`luaD_poscall`/`luaD_call`. Stack
//! slots are always addressed as absolute indices into `Thread::stack`,
//! never as raw references — spec §4.8/§5's stack-reallocation invariant
//! ("any code path that holds a raw pointer into the value stack across
//! an operation that can allocate must save it as an index").

use quill_core::thread::{CallInfo, CallInfoKind, ExpectedResults};
use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::error::{VmError, VmResult};

/// Grow `thread`'s stack so slots `0..needed` exist, filling new slots
/// with nil (spec §4.8 "Stack growth").
pub fn ensure_stack(state: &mut GlobalState, thread: GcObjectId, needed: usize) -> VmResult<()> {
    let th = state.heap.thread_mut(thread);
    if th.stack.len() >= needed {
        return Ok(());
    }
    let added = needed - th.stack.len();
    th.stack.resize(needed, Value::NIL);
    state.notify_alloc(added * std::mem::size_of::<Value>())?;
    Ok(())
}

/// Base register for a frame whose function sits at `func_slot` (the
/// source's `ci->func + 1` convention).
pub fn base_of(func_slot: usize) -> usize {
    func_slot + 1
}

/// Adjust a vararg call's arguments (spec §4.8 step 1): split the actual
/// arguments into the fixed parameters (kept in place at `base`) and
/// anything beyond `num_params`, which is lifted out and handed back so
/// the caller can stash it on the new `CallInfo` for `VARARG` to read
/// later (spec §4.8's "..." expression). Returns `(new_base, extra_args)`.
pub fn adjust_varargs(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, num_params: usize, is_vararg: bool) -> VmResult<(usize, Vec<Value>)> {
    let old_base = func_slot + 1;
    let th = state.heap.thread(thread);
    let nargs = th.stack.len().saturating_sub(old_base);
    if !is_vararg || nargs <= num_params {
        return Ok((old_base, Vec::new()));
    }
    let extra_args: Vec<Value> = th.stack[old_base + num_params..old_base + nargs].to_vec();
    let th = state.heap.thread_mut(thread);
    th.stack.truncate(old_base + num_params);
    Ok((old_base, extra_args))
}

/// Fill declared parameters the caller didn't supply with nil, and clear
/// up to `max_stack_size` registers above base (spec §4.8 step 2-3).
pub fn prepare_registers(state: &mut GlobalState, thread: GcObjectId, base: usize, num_params: usize, max_stack_size: usize) -> VmResult<()> {
    ensure_stack(state, thread, base + max_stack_size)?;
    let th = state.heap.thread_mut(thread);
    let have = th.stack.len().saturating_sub(base).min(num_params);
    for i in have..num_params {
        th.stack[base + i] = Value::NIL;
    }
    for i in num_params.max(have)..max_stack_size {
        if base + i < th.stack.len() {
            th.stack[base + i] = Value::NIL;
        }
    }
    Ok(())
}

/// Push a Lua frame on top of `thread`'s call-info chain (spec §4.8
/// "Frame lifecycle — Lua callee").
pub fn push_lua_call(
    state: &mut GlobalState,
    thread: GcObjectId,
    func_slot: usize,
    closure: GcObjectId,
    proto: GcObjectId,
    expected_results: ExpectedResults,
) -> VmResult<()> {
    let p = state.heap.proto(proto).clone();
    let (base, extra_args) = adjust_varargs(state, thread, func_slot, p.num_params as usize, p.is_vararg)?;
    prepare_registers(state, thread, base, p.num_params as usize, p.max_stack_size as usize)?;
    let th = state.heap.thread_mut(thread);
    if th.call_infos.len() as u32 >= 200_000 {
        return Err(VmError::StackOverflow);
    }
    let mut ci = CallInfo::new_lua(func_slot, base + p.max_stack_size as usize, proto, closure);
    ci.expected_results = expected_results;
    ci.extra_args = extra_args;
    th.call_infos.push(ci);
    Ok(())
}

/// Push a C (host) frame (spec §4.8 "Frame lifecycle — C callee").
pub fn push_c_call(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, expected_results: ExpectedResults) -> VmResult<()> {
    let th = state.heap.thread_mut(thread);
    if th.nested_c_calls >= th.max_c_calls {
        return Err(VmError::TooManyCCalls);
    }
    th.nested_c_calls += 1;
    let top = th.stack.len();
    let mut ci = CallInfo::new_c(func_slot, top);
    ci.expected_results = expected_results;
    th.call_infos.push(ci);
    Ok(())
}

/// Write `results` at `func_slot`, truncating or nil-padding to whatever
/// `expected` calls for (spec §4.8 step 4's result-adjustment rule).
/// Shared by [`poscall`] and coroutine resume, which performs the same
/// adjustment for the values a `yield` call receives back.
pub fn land_results(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, expected: ExpectedResults, results: &[Value]) -> usize {
    let th = state.heap.thread_mut(thread);
    let wanted = match expected {
        ExpectedResults::Fixed(n) => n as usize,
        ExpectedResults::Variadic => results.len(),
    };
    th.stack.truncate(func_slot);
    for i in 0..wanted {
        let v = results.get(i).copied().unwrap_or(Value::NIL);
        if func_slot + i < th.stack.len() {
            th.stack[func_slot + i] = v;
        } else {
            th.stack.push(v);
        }
    }
    th.stack.truncate(func_slot + wanted);
    wanted
}

/// Move `results` down to the callee's function slot and pop its
/// `CallInfo`, truncating/padding to the caller's expectation (spec
/// §4.8 step 4, §8's tail-call result-adjustment boundary behavior).
pub fn poscall(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, results: &[Value]) -> VmResult<usize> {
    let ci = state.heap.thread_mut(thread).call_infos.pop().expect("poscall with no active frame");
    if ci.is_c() {
        let th = state.heap.thread_mut(thread);
        th.nested_c_calls = th.nested_c_calls.saturating_sub(1);
    }
    Ok(land_results(state, thread, func_slot, ci.expected_results, results))
}

pub fn current_proto(state: &GlobalState, thread: GcObjectId) -> Option<GcObjectId> {
    match &state.heap.thread(thread).current_call_info()?.kind {
        CallInfoKind::Lua { proto, .. } => Some(*proto),
        CallInfoKind::C { .. } => None,
    }
}
