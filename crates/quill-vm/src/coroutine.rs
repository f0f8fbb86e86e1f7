//! Coroutines (component K, spec §4.11).
//!
//! Grounded on `lstate.h`'s per-thread status byte and `ldo.c`'s
//! `luaD_call`/`luaD_pretailcall` resume path, realized here on top of
//! [`crate::interp::run`]'s trampoline: a coroutine's `Thread` just sits
//! idle with its `call_infos` stack intact across a yield, and `resume`
//! re-enters [`crate::interp::run`] on that same thread so execution
//! picks back up exactly where `coroutine.yield` left off.

use quill_core::thread::{ExpectedResults, ThreadStatus};
use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::error::{VmError, VmResult, VmStatus};
use crate::interp::{self, RunOutcome};

/// Create a new coroutine wrapping `body` (must be a Lua closure; the
/// source forbids wrapping a C function directly, spec §4.11).
pub fn create(state: &mut GlobalState, body: Value) -> VmResult<GcObjectId> {
    let Value::Object(closure_id) = body else {
        return Err(VmError::Core(quill_core::CoreError::TypeError { op: "create a coroutine from", ty: body.type_name_primitive().unwrap_or("value") }));
    };
    if state.heap.object_as_lua_closure(closure_id).is_none() {
        return Err(VmError::Core(quill_core::CoreError::TypeError { op: "create a coroutine from", ty: "non-function" }));
    }
    let thread_id = state.heap.new_thread()?;
    {
        let th = state.heap.thread_mut(thread_id);
        th.stack.push(body);
        th.non_yieldable_depth = 0;
    }
    tracing::trace!(thread = ?thread_id, "coroutine created");
    Ok(thread_id)
}

pub fn status(state: &GlobalState, thread: GcObjectId, is_running: bool) -> VmStatus {
    if is_running {
        return VmStatus::Yield; // caller distinguishes "running"/"normal" itself; Ok means freshly made or finished-resumable
    }
    VmStatus::from(state.heap.thread(thread).status)
}

/// `coroutine.resume` (spec §4.11 step 2-4). Drives `thread`'s dispatch
/// loop until it yields, returns, or errors; `args` are either the
/// initial call arguments (first resume) or the values `yield` returns
/// to the coroutine (subsequent resumes).
pub fn resume(state: &mut GlobalState, thread: GcObjectId, args: &[Value]) -> (VmStatus, Vec<Value>) {
    match state.heap.thread(thread).status {
        ThreadStatus::ErrRun | ThreadStatus::ErrSyntax | ThreadStatus::ErrMem | ThreadStatus::ErrErr => {
            return (VmStatus::ErrRun, vec![dead_coroutine_error(state)]);
        }
        ThreadStatus::Ok if state.heap.thread(thread).call_infos.is_empty() && state.heap.thread(thread).stack.is_empty() => {
            return (VmStatus::ErrRun, vec![dead_coroutine_error(state)]);
        }
        _ => {}
    }

    let first_resume = state.heap.thread(thread).call_infos.is_empty();
    tracing::debug!(thread = ?thread, first_resume, "coroutine resume");
    {
        let th = state.heap.thread_mut(thread);
        th.is_running = true;
        th.status = ThreadStatus::Ok;
    }

    let result = if first_resume {
        let func_slot = 0;
        for a in args {
            state.heap.thread_mut(thread).push_value(*a);
        }
        match crate::callinfo::ensure_stack(state, thread, func_slot + 1 + args.len()) {
            Ok(()) => {}
            Err(e) => return (e.status(), vec![e.into_value(state)]),
        }
        // Push the body's frame directly and drive it with `run`, rather
        // than going through `call_value` (whose `RunOutcome::Yielded`
        // arm exists for synchronous callers like metamethod dispatch,
        // where a yield is actually illegal) — a coroutine's very first
        // resume yielding immediately is the ordinary case, not an error.
        let closure_id = match state.heap.thread(thread).stack[func_slot] {
            Value::Object(id) if state.heap.object_as_lua_closure(id).is_some() => id,
            _ => unreachable!("coroutine::create only ever stores a Lua closure at slot 0"),
        };
        let proto = state.heap.object_as_lua_closure(closure_id).expect("checked above").proto;
        let push_result = crate::callinfo::push_lua_call(state, thread, func_slot, closure_id, proto, ExpectedResults::Variadic);
        match push_result {
            Ok(()) => match interp::run(state, thread) {
                Ok(RunOutcome::Returned(n)) => {
                    let th = state.heap.thread(thread);
                    let vals = th.stack[..n].to_vec();
                    // Matches the real resume's `lua_xmove`: results move
                    // off the coroutine's own stack to the caller, so a
                    // finished thread's stack reads empty like a closed
                    // one (the dead-coroutine check above relies on it).
                    state.heap.thread_mut(thread).stack.clear();
                    Ok(vals)
                }
                Ok(RunOutcome::Yielded(n)) => {
                    let th = state.heap.thread(thread);
                    let vals = th.stack[th.stack.len() - n..].to_vec();
                    state.heap.thread_mut(thread).is_running = false;
                    tracing::trace!(thread = ?thread, nvals = n, "coroutine yielded");
                    return (VmStatus::Yield, vals);
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    } else {
        let pending = state.heap.thread(thread).current_call_info().and_then(|ci| ci.pending_call);
        if let Some((func_slot, expected)) = pending {
            if let Some(ci) = state.heap.thread_mut(thread).current_call_info_mut() {
                ci.pending_call = None;
            }
            crate::callinfo::land_results(state, thread, func_slot, expected, args);
        }
        match interp::run(state, thread) {
            Ok(RunOutcome::Returned(n)) => {
                let th = state.heap.thread(thread);
                let vals = th.stack[..n].to_vec();
                state.heap.thread_mut(thread).stack.clear();
                Ok(vals)
            }
            Ok(RunOutcome::Yielded(n)) => {
                let th = state.heap.thread(thread);
                let vals = th.stack[th.stack.len() - n..].to_vec();
                state.heap.thread_mut(thread).is_running = false;
                tracing::trace!(thread = ?thread, nvals = n, "coroutine yielded");
                return (VmStatus::Yield, vals);
            }
            Err(e) => Err(e),
        }
    };

    state.heap.thread_mut(thread).is_running = false;
    match result {
        Ok(values) => {
            state.heap.thread_mut(thread).status = ThreadStatus::Ok;
            tracing::debug!(thread = ?thread, "coroutine resume returned");
            (VmStatus::Ok, values)
        }
        Err(e) => {
            let status = e.status();
            state.heap.thread_mut(thread).status = match status {
                VmStatus::ErrMem => ThreadStatus::ErrMem,
                VmStatus::ErrErr => ThreadStatus::ErrErr,
                VmStatus::ErrSyntax => ThreadStatus::ErrSyntax,
                _ => ThreadStatus::ErrRun,
            };
            tracing::debug!(thread = ?thread, status = ?status, "coroutine resume errored");
            let v = e.into_value(state);
            (status, vec![v])
        }
    }
}

fn dead_coroutine_error(state: &mut GlobalState) -> Value {
    state.heap.new_string(b"cannot resume dead coroutine").map(Value::Object).unwrap_or(Value::NIL)
}

/// `coroutine.close` (spec §4.11): force a suspended or dead coroutine
/// closed, running any pending to-be-closed variables.
pub fn close(state: &mut GlobalState, thread: GcObjectId) -> VmResult<()> {
    match state.heap.thread(thread).status {
        ThreadStatus::Yield | ThreadStatus::Ok => {
            crate::tbc::close_from(state, thread, 0, None, |state, close_fn, obj, err| {
                if close_fn.is_nil() {
                    return Ok(());
                }
                interp::call_for_results(state, thread, close_fn, &[obj, err], 0).map(|_| ())
            })?;
            let th = state.heap.thread_mut(thread);
            th.call_infos.clear();
            th.stack.clear();
            th.status = ThreadStatus::Ok;
            tracing::trace!(thread = ?thread, "coroutine closed");
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn is_yieldable(state: &GlobalState, thread: GcObjectId) -> bool {
    state.heap.thread(thread).is_yieldable()
}
