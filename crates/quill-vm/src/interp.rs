//! The bytecode dispatch loop (component I, spec §4.9) plus the call
//! entry points everything else in this crate and `quill-embed` drive
//! the VM through.
//!
//! Grounded on `lvm.c`'s `luaV_execute`: a Lua-calling-Lua `OP_CALL`
//! does not recurse through `luaD_call` in the source — it pushes a new
//! `CallInfo` and loops back to the top of the same dispatch function, so
//! the C stack never grows for pure-Lua call chains and a coroutine can
//! yield from any depth of them. [`run`] mirrors that: it is one `loop`
//! that re-reads whichever `CallInfo` is now on top after a `CALL`, never
//! recursing into itself for a Lua callee. Only a host (C) callee is
//! invoked inline, matching `luaD_precall`'s immediate-call case. A tail
//! call goes further still: it replaces the current `CallInfo` in place
//! instead of pushing a new one, so tail-recursive Lua costs no Rust
//! stack at all, matching `OP_TAILCALL`/`luaD_pretailcall`.

use quill_core::metamethod::MetaEvent;
use quill_core::opcode::{ArithOp, Instruction};
use quill_core::thread::{CallInfoKind, ExpectedResults, ThreadStatus};
use quill_core::{CoreError, GlobalState, Value};
use quill_gc::GcObjectId;

use crate::arith;
use crate::callinfo;
use crate::error::{VmError, VmResult, VmStatus};
use crate::metamethod_dispatch as mm;
use crate::tbc;
use crate::unwind;

/// What happened when [`run`] stopped: either the entry frame returned
/// with this many results sitting at its function slot, or the thread
/// yielded (spec §4.11) and the same frames are left intact for `resume`.
pub enum RunOutcome {
    Returned(usize),
    Yielded(usize),
}

/// A reserved host function address `coroutine.yield` is registered
/// under. `run`'s `CALL` handling special-cases a match on this address
/// instead of invoking it like an ordinary host function, since yielding
/// has to suspend the dispatch loop rather than return from a plain call
/// (spec §4.11).
pub fn yield_marker(_: &mut quill_core::thread::Thread) -> quill_core::error::CoreResult<i32> {
    unreachable!("yield_marker is never actually invoked; CALL intercepts it by address")
}

fn is_yield_marker(f: Value) -> bool {
    matches!(f, Value::LightCFunction(ptr) if std::ptr::fn_addr_eq(ptr, yield_marker as quill_core::value::HostFn))
}

fn set_saved_pc(state: &mut GlobalState, thread: GcObjectId, pc: usize) {
    if let Some(ci) = state.heap.thread_mut(thread).current_call_info_mut() {
        if let CallInfoKind::Lua { saved_pc, .. } = &mut ci.kind {
            *saved_pc = pc;
        }
    }
}

fn reg(state: &GlobalState, thread: GcObjectId, base: usize, i: u8) -> Value {
    state.heap.thread(thread).stack[base + i as usize]
}

fn set_reg(state: &mut GlobalState, thread: GcObjectId, base: usize, i: u8, v: Value) {
    let th = state.heap.thread_mut(thread);
    let idx = base + i as usize;
    if idx >= th.stack.len() {
        th.stack.resize(idx + 1, Value::NIL);
    }
    th.stack[idx] = v;
}

fn constant(state: &GlobalState, proto: GcObjectId, idx: u32) -> Value {
    state.heap.proto(proto).constants[idx as usize]
}

/// Run `thread` until the frame that was on top when this was called
/// returns, or the thread yields. Every nested `CALL` to a Lua function
/// is handled by pushing a frame and letting the same loop pick it back
/// up; only calls to host functions recurse (bounded by
/// `DEFAULT_MAX_CCALLS`, spec §6.3).
pub fn run(state: &mut GlobalState, thread: GcObjectId) -> VmResult<RunOutcome> {
    let entry_depth = state.heap.thread(thread).call_infos.len().saturating_sub(1);
    loop {
        let depth = state.heap.thread(thread).call_infos.len();
        if depth <= entry_depth {
            let wanted = state.heap.thread(thread).stack.len().saturating_sub(
                state.heap.thread(thread).current_call_info().map(|ci| ci.func_slot + 1).unwrap_or(0),
            );
            return Ok(RunOutcome::Returned(wanted));
        }

        let ci = state.heap.thread(thread).current_call_info().cloned().expect("nonempty call_infos");
        let (proto_id, closure_id, pc) = match ci.kind {
            CallInfoKind::Lua { proto, closure, saved_pc } => (proto, closure, saved_pc),
            CallInfoKind::C { .. } => unreachable!("a C CallInfo never sits on top across a run() iteration"),
        };
        let base = ci.func_slot + 1;
        let instr = state.heap.proto(proto_id).code[pc];

        match step(state, thread, base, proto_id, closure_id, pc, instr)? {
            StepResult::Next(next_pc) => set_saved_pc(state, thread, next_pc),
            // A Lua callee's frame (or an in-place tail call) is already
            // on top of `call_infos` with its own `saved_pc` set; looping
            // back around picks it up without this function ever
            // recursing into itself.
            StepResult::Called => {}
            StepResult::Returned => {
                if state.heap.thread(thread).call_infos.len() <= entry_depth {
                    let func_slot = ci.func_slot;
                    let wanted = state.heap.thread(thread).stack.len().saturating_sub(func_slot);
                    return Ok(RunOutcome::Returned(wanted));
                }
            }
            StepResult::Yielded(n, resume_pc) => {
                set_saved_pc(state, thread, resume_pc);
                return Ok(RunOutcome::Yielded(n));
            }
        }
    }
}

enum StepResult {
    Next(usize),
    /// A Lua callee's `CallInfo` was pushed (an ordinary call) or the
    /// current one was replaced in place (a tail call); the caller's own
    /// `saved_pc`, if any, is already set, so `run`'s loop just continues
    /// from whatever is now on top.
    Called,
    Returned,
    /// Results-so-far count, plus the pc execution resumes at once
    /// `coroutine.resume` lands the resumed values (spec §4.11).
    Yielded(usize, usize),
}

#[allow(clippy::too_many_arguments)]
fn step(
    state: &mut GlobalState,
    thread: GcObjectId,
    base: usize,
    proto_id: GcObjectId,
    closure_id: GcObjectId,
    pc: usize,
    instr: Instruction,
) -> VmResult<StepResult> {
    use Instruction::*;
    let next = pc + 1;
    match instr {
        Move { a, b } => {
            set_reg(state, thread, base, a, reg(state, thread, base, b));
            Ok(StepResult::Next(next))
        }
        LoadI { a, sbx } => {
            set_reg(state, thread, base, a, Value::Integer(sbx as i64));
            Ok(StepResult::Next(next))
        }
        LoadF { a, sbx } => {
            set_reg(state, thread, base, a, Value::Float(sbx as f64));
            Ok(StepResult::Next(next))
        }
        LoadK { a, bx } => {
            set_reg(state, thread, base, a, constant(state, proto_id, bx));
            Ok(StepResult::Next(next))
        }
        LoadKX { a, extra_arg } => {
            set_reg(state, thread, base, a, constant(state, proto_id, extra_arg));
            Ok(StepResult::Next(next + 1))
        }
        LoadFalse { a } => {
            set_reg(state, thread, base, a, Value::Boolean(false));
            Ok(StepResult::Next(next))
        }
        LoadTrue { a } => {
            set_reg(state, thread, base, a, Value::Boolean(true));
            Ok(StepResult::Next(next))
        }
        LoadNil { a, b } => {
            for i in 0..=b {
                set_reg(state, thread, base, a + i, Value::NIL);
            }
            Ok(StepResult::Next(next))
        }

        GetUpval { a, b } => {
            let v = upvalue_value(state, closure_id, b);
            set_reg(state, thread, base, a, v);
            Ok(StepResult::Next(next))
        }
        SetUpval { a, b } => {
            let v = reg(state, thread, base, a);
            set_upvalue_value(state, closure_id, b, v);
            Ok(StepResult::Next(next))
        }

        GetTabUp { a, b, c } => {
            let upv = upvalue_value(state, closure_id, b);
            let key = constant(state, proto_id, c as u32);
            let v = mm::index(state, thread, upv, key)?;
            set_reg(state, thread, base, a, v);
            Ok(StepResult::Next(next))
        }
        GetTable { a, b, c } => {
            let t = reg(state, thread, base, b);
            let key = reg(state, thread, base, c);
            let v = mm::index(state, thread, t, key)?;
            set_reg(state, thread, base, a, v);
            Ok(StepResult::Next(next))
        }
        GetI { a, b, c } => {
            let t = reg(state, thread, base, b);
            let v = mm::index(state, thread, t, Value::Integer(c as i64))?;
            set_reg(state, thread, base, a, v);
            Ok(StepResult::Next(next))
        }
        GetField { a, b, c } => {
            let t = reg(state, thread, base, b);
            let key = constant(state, proto_id, c as u32);
            let v = mm::index(state, thread, t, key)?;
            set_reg(state, thread, base, a, v);
            Ok(StepResult::Next(next))
        }
        SetTabUp { a, b, c, k_c } => {
            let upv = upvalue_value(state, closure_id, a);
            let key = constant(state, proto_id, b as u32);
            let value = if k_c { constant(state, proto_id, c as u32) } else { reg(state, thread, base, c) };
            mm::new_index(state, thread, upv, key, value)?;
            Ok(StepResult::Next(next))
        }
        SetTable { a, b, c, k_c } => {
            let t = reg(state, thread, base, a);
            let key = reg(state, thread, base, b);
            let value = if k_c { constant(state, proto_id, c as u32) } else { reg(state, thread, base, c) };
            mm::new_index(state, thread, t, key, value)?;
            Ok(StepResult::Next(next))
        }
        SetI { a, b, c, k_c } => {
            let t = reg(state, thread, base, a);
            let value = if k_c { constant(state, proto_id, b as u32) } else { reg(state, thread, base, b) };
            mm::new_index(state, thread, t, Value::Integer(c as i64), value)?;
            Ok(StepResult::Next(next))
        }
        SetField { a, b, c, k_c } => {
            let t = reg(state, thread, base, a);
            let key = constant(state, proto_id, b as u32);
            let value = if k_c { constant(state, proto_id, c as u32) } else { reg(state, thread, base, c) };
            mm::new_index(state, thread, t, key, value)?;
            Ok(StepResult::Next(next))
        }
        NewTable { a, narray, nhash } => {
            let id = state.heap.new_table_sized(narray as usize, nhash as usize)?;
            set_reg(state, thread, base, a, Value::Object(id));
            Ok(StepResult::Next(next))
        }
        Self_ { a, b, c, k_c } => {
            let t = reg(state, thread, base, b);
            let key = if k_c { constant(state, proto_id, c as u32) } else { reg(state, thread, base, c) };
            let method = mm::index(state, thread, t, key)?;
            set_reg(state, thread, base, a + 1, t);
            set_reg(state, thread, base, a, method);
            Ok(StepResult::Next(next))
        }

        AddI { a, b, imm } => {
            let v = reg(state, thread, base, b);
            let result = match v {
                Value::Integer(i) => Value::Integer(i.wrapping_add(imm as i64)),
                Value::Float(f) => Value::Float(f + imm as f64),
                other => mm::arith(state, thread, ArithOp::Add, other, Value::Integer(imm as i64))?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        Arith { op, a, b, c } => {
            let x = reg(state, thread, base, b);
            let y = reg(state, thread, base, c);
            let result = match arith::arith_fast(op, x, y) {
                Some(Ok(v)) => v,
                Some(Err(e)) => return Err(VmError::Core(e)),
                None => mm::arith(state, thread, op, x, y)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        ArithK { op, a, b, c } => {
            let x = reg(state, thread, base, b);
            let y = constant(state, proto_id, c as u32);
            let result = match arith::arith_fast(op, x, y) {
                Some(Ok(v)) => v,
                Some(Err(e)) => return Err(VmError::Core(e)),
                None => mm::arith(state, thread, op, x, y)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        ArithImm { op, a, b, imm } => {
            let x = reg(state, thread, base, b);
            let y = Value::Integer(imm as i64);
            let result = match arith::arith_fast(op, x, y) {
                Some(Ok(v)) => v,
                Some(Err(e)) => return Err(VmError::Core(e)),
                None => mm::arith(state, thread, op, x, y)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        Unm { a, b } => {
            let v = reg(state, thread, base, b);
            let result = match arith::unary_minus(v) {
                Some(r) => r,
                None => mm::unary_minus(state, thread, v)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        BNot { a, b } => {
            let v = reg(state, thread, base, b);
            let result = match arith::bitwise_not(v) {
                Some(r) => r,
                None => mm::bitwise_not(state, thread, v)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        Not { a, b } => {
            let v = reg(state, thread, base, b);
            set_reg(state, thread, base, a, Value::Boolean(!v.is_truthy()));
            Ok(StepResult::Next(next))
        }
        Len { a, b } => {
            let v = reg(state, thread, base, b);
            let result = match (v, v.as_object().and_then(|id| state.heap.object_as_table(id))) {
                (Value::Object(id), Some(_)) if state.heap.get_metamethod(&v, MetaEvent::Len).is_nil() => {
                    Value::Integer(state.heap.table(id).length(&state.heap))
                }
                (Value::Object(_), _) => mm::length(state, thread, v)?,
                _ => mm::length(state, thread, v)?,
            };
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        Concat { a, b } => {
            let mut acc = reg(state, thread, base, b);
            for i in (b + 1)..=a {
                let rhs = reg(state, thread, base, i);
                acc = concat_pair(state, thread, acc, rhs)?;
            }
            set_reg(state, thread, base, a, acc);
            Ok(StepResult::Next(next))
        }

        MmBin { a, b, event } => {
            let x = reg(state, thread, base, a);
            let y = reg(state, thread, base, b);
            let event = decode_event(event);
            let result = call_meta_event(state, thread, event, x, y)?;
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        MmBinI { a, imm, event, flipped } => {
            let x = reg(state, thread, base, a);
            let y = Value::Integer(imm as i64);
            let (l, r) = if flipped { (y, x) } else { (x, y) };
            let event = decode_event(event);
            let result = call_meta_event(state, thread, event, l, r)?;
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }
        MmBinK { a, b, event, flipped } => {
            let x = reg(state, thread, base, a);
            let y = constant(state, proto_id, b as u32);
            let (l, r) = if flipped { (y, x) } else { (x, y) };
            let event = decode_event(event);
            let result = call_meta_event(state, thread, event, l, r)?;
            set_reg(state, thread, base, a, result);
            Ok(StepResult::Next(next))
        }

        Eq { a, b, k } => Ok(cond_skip(next, k, raw_or_meta_eq(state, thread, reg(state, thread, base, a), reg(state, thread, base, b))?)),
        EqK { a, b, k } => Ok(cond_skip(next, k, raw_or_meta_eq(state, thread, reg(state, thread, base, a), constant(state, proto_id, b as u32))?)),
        EqI { a, imm, k } => Ok(cond_skip(next, k, reg(state, thread, base, a).raw_primitive_eq(&Value::Integer(imm as i64)).unwrap_or(false))),
        Lt { a, b, k } => Ok(cond_skip(next, k, cmp_lt(state, thread, reg(state, thread, base, a), reg(state, thread, base, b))?)),
        Le { a, b, k } => Ok(cond_skip(next, k, cmp_le(state, thread, reg(state, thread, base, a), reg(state, thread, base, b))?)),
        LtI { a, imm, k } => Ok(cond_skip(next, k, arith::numeric_less(reg(state, thread, base, a), Value::Integer(imm as i64), false).unwrap_or(false))),
        LeI { a, imm, k } => Ok(cond_skip(next, k, arith::numeric_less(reg(state, thread, base, a), Value::Integer(imm as i64), true).unwrap_or(false))),
        GtI { a, imm, k } => Ok(cond_skip(next, k, arith::numeric_less(Value::Integer(imm as i64), reg(state, thread, base, a), false).unwrap_or(false))),
        GeI { a, imm, k } => Ok(cond_skip(next, k, arith::numeric_less(Value::Integer(imm as i64), reg(state, thread, base, a), true).unwrap_or(false))),

        Jmp { sj } => Ok(StepResult::Next((next as i64 + sj as i64) as usize)),
        Test { a, k } => {
            let truthy = reg(state, thread, base, a).is_truthy();
            Ok(cond_skip(next, k, truthy))
        }
        TestSet { a, b, k } => {
            let v = reg(state, thread, base, b);
            if v.is_truthy() == k {
                set_reg(state, thread, base, a, v);
                Ok(StepResult::Next(next))
            } else {
                Ok(StepResult::Next(next + 1))
            }
        }

        Call { a, b, c } => {
            let func_slot = base + a as usize;
            let nargs = if b == 0 { state.heap.thread(thread).stack.len() - func_slot - 1 } else { b as usize - 1 };
            let expected = if c == 0 { ExpectedResults::Variadic } else { ExpectedResults::Fixed(c - 1) };
            let func = state.heap.thread(thread).stack[func_slot];
            if is_yield_marker(func) {
                let nres = do_yield(state, thread, func_slot, nargs)?;
                if let Some(ci) = state.heap.thread_mut(thread).current_call_info_mut() {
                    ci.pending_call = Some((func_slot, expected));
                }
                return Ok(StepResult::Yielded(nres, next));
            }
            // A Lua callee gets its frame pushed right here and the outer
            // `run` loop picks it up next iteration, so a deep chain of
            // plain Lua calls never recurses through this function — a
            // `coroutine.yield` nested arbitrarily far inside still
            // surfaces as `StepResult::Yielded` out of `run`'s own loop.
            // Anything else (host function, `__call` target) still runs
            // to completion through `call_value`.
            if let Value::Object(id) = func {
                if let Some(proto) = state.heap.object_as_lua_closure(id).map(|c| c.proto) {
                    set_saved_pc(state, thread, next);
                    callinfo::push_lua_call(state, thread, func_slot, id, proto, expected)?;
                    return Ok(StepResult::Called);
                }
            }
            call_value(state, thread, func_slot, nargs, expected)?;
            Ok(StepResult::Next(next))
        }
        TailCall { a, b, .. } => {
            let func_slot = base + a as usize;
            let nargs = if b == 0 { state.heap.thread(thread).stack.len() - func_slot - 1 } else { b as usize - 1 };
            do_tailcall(state, thread, func_slot, nargs)
        }
        Return { a, b, .. } => {
            let from = base + a as usize;
            let count = if b == 0 { state.heap.thread(thread).stack.len() - from } else { b as usize - 1 };
            finish_return(state, thread, base, from, count)?;
            Ok(StepResult::Returned)
        }
        Return0 => {
            finish_return(state, thread, base, base, 0)?;
            Ok(StepResult::Returned)
        }
        Return1 { a } => {
            let from = base + a as usize;
            finish_return(state, thread, base, from, 1)?;
            Ok(StepResult::Returned)
        }

        ForPrep { a, bx } => {
            let init = reg(state, thread, base, a);
            let limit = reg(state, thread, base, a + 1);
            let step_v = reg(state, thread, base, a + 2);
            if for_done_initially(init, limit, step_v) {
                return Ok(StepResult::Next(next + bx as usize + 1));
            }
            set_reg(state, thread, base, a + 3, init);
            Ok(StepResult::Next(next))
        }
        ForLoop { a, bx } => {
            let (cont, new_val) = for_advance(reg(state, thread, base, a), reg(state, thread, base, a + 1), reg(state, thread, base, a + 2))?;
            if cont {
                set_reg(state, thread, base, a, new_val);
                set_reg(state, thread, base, a + 3, new_val);
                Ok(StepResult::Next(next - bx as usize - 1))
            } else {
                Ok(StepResult::Next(next))
            }
        }
        TForPrep { a: _, bx } => Ok(StepResult::Next(next + bx as usize)),
        TForCall { a, c } => {
            // Generic-for protocol (spec §4.9): R[a]/[a+1]/[a+2] hold the
            // iterator function, invariant state, and control variable.
            // They're copied into a fresh call window at a+3.. so the
            // call's own result-writing can't clobber them mid-call;
            // TFORLOOP reads the new control back out of R[a+3].
            let func = reg(state, thread, base, a);
            let st = reg(state, thread, base, a + 1);
            let ctrl = reg(state, thread, base, a + 2);
            set_reg(state, thread, base, a + 3, func);
            set_reg(state, thread, base, a + 4, st);
            set_reg(state, thread, base, a + 5, ctrl);
            let call_slot = base + a as usize + 3;
            call_value(state, thread, call_slot, 2, ExpectedResults::Fixed(c))?;
            Ok(StepResult::Next(next))
        }
        TForLoop { a, bx } => {
            let ctrl = reg(state, thread, base, a + 3);
            if !ctrl.is_nil() {
                set_reg(state, thread, base, a + 2, ctrl);
                Ok(StepResult::Next(next - bx as usize))
            } else {
                Ok(StepResult::Next(next))
            }
        }

        Closure { a, bx } => {
            let id = build_closure(state, thread, base, proto_id, bx)?;
            set_reg(state, thread, base, a, Value::Object(id));
            Ok(StepResult::Next(next))
        }
        Vararg { a, c } => {
            let varargs = collect_varargs(state, thread);
            let want = if c == 0 { varargs.len() } else { c as usize - 1 };
            for i in 0..want {
                let v = varargs.get(i).copied().unwrap_or(Value::NIL);
                set_reg(state, thread, base, a + i as u8, v);
            }
            Ok(StepResult::Next(next))
        }
        VarargPrep { .. } => Ok(StepResult::Next(next)),

        Close { a } => {
            close_upvalues_and_tbc(state, thread, base + a as usize)?;
            Ok(StepResult::Next(next))
        }
        Tbc { a } => {
            let v = reg(state, thread, base, a);
            tbc::mark_tbc(state, thread, base + a as usize, v)?;
            Ok(StepResult::Next(next))
        }
    }
}

fn decode_event(bits: u8) -> MetaEvent {
    const TABLE: [MetaEvent; 12] = [
        MetaEvent::Add,
        MetaEvent::Sub,
        MetaEvent::Mul,
        MetaEvent::Div,
        MetaEvent::Idiv,
        MetaEvent::Mod,
        MetaEvent::Pow,
        MetaEvent::Band,
        MetaEvent::Bor,
        MetaEvent::Bxor,
        MetaEvent::Shl,
        MetaEvent::Shr,
    ];
    TABLE[bits as usize % TABLE.len()]
}

fn call_meta_event(state: &mut GlobalState, thread: GcObjectId, event: MetaEvent, a: Value, b: Value) -> VmResult<Value> {
    let op = match event {
        MetaEvent::Add => ArithOp::Add,
        MetaEvent::Sub => ArithOp::Sub,
        MetaEvent::Mul => ArithOp::Mul,
        MetaEvent::Div => ArithOp::Div,
        MetaEvent::Idiv => ArithOp::Idiv,
        MetaEvent::Mod => ArithOp::Mod,
        MetaEvent::Pow => ArithOp::Pow,
        MetaEvent::Band => ArithOp::Band,
        MetaEvent::Bor => ArithOp::Bor,
        MetaEvent::Bxor => ArithOp::Bxor,
        MetaEvent::Shl => ArithOp::Shl,
        MetaEvent::Shr => ArithOp::Shr,
        _ => unreachable!("decode_event only produces arithmetic/bitwise events"),
    };
    mm::arith(state, thread, op, a, b)
}

fn cond_skip(next: usize, k: bool, cond: bool) -> StepResult {
    if cond == k {
        StepResult::Next(next)
    } else {
        StepResult::Next(next + 1)
    }
}

fn raw_or_meta_eq(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    if let Some(r) = a.raw_primitive_eq(&b) {
        return Ok(r);
    }
    match (a, b) {
        (Value::Object(ia), Value::Object(ib)) => {
            if ia == ib {
                return Ok(true);
            }
            if state.heap.object_bytes(ia).is_some() || state.heap.object_bytes(ib).is_some() {
                return Ok(state.heap.string_eq(ia, ib));
            }
            mm::equals(state, thread, a, b)
        }
        _ => Ok(false),
    }
}

fn cmp_lt(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    match arith::numeric_less(a, b, false) {
        Some(r) => Ok(r),
        None => mm::less_than(state, thread, a, b),
    }
}

fn cmp_le(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    match arith::numeric_less(a, b, true) {
        Some(r) => Ok(r),
        None => mm::less_equal(state, thread, a, b),
    }
}

fn concat_pair(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<Value> {
    if let (Some(sa), Some(sb)) = (stringify_for_concat(state, a), stringify_for_concat(state, b)) {
        let mut bytes = sa;
        bytes.extend_from_slice(&sb);
        let id = state.heap.new_string(&bytes)?;
        return Ok(Value::Object(id));
    }
    mm::concat(state, thread, a, b)
}

fn stringify_for_concat(state: &GlobalState, v: Value) -> Option<Vec<u8>> {
    match v {
        Value::Integer(i) => Some(i.to_string().into_bytes()),
        Value::Float(f) => Some(format!("{f}").into_bytes()),
        Value::Object(id) => state.heap.object_bytes(id).map(|b| b.to_vec()),
        _ => None,
    }
}

fn upvalue_value(state: &GlobalState, closure: GcObjectId, idx: u8) -> Value {
    let upval_id = state.heap.lua_closure(closure).upvalues[idx as usize];
    match &state.heap.upvalue(upval_id).state {
        quill_core::closure::UpvalueState::Open { thread, register } => state.heap.thread(*thread).stack[*register],
        quill_core::closure::UpvalueState::Closed(v) => *v,
    }
}

fn set_upvalue_value(state: &mut GlobalState, closure: GcObjectId, idx: u8, value: Value) {
    let upval_id = state.heap.lua_closure(closure).upvalues[idx as usize];
    let loc = match &state.heap.upvalue(upval_id).state {
        quill_core::closure::UpvalueState::Open { thread, register } => Some((*thread, *register)),
        quill_core::closure::UpvalueState::Closed(_) => None,
    };
    match loc {
        Some((thread, register)) => state.heap.thread_mut(thread).stack[register] = value,
        None => state.heap.close_upvalue(upval_id, value),
    }
}

fn for_done_initially(init: Value, limit: Value, step: Value) -> bool {
    match (init.as_f64(), limit.as_f64(), step.as_f64()) {
        (Some(i), Some(l), Some(s)) if s > 0.0 => i > l,
        (Some(i), Some(l), Some(s)) if s < 0.0 => i < l,
        _ => true,
    }
}

fn for_advance(val: Value, limit: Value, step: Value) -> VmResult<(bool, Value)> {
    match (val, limit, step) {
        (Value::Integer(v), Value::Integer(l), Value::Integer(s)) => {
            let Some(nv) = v.checked_add(s) else { return Ok((false, val)) };
            let cont = if s > 0 { nv <= l } else { nv >= l };
            Ok((cont, Value::Integer(nv)))
        }
        _ => {
            let v = val.as_f64().ok_or(VmError::Core(CoreError::NoIntegerRepresentation))?;
            let l = limit.as_f64().ok_or(VmError::Core(CoreError::NoIntegerRepresentation))?;
            let s = step.as_f64().ok_or(VmError::Core(CoreError::NoIntegerRepresentation))?;
            let nv = v + s;
            let cont = if s > 0.0 { nv <= l } else { nv >= l };
            Ok((cont, Value::Float(nv)))
        }
    }
}

fn collect_varargs(state: &GlobalState, thread: GcObjectId) -> Vec<Value> {
    state.heap.thread(thread).current_call_info().expect("active frame").extra_args.clone()
}

fn build_closure(state: &mut GlobalState, thread: GcObjectId, base: usize, enclosing_proto: GcObjectId, bx: u32) -> VmResult<GcObjectId> {
    let nested_proto = state.heap.proto(enclosing_proto).protos[bx as usize];
    let descs = state.heap.proto(nested_proto).upvalues.clone();
    let mut upvalues = Vec::with_capacity(descs.len());
    let ci = state.heap.thread(thread).current_call_info().expect("active frame").clone();
    let CallInfoKind::Lua { closure: enclosing_closure, .. } = ci.kind else { unreachable!() };
    for desc in &descs {
        let id = if desc.in_stack {
            let register = base + desc.idx as usize;
            match state.heap.thread(thread).find_open_upvalue(register) {
                Some(existing) => existing,
                None => {
                    let id = state.heap.new_open_upvalue(thread, register)?;
                    state.heap.thread_mut(thread).track_open_upvalue(register, id);
                    id
                }
            }
        } else {
            state.heap.lua_closure(enclosing_closure).upvalues[desc.idx as usize]
        };
        upvalues.push(id);
    }
    state.heap.new_lua_closure(nested_proto, upvalues).map_err(VmError::from)
}

fn close_upvalues_and_tbc(state: &mut GlobalState, thread: GcObjectId, from_register: usize) -> VmResult<()> {
    let handles = state.heap.thread(thread).open_upvalues_from(from_register);
    for id in handles {
        if let quill_core::closure::UpvalueState::Open { thread: t, register } = state.heap.upvalue(id).state {
            let v = state.heap.thread(t).stack[register];
            state.heap.close_upvalue(id, v);
        }
    }
    state.heap.thread_mut(thread).untrack_closed_from(from_register);
    tbc::close_from(state, thread, from_register, None, |state, close_fn, obj, err| {
        if close_fn.is_nil() {
            return Ok(());
        }
        call_for_results(state, thread, close_fn, &[obj, err], 0).map(|_| ())
    })
}

fn finish_return(state: &mut GlobalState, thread: GcObjectId, base: usize, from: usize, count: usize) -> VmResult<()> {
    close_upvalues_and_tbc(state, thread, base - 1)?;
    let results: Vec<Value> = (0..count).map(|i| state.heap.thread(thread).stack[from + i]).collect();
    let func_slot = state.heap.thread(thread).current_call_info().expect("active frame").func_slot;
    callinfo::poscall(state, thread, func_slot, &results)?;
    Ok(())
}

/// `TAILCALL` (spec §4.8's tail-call rule, grounded on `ldo.c`'s
/// `luaD_pretailcall`): a Lua-to-Lua tail call moves the callee and its
/// arguments down over the current frame's own function slot and reuses
/// the same `CallInfo` in place, so a tail-recursive loop never grows
/// `call_infos` — unbounded tail-call depth costs no Rust stack at all.
/// Anything else in tail position (a host function, an `__call` target)
/// has no such recursion concern, so it just closes the frame, calls
/// ordinarily, and returns the results in the caller's place.
fn do_tailcall(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, nargs: usize) -> VmResult<StepResult> {
    let ci = state.heap.thread(thread).current_call_info().expect("active frame").clone();
    close_upvalues_and_tbc(state, thread, ci.func_slot + 1)?;

    let func = state.heap.thread(thread).stack[func_slot];
    if let Value::Object(id) = func {
        if let Some(proto) = state.heap.object_as_lua_closure(id).map(|c| c.proto) {
            let dest = ci.func_slot;
            let nmoved = 1 + nargs;
            for i in 0..nmoved {
                let v = state.heap.thread(thread).stack[func_slot + i];
                state.heap.thread_mut(thread).stack[dest + i] = v;
            }
            state.heap.thread_mut(thread).stack.truncate(dest + nmoved);

            let p = state.heap.proto(proto).clone();
            let (new_base, extra_args) = callinfo::adjust_varargs(state, thread, dest, p.num_params as usize, p.is_vararg)?;
            callinfo::prepare_registers(state, thread, new_base, p.num_params as usize, p.max_stack_size as usize)?;

            let th = state.heap.thread_mut(thread);
            let top = th.call_infos.last_mut().expect("active frame");
            top.top = new_base + p.max_stack_size as usize;
            top.kind = CallInfoKind::Lua { proto, closure: id, saved_pc: 0 };
            top.is_tail_call = true;
            top.extra_args = extra_args;
            return Ok(StepResult::Called);
        }
    }

    let nres = call_value(state, thread, func_slot, nargs, ExpectedResults::Variadic)?;
    let results: Vec<Value> = (0..nres).map(|i| state.heap.thread(thread).stack[func_slot + i]).collect();
    callinfo::poscall(state, thread, ci.func_slot, &results)?;
    Ok(StepResult::Returned)
}

fn do_yield(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, nargs: usize) -> VmResult<usize> {
    if !state.heap.thread(thread).is_yieldable() {
        return Err(VmError::NonYieldableYield);
    }
    let values: Vec<Value> = (0..nargs).map(|i| state.heap.thread(thread).stack[func_slot + 1 + i]).collect();
    let th = state.heap.thread_mut(thread);
    th.status = ThreadStatus::Yield;
    th.stack.truncate(func_slot);
    for v in &values {
        th.stack.push(*v);
    }
    tracing::trace!(thread = ?thread, nargs, "yield");
    Ok(values.len())
}

/// Invoke whatever is in `func_slot` with `nargs` already sitting above
/// it on `thread`'s stack (spec §4.8's "Frame lifecycle") and run it to
/// completion, returning its result count. Used by callers that need a
/// synchronous result rather than a suspendable dispatch step — host
/// functions, metamethod dispatch, `pcall`'s close callback, the generic
/// `for` iterator call — where a yield partway through is illegal
/// anyway. The bytecode dispatch loop's own `CALL`/`TAILCALL` handling
/// does not go through here for a Lua callee; it pushes (or replaces)
/// the `CallInfo` directly so a yield can cross arbitrarily many nested
/// Lua frames.
pub fn call_value(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, nargs: usize, expected: ExpectedResults) -> VmResult<usize> {
    let func = state.heap.thread(thread).stack[func_slot];
    match func {
        Value::Object(id) if state.heap.object_as_lua_closure(id).is_some() => {
            let proto = state.heap.object_as_lua_closure(id).expect("checked above").proto;
            callinfo::push_lua_call(state, thread, func_slot, id, proto, expected)?;
            match run(state, thread)? {
                RunOutcome::Returned(n) => Ok(n),
                RunOutcome::Yielded(_) => Err(VmError::YieldFromMetamethod),
            }
        }
        Value::Object(id) if state.heap.object_as_cclosure(id).is_some() => {
            let cfunc = state.heap.cclosure(id).func;
            invoke_host(state, thread, func_slot, expected, cfunc)
        }
        Value::LightCFunction(f) => invoke_host(state, thread, func_slot, expected, f),
        other => {
            let call_mm = state.heap.get_metamethod(&other, MetaEvent::Call);
            if call_mm.is_nil() {
                return Err(VmError::Core(CoreError::TypeError { op: "call", ty: other.type_name_primitive().unwrap_or("table") }));
            }
            let th = state.heap.thread_mut(thread);
            th.stack.insert(func_slot, call_mm);
            call_value(state, thread, func_slot, nargs + 1, expected)
        }
    }
}

fn invoke_host(state: &mut GlobalState, thread: GcObjectId, func_slot: usize, expected: ExpectedResults, f: quill_core::value::HostFn) -> VmResult<usize> {
    callinfo::push_c_call(state, thread, func_slot, expected)?;
    let nret = {
        let th = state.heap.thread_mut(thread);
        f(th).map_err(VmError::Core)?
    };
    let results: Vec<Value> = {
        let th = state.heap.thread(thread);
        let top = th.stack.len();
        (0..nret as usize).map(|i| th.stack[top - nret as usize + i]).collect()
    };
    callinfo::poscall(state, thread, func_slot, &results)
}

/// Call `func` with `args`, collecting exactly `nresults` values (or all
/// of them if `nresults == 0` in the variadic sense used by
/// `metamethod_dispatch.rs`'s single-result helpers, which always pass a
/// concrete count). Used by metamethod invocation and `quill-embed`'s
/// `pcall`-family entry points.
pub fn call_for_results(state: &mut GlobalState, thread: GcObjectId, func: Value, args: &[Value], nresults: usize) -> VmResult<Vec<Value>> {
    let func_slot = state.heap.thread(thread).stack.len();
    {
        let th = state.heap.thread_mut(thread);
        th.stack.push(func);
        for a in args {
            th.stack.push(*a);
        }
    }
    let expected = ExpectedResults::Fixed(nresults as u8);
    let got = call_value(state, thread, func_slot, args.len(), expected)?;
    let results: Vec<Value> = (0..got).map(|i| state.heap.thread(thread).stack[func_slot + i]).collect();
    state.heap.thread_mut(thread).stack.truncate(func_slot);
    Ok(results)
}

/// The protected-call boundary (spec §4.10). Runs `func(args)`, catching
/// any [`VmError`] raised below and converting it to the `(status,
/// results)` shape `pcall`/`xpcall` report.
pub fn protected_call(
    state: &mut GlobalState,
    thread: GcObjectId,
    func: Value,
    args: &[Value],
    handler: Option<Value>,
    nresults: usize,
) -> (VmStatus, Vec<Value>) {
    let mark = unwind::mark_protected(state, thread);
    let close_cb = |state: &mut GlobalState, close_fn: Value, obj: Value, err: Value| {
        if close_fn.is_nil() {
            return Ok(());
        }
        call_for_results(state, thread, close_fn, &[obj, err], 0).map(|_| ())
    };
    match call_for_results(state, thread, func, args, nresults) {
        Ok(results) => (VmStatus::Ok, results),
        Err(e) => {
            let raw = match e {
                VmError::Raised(v) => v,
                other => other.into_value(state),
            };
            let handled = match handler {
                Some(h) if !h.is_nil() => call_for_results(state, thread, h, &[raw], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)).unwrap_or(raw),
                _ => raw,
            };
            let final_error = unwind::unwind_to(state, thread, mark, handled, close_cb);
            (VmStatus::ErrRun, vec![final_error])
        }
    }
}
