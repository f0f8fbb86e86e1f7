//! Metamethod *invocation* (component M, spec §4.13): given the event and
//! operands the fast paths in `arith.rs`/raw table access couldn't
//! handle, find the handler via `quill-core`'s lookup protocol and call
//! it through `interp::call_for_results`.

use quill_core::metamethod::{MetaEvent, MetaSearchOrder};
use quill_core::{ArithOp, CoreError, GlobalState, Value};
use quill_gc::GcObjectId;

use crate::arith;
use crate::error::{VmError, VmResult};
use crate::interp::call_for_results;

fn find_handler(state: &GlobalState, event: MetaEvent, a: Value, b: Value) -> Option<Value> {
    match event.search_order() {
        MetaSearchOrder::TargetOnly => {
            let h = state.heap.get_metamethod(&a, event);
            if !h.is_nil() {
                Some(h)
            } else {
                None
            }
        }
        MetaSearchOrder::LeftThenRight => {
            let h = state.heap.get_metamethod(&a, event);
            if !h.is_nil() {
                return Some(h);
            }
            let h = state.heap.get_metamethod(&b, event);
            if !h.is_nil() {
                Some(h)
            } else {
                None
            }
        }
    }
}

fn arith_event(op: ArithOp) -> MetaEvent {
    match op {
        ArithOp::Add => MetaEvent::Add,
        ArithOp::Sub => MetaEvent::Sub,
        ArithOp::Mul => MetaEvent::Mul,
        ArithOp::Div => MetaEvent::Div,
        ArithOp::Idiv => MetaEvent::Idiv,
        ArithOp::Mod => MetaEvent::Mod,
        ArithOp::Pow => MetaEvent::Pow,
        ArithOp::Band => MetaEvent::Band,
        ArithOp::Bor => MetaEvent::Bor,
        ArithOp::Bxor => MetaEvent::Bxor,
        ArithOp::Shl => MetaEvent::Shl,
        ArithOp::Shr => MetaEvent::Shr,
    }
}

fn op_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "mul",
        ArithOp::Div => "div",
        ArithOp::Idiv => "idiv",
        ArithOp::Mod => "mod",
        ArithOp::Pow => "pow",
        ArithOp::Band | ArithOp::Bor | ArithOp::Bxor | ArithOp::Shl | ArithOp::Shr => "perform bitwise operation on",
    }
}

/// Called after `arith::arith_fast` returns `None` (spec §4.9's `MMBIN`
/// family): neither operand took the inline path, so find `__add`/etc. on
/// either side.
pub fn arith(state: &mut GlobalState, thread: GcObjectId, op: ArithOp, a: Value, b: Value) -> VmResult<Value> {
    match find_handler(state, arith_event(op), a, b) {
        Some(h) => call_for_results(state, thread, h, &[a, b], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)),
        None => {
            let bad = if a.is_number() { b } else { a };
            Err(VmError::Core(CoreError::TypeError { op: op_name(op), ty: bad.type_name_primitive().unwrap_or("table") }))
        }
    }
}

pub fn unary_minus(state: &mut GlobalState, thread: GcObjectId, v: Value) -> VmResult<Value> {
    match find_handler(state, MetaEvent::Unm, v, v) {
        Some(h) => call_for_results(state, thread, h, &[v, v], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)),
        None => Err(VmError::Core(CoreError::TypeError { op: "perform arithmetic on", ty: v.type_name_primitive().unwrap_or("table") })),
    }
}

pub fn bitwise_not(state: &mut GlobalState, thread: GcObjectId, v: Value) -> VmResult<Value> {
    match find_handler(state, MetaEvent::Bnot, v, v) {
        Some(h) => call_for_results(state, thread, h, &[v, v], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)),
        None => Err(VmError::Core(CoreError::TypeError { op: "perform bitwise operation on", ty: v.type_name_primitive().unwrap_or("table") })),
    }
}

/// `..` (spec §4.13 `__concat`): tries the handler on either operand once
/// the raw string/number fast path (handled in `interp.rs`) fails.
pub fn concat(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<Value> {
    match find_handler(state, MetaEvent::Concat, a, b) {
        Some(h) => call_for_results(state, thread, h, &[a, b], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)),
        None => {
            let bad = if concatable(&a) { b } else { a };
            Err(VmError::Core(CoreError::TypeError { op: "concatenate", ty: bad.type_name_primitive().unwrap_or("table") }))
        }
    }
}

fn concatable(v: &Value) -> bool {
    v.is_number() || matches!(v, Value::Object(_))
}

pub fn length(state: &mut GlobalState, thread: GcObjectId, v: Value) -> VmResult<Value> {
    match find_handler(state, MetaEvent::Len, v, v) {
        Some(h) => call_for_results(state, thread, h, &[v], 1).map(|mut r| r.pop().unwrap_or(Value::NIL)),
        None => Err(VmError::Core(CoreError::TypeError { op: "get length of", ty: v.type_name_primitive().unwrap_or("table") })),
    }
}

/// `==` (spec §4.13 `__eq`): only consulted when both operands are tables
/// or both userdata and raw equality already said "not equal" — the
/// caller (`interp.rs`) is responsible for checking that precondition.
pub fn equals(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    match find_handler(state, MetaEvent::Eq, a, b) {
        Some(h) => Ok(call_for_results(state, thread, h, &[a, b], 1)?.first().is_some_and(Value::is_truthy)),
        None => Ok(false),
    }
}

/// Lexicographic byte-compare, if both operands are strings (spec §4.9's
/// `OP_LT`/`OP_LE`, grounded on `lvm.c`'s `l_strcmp`). Comparing two
/// strings is a VM primitive, not part of the string library, so it runs
/// ahead of the `__lt`/`__le` metamethod lookup rather than behind it.
fn string_pair(state: &GlobalState, a: Value, b: Value) -> Option<(&[u8], &[u8])> {
    match (a, b) {
        (Value::Object(ia), Value::Object(ib)) => Some((state.heap.object_bytes(ia)?, state.heap.object_bytes(ib)?)),
        _ => None,
    }
}

pub fn less_than(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    if let Some((sa, sb)) = string_pair(state, a, b) {
        return Ok(sa < sb);
    }
    match find_handler(state, MetaEvent::Lt, a, b) {
        Some(h) => Ok(call_for_results(state, thread, h, &[a, b], 1)?.first().is_some_and(Value::is_truthy)),
        None => Err(VmError::Core(CoreError::TypeError { op: "compare", ty: a.type_name_primitive().unwrap_or("two table") })),
    }
}

pub fn less_equal(state: &mut GlobalState, thread: GcObjectId, a: Value, b: Value) -> VmResult<bool> {
    if let Some((sa, sb)) = string_pair(state, a, b) {
        return Ok(sa <= sb);
    }
    match find_handler(state, MetaEvent::Le, a, b) {
        Some(h) => Ok(call_for_results(state, thread, h, &[a, b], 1)?.first().is_some_and(Value::is_truthy)),
        None => Err(VmError::Core(CoreError::TypeError { op: "compare", ty: a.type_name_primitive().unwrap_or("two table") })),
    }
}

/// `t[k]` chain walk (spec §4.13 step 2): raw access, then follow
/// `__index` (table or function) up to a fixed depth.
pub fn index(state: &mut GlobalState, thread: GcObjectId, mut target: Value, key: Value) -> VmResult<Value> {
    for _ in 0..100 {
        if let Value::Object(id) = target {
            if let Some(t) = state.heap.object_as_table(id) {
                let raw = t.raw_get(&state.heap, &key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
            }
        }
        let h = state.heap.get_metamethod(&target, MetaEvent::Index);
        if h.is_nil() {
            if target.is_object() && state.heap.object_as_table(target.as_object().unwrap()).is_some() {
                return Ok(Value::NIL);
            }
            return Err(VmError::Core(CoreError::TypeError { op: "index", ty: target.type_name_primitive().unwrap_or("table") }));
        }
        if matches!(h, Value::Object(_) | Value::LightCFunction(_)) && is_callable(state, h) {
            return call_for_results(state, thread, h, &[target, key], 1).map(|mut r| r.pop().unwrap_or(Value::NIL));
        }
        target = h;
    }
    Err(VmError::Core(CoreError::TypeError { op: "index", ty: "table" }))
}

pub fn new_index(state: &mut GlobalState, thread: GcObjectId, mut target: Value, key: Value, value: Value) -> VmResult<()> {
    for _ in 0..100 {
        if let Value::Object(id) = target {
            let has_raw = state.heap.object_as_table(id).is_some_and(|t| !t.raw_get(&state.heap, &key).is_nil());
            if has_raw {
                return state.heap.raw_set_in(id, key, value).map_err(VmError::from);
            }
        }
        let h = state.heap.get_metamethod(&target, MetaEvent::NewIndex);
        if h.is_nil() {
            let Value::Object(id) = target else {
                return Err(VmError::Core(CoreError::TypeError { op: "index", ty: target.type_name_primitive().unwrap_or("table") }));
            };
            return state.heap.raw_set_in(id, key, value).map_err(VmError::from);
        }
        if is_callable(state, h) {
            call_for_results(state, thread, h, &[target, key, value], 0)?;
            return Ok(());
        }
        target = h;
    }
    Err(VmError::Core(CoreError::TypeError { op: "index", ty: "table" }))
}

fn is_callable(state: &GlobalState, v: Value) -> bool {
    match v {
        Value::LightCFunction(_) => true,
        Value::Object(id) => state.heap.object_is_callable(id),
        _ => false,
    }
}
