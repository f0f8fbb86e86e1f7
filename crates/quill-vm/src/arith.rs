//! Inline arithmetic (component I's "if both operands are numbers of the
//! right flavor, execute inline" fast path, spec §3.1/§4.9).
//!
//! Every function here is pure and heap-free — the hot-path invariant
//! spec §4.9 calls out ("the most common path ... must not touch the
//! heap"). `interp.rs` falls through to `metamethod_dispatch` whenever
//! these return `None`.

use quill_core::error::CoreError;
use quill_core::opcode::ArithOp;
use quill_core::value::{F2IMode, Value};

/// Try the inline path for a binary arithmetic opcode. `None` means
/// "not both numbers of the needed flavor, go try a metamethod";
/// `Some(Err(..))` means the operands were numbers but the operation
/// itself is invalid (e.g. a non-integral float used as a bitwise
/// operand, or integer division/modulo by zero).
pub fn arith_fast(op: ArithOp, a: Value, b: Value) -> Option<Result<Value, CoreError>> {
    if op.is_bitwise() {
        let ia = match to_bitwise_operand(a)? {
            Ok(i) => i,
            Err(e) => return Some(Err(e)),
        };
        let ib = match to_bitwise_operand(b)? {
            Ok(i) => i,
            Err(e) => return Some(Err(e)),
        };
        return Some(Ok(bitwise(op, ia, ib)));
    }

    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if !op.always_float() => Some(int_arith(op, x, y)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let x = a.as_f64()?;
            let y = b.as_f64()?;
            Some(Ok(Value::Float(float_arith(op, x, y))))
        }
        _ => None,
    }
}

/// `None`: not a number at all (defer to metamethod lookup). `Some(Err)`:
/// a number without an exact integer representation (spec §3.1: bitwise
/// ops "accept floats only if they represent an integer value exactly,
/// else error" — not a metamethod fallback).
fn to_bitwise_operand(v: Value) -> Option<Result<i64, CoreError>> {
    match v {
        Value::Integer(i) => Some(Ok(i)),
        Value::Float(f) => Some(Value::float_to_integer(f, F2IMode::Eq).ok_or(CoreError::NoIntegerRepresentation)),
        _ => None,
    }
}

fn bitwise(op: ArithOp, a: i64, b: i64) -> Value {
    let r = match op {
        ArithOp::Band => a & b,
        ArithOp::Bor => a | b,
        ArithOp::Bxor => a ^ b,
        ArithOp::Shl => shift(a, b),
        ArithOp::Shr => shift(a, -b),
        _ => unreachable!("bitwise() called with non-bitwise op"),
    };
    Value::Integer(r)
}

/// Lua's shift semantics: a negative count shifts the other direction,
/// and a count `|n| >= 64` always yields zero rather than relying on the
/// host shift instruction's undefined behavior at that width.
fn shift(a: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else {
        ((a as u64) >> (-n)) as i64
    }
}

/// Integer arithmetic with two's-complement wrap-around (spec §3.1, §8
/// boundary behavior: "integer arithmetic wraps at 2^63").
fn int_arith(op: ArithOp, x: i64, y: i64) -> Result<Value, CoreError> {
    let r = match op {
        ArithOp::Add => x.wrapping_add(y),
        ArithOp::Sub => x.wrapping_sub(y),
        ArithOp::Mul => x.wrapping_mul(y),
        ArithOp::Idiv => {
            if y == 0 {
                return Err(CoreError::BadArgument { index: 2, message: "attempt to perform 'n//0'".into() });
            }
            int_floor_div(x, y)
        }
        ArithOp::Mod => {
            if y == 0 {
                return Err(CoreError::BadArgument { index: 2, message: "attempt to perform 'n%0'".into() });
            }
            int_floor_mod(x, y)
        }
        ArithOp::Div | ArithOp::Pow => unreachable!("always_float ops never reach int_arith"),
        _ => unreachable!("bitwise op routed to int_arith"),
    };
    Ok(Value::Integer(r))
}

/// Floor division rounds toward negative infinity for either operand's
/// sign (`luaV_idiv`'s trick: truncating division, then correct by one
/// when the remainder's sign disagrees with the divisor's).
fn int_floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

fn int_floor_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        r.wrapping_add(y)
    } else {
        r
    }
}

fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Pow => x.powf(y),
        ArithOp::Idiv => (x / y).floor(),
        ArithOp::Mod => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        ArithOp::Band | ArithOp::Bor | ArithOp::Bxor | ArithOp::Shl | ArithOp::Shr => {
            unreachable!("bitwise op routed to float_arith")
        }
    }
}

/// Unary minus (spec §4.9 `UNM`): integer negation wraps, float negation
/// doesn't change sign of magnitude-zero in a way that matters here.
pub fn unary_minus(v: Value) -> Option<Value> {
    match v {
        Value::Integer(i) => Some(Value::Integer(i.wrapping_neg())),
        Value::Float(f) => Some(Value::Float(-f)),
        _ => None,
    }
}

pub fn bitwise_not(v: Value) -> Option<Value> {
    match v {
        Value::Integer(i) => Some(Value::Integer(!i)),
        _ => None,
    }
}

/// Numeric `<`/`<=` without the precision loss a naive cast would
/// introduce (spec §3.1).
pub fn numeric_less(a: Value, b: Value, or_equal: bool) -> Option<bool> {
    let ord = quill_core::value::number_partial_cmp(&a, &b)?;
    Some(if or_equal { ord != std::cmp::Ordering::Greater } else { ord == std::cmp::Ordering::Less })
}

pub fn float_to_integer_checked(f: f64, mode: F2IMode) -> Result<i64, CoreError> {
    Value::float_to_integer(f, mode).ok_or(CoreError::NoIntegerRepresentation)
}
