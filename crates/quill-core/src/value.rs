//! The tagged-value representation (component A).
//!
//! `lobject.h` packs type and variant into a single byte (`makevariant`,
//! `ctb`) so a bare `TValue` can be copied by value as a C struct. An
//! idiomatic Rust port gets the same "one word, no allocation, tag tells
//! you the payload" contract from a plain `enum` — the compiler lays it
//! out as tightly as the explicit bit-packing would, and every accessor
//! below is a `match` instead of a bit-test, which is the one-to-one
//! replacement `spec.md`'s Non-goals section calls out as acceptable.

use std::cmp::Ordering;

use quill_gc::GcObjectId;

use crate::error::{CoreError, CoreResult};
use crate::thread::Thread;

/// The four nil-family sentinels from spec §3.1. All four are "falsy" and
/// (for `Nil`/`Empty`/`AbsentKey`) indistinguishable from the language's
/// point of view, but the engine must keep them apart internally: `Empty`
/// marks an unused array slot during rehash, `AbsentKey` is `raw_get`'s
/// "no such key" signal that must never leak into a value the VM stores,
/// and `NotATable` is `GETTABLE`'s fast-path failure signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NilVariant {
    Nil,
    Empty,
    AbsentKey,
    NotATable,
}

/// A bare host function pointer with no captured state (spec §3.5,
/// `LightCFunction`). `CClosure` (captured values, component F) lives on
/// the heap instead since it owns a `Vec<Value>`.
pub type HostFn = fn(&mut Thread) -> CoreResult<i32>;

/// One runtime value. Copy, no allocation, sized to a cache line's worth
/// of tag + largest payload (a `GcObjectId` is 4 bytes, a float 8 — the
/// enum's discriminant brings this to 16 bytes on a 64-bit target, same
/// order of magnitude as Lua's `TValue`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Nil(NilVariant),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// An opaque host-owned address, not traced by the GC (spec §3.1).
    LightUserdata(usize),
    LightCFunction(HostFn),
    /// A handle into the owning [`GlobalState`](crate::global_state::GlobalState)'s
    /// object arena. What kind of heap object it names is resolved by a
    /// lookup, not encoded in the `Value` itself (see `object.rs`).
    Object(GcObjectId),
}

/// The coarse type a value reports to `type()`/`lua_type` — independent of
/// the short/long-string or Lua/C-closure variant distinctions that only
/// matter internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Nil => "nil",
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Table => "table",
            TypeTag::Function => "function",
            TypeTag::Userdata => "userdata",
            TypeTag::Thread => "thread",
        }
    }
}

/// Float-to-integer coercion mode (spec §3.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum F2IMode {
    /// Only floats that hold an exact integral value convert.
    Eq,
    /// Round toward negative infinity.
    Floor,
    /// Round toward positive infinity.
    Ceil,
}

impl Value {
    pub const NIL: Value = Value::Nil(NilVariant::Nil);
    pub const EMPTY: Value = Value::Nil(NilVariant::Empty);
    pub const ABSENT_KEY: Value = Value::Nil(NilVariant::AbsentKey);
    pub const NOT_A_TABLE: Value = Value::Nil(NilVariant::NotATable);

    pub fn integer(v: i64) -> Value {
        Value::Integer(v)
    }

    pub fn float(v: f64) -> Value {
        Value::Float(v)
    }

    /// Only `false` and the user-visible `nil` are falsy (spec §3.1); the
    /// internal nil sentinels are never observed by language-level code
    /// but are falsy too since nothing depends on them being otherwise.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil(_) | Value::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil(NilVariant::Nil))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<GcObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Integer(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Float → integer conversion under the given mode (spec §3.1).
    pub fn float_to_integer(f: f64, mode: F2IMode) -> Option<i64> {
        let rounded = match mode {
            F2IMode::Eq => f,
            F2IMode::Floor => f.floor(),
            F2IMode::Ceil => f.ceil(),
        };
        if mode == F2IMode::Eq && f.fract() != 0.0 {
            return None;
        }
        if !rounded.is_finite() || rounded < -(2f64.powi(63)) || rounded >= 2f64.powi(63) {
            return None;
        }
        Some(rounded as i64)
    }

    pub fn to_integer(&self, mode: F2IMode) -> Option<i64> {
        match *self {
            Value::Integer(i) => Some(i),
            Value::Float(f) => Value::float_to_integer(f, mode),
            _ => None,
        }
    }

    /// Raw equality (spec §4.3): same tag compares payloads directly,
    /// except the int/float cross-type numeric rule. Never consults
    /// `__eq` — string/table/closure identity comparison needs the
    /// object arena and lives on `GlobalState` instead.
    pub fn raw_primitive_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Nil(_), Value::Nil(_)) => Some(true),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a == b),
            (Value::Integer(a), Value::Integer(b)) => Some(a == b),
            (Value::Float(a), Value::Float(b)) => Some(a == b),
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                Some((*a as f64) == *b)
            }
            (Value::LightUserdata(a), Value::LightUserdata(b)) => Some(a == b),
            (Value::LightCFunction(a), Value::LightCFunction(b)) => Some(std::ptr::fn_addr_eq(*a, *b)),
            (Value::Object(a), Value::Object(b)) => Some(a == b),
            _ => None,
        }
    }

    pub fn type_name_primitive(&self) -> Option<&'static str> {
        match self {
            Value::Nil(_) => Some("nil"),
            Value::Boolean(_) => Some("boolean"),
            Value::Integer(_) | Value::Float(_) => Some("number"),
            Value::LightUserdata(_) => Some("userdata"),
            Value::LightCFunction(_) => Some("function"),
            Value::Object(_) => None,
        }
    }
}

/// Numeric ordering for `<`/`<=` among numbers only (spec §3.1, §4.13
/// `__lt`/`__le`). Mixed int/float compares without the precision loss a
/// naive `as f64` cast on both sides would introduce for large integers.
pub fn number_partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        _ => None,
    }
}

/// Arithmetic operand-kind rule from spec §3.1: `+ - * // %` stay integer
/// iff both operands are integer; `/` and `^` are always float.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithKind {
    IntOrFloat,
    AlwaysFloat,
}

pub fn type_error(op: &'static str, v: &Value) -> CoreError {
    CoreError::TypeError { op, ty: v.type_name_primitive().unwrap_or("userdata") }
}
