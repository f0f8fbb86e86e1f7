//! Value push/convert and raw accessors (spec §6.1 "Value push/convert",
//! supplement: `to_string_meta`/`raw_len`/`raw_equal`).
//!
//! A safe, typed surface rather than the source's stack-based API (spec
//! §6.1: "any presentation works... the core need only expose a safe
//! typed API to embedders", spec's Non-goals). Every constructor takes a
//! host primitive and returns a [`Value`] directly instead of pushing to
//! an implicit stack.

use quill_core::metamethod::MetaEvent;
use quill_core::{GlobalState, Value};
use quill_gc::GcObjectId;

use crate::error::EmbedResult;
use crate::state::State;

impl State {
    pub fn nil(&self) -> Value {
        Value::NIL
    }

    pub fn boolean(&self, b: bool) -> Value {
        Value::Boolean(b)
    }

    pub fn integer(&self, v: i64) -> Value {
        Value::Integer(v)
    }

    pub fn float(&self, v: f64) -> Value {
        Value::Float(v)
    }

    pub fn light_userdata(&self, ptr: usize) -> Value {
        Value::LightUserdata(ptr)
    }

    /// Intern `bytes` as a Lua string value (component B: short strings
    /// are deduplicated by identity, long ones are not).
    pub fn new_string(&mut self, bytes: &[u8]) -> EmbedResult<Value> {
        Ok(Value::Object(self.global.heap.new_string(bytes)?))
    }

    pub fn new_table(&mut self) -> EmbedResult<Value> {
        Ok(Value::Object(self.global.heap.new_table()?))
    }

    /// Typed accessor: `Some(bool)` only for an actual boolean, never
    /// coerced from truthiness (spec §6.1's typed-accessor contract).
    pub fn as_boolean(&self, v: Value) -> Option<bool> {
        match v {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self, v: Value) -> Option<i64> {
        match v {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Either numeric representation widened to `f64`; `None` for
    /// non-numbers (mirrors `lua_tonumberx`'s "accepts both subtypes").
    pub fn as_number(&self, v: Value) -> Option<f64> {
        v.as_f64()
    }

    pub fn as_string_bytes<'a>(&'a self, v: Value) -> Option<&'a [u8]> {
        match v {
            Value::Object(id) => self.global.heap.object_bytes(id),
            _ => None,
        }
    }

    pub fn type_name(&self, v: Value) -> &'static str {
        self.global.heap.type_tag_of(&v).name()
    }

    /// `lua_rawequal` (spec supplement): primitive/identity equality, no
    /// `__eq` metamethod consulted.
    pub fn raw_equal(&self, a: Value, b: Value) -> bool {
        match a.raw_primitive_eq(&b) {
            Some(eq) => eq,
            None => match (a, b) {
                (Value::Object(x), Value::Object(y)) => match (self.global.heap.object_as_table(x), self.global.heap.object_as_table(y)) {
                    (Some(_), Some(_)) => x == y,
                    _ => {
                        if let (Some(sx), Some(sy)) = (self.global.heap.object_bytes(x), self.global.heap.object_bytes(y)) {
                            sx == sy
                        } else {
                            x == y
                        }
                    }
                },
                _ => false,
            },
        }
    }

    /// `lua_rawlen` (spec supplement): table/string length with no
    /// `__len` metamethod consulted.
    pub fn raw_len(&self, v: Value) -> Option<i64> {
        match v {
            Value::Object(id) => {
                if let Some(bytes) = self.global.heap.object_bytes(id) {
                    Some(bytes.len() as i64)
                } else {
                    self.global.heap.object_as_table(id).map(|t| t.length(&self.global.heap))
                }
            }
            _ => None,
        }
    }

    /// `luaL_tolstring` (spec supplement): consult `__tostring`, else a
    /// type-tagged default rendering (`table: 0x...`).
    pub fn to_string_meta(&mut self, thread: GcObjectId, v: Value) -> EmbedResult<Vec<u8>> {
        let mm = self.global.heap.get_metamethod(&v, MetaEvent::ToString);
        if !mm.is_nil() {
            let results = quill_vm::call_for_results(&mut self.global, thread, mm, &[v], 1)?;
            let rendered = results.first().copied().unwrap_or(Value::NIL);
            if let Value::Object(id) = rendered {
                if let Some(bytes) = self.global.heap.object_bytes(id) {
                    return Ok(bytes.to_vec());
                }
            }
            return Ok(default_render(&self.global, rendered));
        }
        Ok(default_render(&self.global, v))
    }
}

fn default_render(global: &GlobalState, v: Value) -> Vec<u8> {
    match v {
        Value::Nil(_) => b"nil".to_vec(),
        Value::Boolean(true) => b"true".to_vec(),
        Value::Boolean(false) => b"false".to_vec(),
        Value::Integer(i) => i.to_string().into_bytes(),
        Value::Float(f) => format!("{f}").into_bytes(),
        Value::LightCFunction(_) => b"function: builtin".to_vec(),
        Value::LightUserdata(p) => format!("userdata: {p:#x}").into_bytes(),
        Value::Object(id) => {
            if let Some(bytes) = global.heap.object_bytes(id) {
                bytes.to_vec()
            } else {
                format!("{}: {:#x}", global.heap.type_tag_of(&v).name(), id.as_u32()).into_bytes()
            }
        }
    }
}
