//! The heap object sum type and the object arena (spec §3.2's common
//! header, realized here as the `GcObject` enum plus `GlobalState`'s
//! parallel `headers`/`objects` vectors rather than an intrusive
//! `next`-linked list — the arena-of-indices design spec §9 recommends).

use quill_gc::GcObjectId;

use crate::closure::{trace_cclosure, trace_lua_closure, trace_upvalue, CClosure, LuaClosure, Upvalue};
use crate::proto::{trace_proto, Proto};
use crate::string_table::LuaString;
use crate::table::{trace_table, Table};
use crate::thread::{trace_thread, Thread};
use crate::value::{TypeTag, Value};

/// A host-owned block with an optional metatable and a fixed number of
/// associated `Value` slots (spec glossary: "Userdata").
pub struct Userdata {
    pub data: Box<dyn std::any::Any>,
    pub metatable: Option<GcObjectId>,
    pub user_values: Vec<Value>,
}

impl std::fmt::Debug for Userdata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Userdata").field("user_values", &self.user_values.len()).finish()
    }
}

/// Every kind of heap object the collector manages. `quill-core`'s object
/// arena stores these behind a [`GcObjectId`]; `GlobalState::header`/
/// `trace_children` dispatch on this enum to satisfy `quill_gc::Heap`.
#[derive(Debug)]
pub enum GcObject {
    ShortString(LuaString),
    LongString(LuaString),
    Table(Table),
    LuaClosure(LuaClosure),
    CClosure(CClosure),
    Proto(Proto),
    Upvalue(Upvalue),
    Thread(Thread),
    Userdata(Userdata),
}

impl GcObject {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            GcObject::ShortString(_) | GcObject::LongString(_) => TypeTag::String,
            GcObject::Table(_) => TypeTag::Table,
            GcObject::LuaClosure(_) | GcObject::CClosure(_) => TypeTag::Function,
            GcObject::Proto(_) | GcObject::Upvalue(_) => TypeTag::Userdata, // internal, never user-visible
            GcObject::Thread(_) => TypeTag::Thread,
            GcObject::Userdata(_) => TypeTag::Userdata,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            GcObject::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            GcObject::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&LuaString> {
        match self {
            GcObject::ShortString(s) | GcObject::LongString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&Thread> {
        match self {
            GcObject::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_thread_mut(&mut self) -> Option<&mut Thread> {
        match self {
            GcObject::Thread(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proto(&self) -> Option<&Proto> {
        match self {
            GcObject::Proto(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_lua_closure(&self) -> Option<&LuaClosure> {
        match self {
            GcObject::LuaClosure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_cclosure(&self) -> Option<&CClosure> {
        match self {
            GcObject::CClosure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_upvalue(&self) -> Option<&Upvalue> {
        match self {
            GcObject::Upvalue(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_upvalue_mut(&mut self) -> Option<&mut Upvalue> {
        match self {
            GcObject::Upvalue(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&Userdata> {
        match self {
            GcObject::Userdata(u) => Some(u),
            _ => None,
        }
    }

    pub fn metatable(&self) -> Option<GcObjectId> {
        match self {
            GcObject::Table(t) => t.metatable,
            GcObject::Userdata(u) => u.metatable,
            _ => None,
        }
    }

    /// Every object this one directly references, for the collector's
    /// `trace_children` (spec §4.5's mark phase).
    pub fn trace(&self, mut out: impl FnMut(GcObjectId)) {
        match self {
            GcObject::ShortString(_) | GcObject::LongString(_) => {}
            GcObject::Table(t) => trace_table(t, &mut out),
            GcObject::LuaClosure(c) => trace_lua_closure(c, &mut out),
            GcObject::CClosure(c) => trace_cclosure(c, &mut out),
            GcObject::Proto(p) => trace_proto(p, &mut out),
            GcObject::Upvalue(u) => trace_upvalue(u, &mut out),
            GcObject::Thread(t) => trace_thread(t, &mut out),
            GcObject::Userdata(u) => {
                if let Some(mt) = u.metatable {
                    out(mt);
                }
                for v in &u.user_values {
                    if let Value::Object(id) = v {
                        out(*id);
                    }
                }
            }
        }
    }

    /// A cheap size estimate for GC debt accounting (spec §4.4). Does not
    /// need to be exact — only proportionate, so debt-driven pacing stays
    /// meaningful.
    pub fn approx_size_bytes(&self) -> usize {
        let base = std::mem::size_of::<GcObject>();
        match self {
            GcObject::ShortString(s) | GcObject::LongString(s) => base + s.len(),
            GcObject::Table(t) => {
                base + t.array_len() * std::mem::size_of::<Value>()
                    + t.hash_len() * (std::mem::size_of::<Value>() * 2)
            }
            GcObject::LuaClosure(c) => base + c.upvalues.len() * 4,
            GcObject::CClosure(c) => base + c.upvalues.len() * std::mem::size_of::<Value>(),
            GcObject::Proto(p) => {
                base + p.code.len() * std::mem::size_of::<crate::opcode::Instruction>()
                    + p.constants.len() * std::mem::size_of::<Value>()
                    + p.debug.line_deltas.len()
            }
            GcObject::Upvalue(_) => base,
            GcObject::Thread(t) => base + t.stack.len() * std::mem::size_of::<Value>(),
            GcObject::Userdata(u) => base + u.user_values.len() * std::mem::size_of::<Value>(),
        }
    }
}
