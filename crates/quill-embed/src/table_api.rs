//! Table access: raw and cooked get/set/len/next (spec §6.1 "Table
//! access").
//!
//! "Cooked" operations go through [`quill_vm::metamethod_dispatch`] so
//! `__index`/`__newindex`/`__len` fire; "raw" operations call straight
//! into [`quill_core::table::Table`] and never consult a metatable,
//! matching `lua_rawget`/`lua_rawset`'s contract.

use quill_core::{CoreError, Value};
use quill_gc::GcObjectId;

use crate::error::{EmbedError, EmbedResult};
use crate::state::State;

impl State {
    pub fn raw_get(&self, table: Value, key: Value) -> EmbedResult<Value> {
        let Value::Object(id) = table else { return Err(EmbedError::Core(CoreError::TypeError { op: "index", ty: "non-table" })) };
        let t = self.global.heap.object_as_table(id).ok_or(CoreError::TypeError { op: "index", ty: "non-table" })?;
        Ok(t.raw_get(&self.global.heap, &key))
    }

    pub fn raw_set(&mut self, table: Value, key: Value, value: Value) -> EmbedResult<()> {
        let Value::Object(id) = table else { return Err(EmbedError::Core(CoreError::TypeError { op: "index", ty: "non-table" })) };
        if self.global.heap.object_as_table(id).is_none() {
            return Err(EmbedError::Core(CoreError::TypeError { op: "index", ty: "non-table" }));
        }
        self.global.heap.raw_set_in(id, key, value)?;
        Ok(())
    }

    pub fn raw_next(&self, table: Value, key: Value) -> EmbedResult<Option<(Value, Value)>> {
        let Value::Object(id) = table else { return Err(EmbedError::Core(CoreError::TypeError { op: "iterate", ty: "non-table" })) };
        let t = self.global.heap.object_as_table(id).ok_or(CoreError::TypeError { op: "iterate", ty: "non-table" })?;
        Ok(t.next_key(&self.global.heap, &key)?)
    }

    /// Cooked get: consults `__index` when the raw lookup misses or the
    /// target isn't a table (spec §4.13).
    pub fn get(&mut self, thread: GcObjectId, table: Value, key: Value) -> EmbedResult<Value> {
        Ok(quill_vm::metamethod_dispatch::index(&mut self.global, thread, table, key)?)
    }

    /// Cooked set: consults `__newindex` (spec §4.13).
    pub fn set(&mut self, thread: GcObjectId, table: Value, key: Value, value: Value) -> EmbedResult<()> {
        quill_vm::metamethod_dispatch::new_index(&mut self.global, thread, table, key, value)?;
        Ok(())
    }

    /// Cooked length: consults `__len` (spec §4.13, §8's `#t` border
    /// note — see [`State::raw_len`]'s raw counterpart for the
    /// no-metamethod case).
    pub fn len(&mut self, thread: GcObjectId, v: Value) -> EmbedResult<Value> {
        Ok(quill_vm::metamethod_dispatch::length(&mut self.global, thread, v)?)
    }
}
