//! The registry mechanism (spec §6.1 "References"): pin values from host
//! code without holding a VM pointer.

use quill_core::Value;

use crate::error::EmbedResult;
use crate::state::State;

impl State {
    /// `ref(v) -> int`. Two calls on equal-but-distinct values return
    /// distinct handles (spec §8's round-trip law).
    pub fn reference(&mut self, v: Value) -> EmbedResult<i64> {
        Ok(self.global.heap.reference(v)?)
    }

    /// `unref(int)`. A stale or already-freed handle is a silent no-op,
    /// matching `luaL_unref`'s tolerance of `LUA_NOREF`/`LUA_REFNIL`.
    pub fn unreference(&mut self, handle: i64) -> EmbedResult<()> {
        Ok(self.global.heap.unreference(handle)?)
    }

    pub fn get_reference(&self, handle: i64) -> Value {
        self.global.heap.get_reference(handle)
    }
}
