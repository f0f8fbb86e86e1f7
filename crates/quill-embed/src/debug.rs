//! Stack/frame introspection (spec §6.1 "Debug introspection"): walk the
//! call-info chain, report source position, list locals and upvalues.
//!
//! There is no disassembler or bytecode-level single-stepper here (spec's
//! Non-goal on the debug-hook mechanism); this is the read-only half a
//! host needs to build an error traceback or a `debug.getlocal`-style
//! call.

use quill_core::thread::CallInfoKind;
use quill_gc::GcObjectId;

use crate::state::State;

/// One frame of a traceback, level 0 being the currently running frame.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    pub is_lua: bool,
    pub is_tail_call: bool,
    pub source_name: Option<Vec<u8>>,
    pub current_line: i32,
    pub line_defined: i32,
    pub last_line_defined: i32,
}

#[derive(Clone, Debug)]
pub struct LocalInfo {
    pub name: Vec<u8>,
    pub slot: usize,
}

impl State {
    /// Level 0 is the innermost frame, matching `lua_getstack`'s
    /// convention. `None` past the bottom of the stack.
    pub fn debug_stack_info(&self, thread: GcObjectId, level: usize) -> Option<FrameInfo> {
        let th = self.global.heap.thread(thread);
        let idx = th.call_infos.len().checked_sub(1 + level)?;
        let ci = &th.call_infos[idx];
        match &ci.kind {
            CallInfoKind::Lua { proto, saved_pc, .. } => {
                let p = self.global.heap.proto(*proto);
                let source_name = p.debug.source_name.and_then(|id| self.global.heap.object_bytes(id)).map(|b| b.to_vec());
                Some(FrameInfo {
                    is_lua: true,
                    is_tail_call: ci.is_tail_call,
                    source_name,
                    current_line: p.line_for_pc(*saved_pc),
                    line_defined: p.debug.line_defined,
                    last_line_defined: p.debug.last_line_defined,
                })
            }
            CallInfoKind::C { .. } => Some(FrameInfo {
                is_lua: false,
                is_tail_call: ci.is_tail_call,
                source_name: None,
                current_line: -1,
                line_defined: -1,
                last_line_defined: -1,
            }),
        }
    }

    /// Locals in scope at `level`'s current pc (spec §4.7's per-pc live
    /// range), in declaration order.
    pub fn debug_locals(&self, thread: GcObjectId, level: usize) -> Vec<LocalInfo> {
        let th = self.global.heap.thread(thread);
        let Some(idx) = th.call_infos.len().checked_sub(1 + level) else { return Vec::new() };
        let ci = &th.call_infos[idx];
        let CallInfoKind::Lua { proto, saved_pc, .. } = &ci.kind else { return Vec::new() };
        let p = self.global.heap.proto(*proto);
        let pc = *saved_pc as u32;
        p.debug
            .local_vars
            .iter()
            .enumerate()
            .filter(|(_, l)| l.start_pc <= pc && pc < l.end_pc)
            .filter_map(|(slot, l)| self.global.heap.object_bytes(l.name).map(|b| LocalInfo { name: b.to_vec(), slot }))
            .collect()
    }

    /// Upvalue names captured by the closure at `level`, in the
    /// prototype's declared order.
    pub fn debug_upvalues(&self, thread: GcObjectId, level: usize) -> Vec<Vec<u8>> {
        let th = self.global.heap.thread(thread);
        let Some(idx) = th.call_infos.len().checked_sub(1 + level) else { return Vec::new() };
        let ci = &th.call_infos[idx];
        let CallInfoKind::Lua { proto, .. } = &ci.kind else { return Vec::new() };
        let p = self.global.heap.proto(*proto);
        p.debug
            .upvalue_names
            .iter()
            .map(|name| name.and_then(|id| self.global.heap.object_bytes(id)).map(|b| b.to_vec()).unwrap_or_default())
            .collect()
    }

    pub fn debug_stack_depth(&self, thread: GcObjectId) -> usize {
        self.global.heap.thread(thread).call_infos.len()
    }
}
