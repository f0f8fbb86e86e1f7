//! Function prototype — immutable compiled-code metadata (component G).
//!
//! Grounded on `lobject.h`'s `Proto` struct and `lundump.h`'s debug-info
//! layout. The bytecode array holds decoded [`Instruction`]s rather than
//! packed words (see `opcode.rs`); `quill-vm::interp` is the only crate
//! that gives them meaning.

use quill_gc::GcObjectId;

use crate::opcode::Instruction;
use crate::value::Value;

/// Where a closure's upvalue comes from when the closure is built by a
/// `CLOSURE` instruction (spec §4.9, §3.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpvalDesc {
    /// `true`: capture the enclosing *frame's* register `idx`. `false`:
    /// capture the enclosing *closure's* upvalue `idx`.
    pub in_stack: bool,
    pub idx: u8,
    pub name: GcObjectId,
}

/// One absolute `(pc, line)` checkpoint so large functions don't need a
/// linear scan of the delta-encoded line table (spec §4.7).
#[derive(Clone, Copy, Debug)]
pub struct AbsLineInfo {
    pub pc: u32,
    pub line: i32,
}

#[derive(Clone, Copy, Debug)]
pub struct LocalVarDesc {
    pub name: GcObjectId,
    pub start_pc: u32,
    pub end_pc: u32,
}

#[derive(Clone, Debug, Default)]
pub struct DebugInfo {
    /// Per-instruction signed line delta from the previous instruction;
    /// empty when the chunk was stripped.
    pub line_deltas: Vec<i8>,
    pub abs_line_info: Vec<AbsLineInfo>,
    pub local_vars: Vec<LocalVarDesc>,
    pub upvalue_names: Vec<Option<GcObjectId>>,
    pub source_name: Option<GcObjectId>,
    pub line_defined: i32,
    pub last_line_defined: i32,
}

/// Immutable once built (spec §4.7). Bytecode, constants, and nested
/// prototypes are produced by the external compiler and handed to
/// `quill-core` as a finished value; nothing here mutates after
/// construction except through interior GC bookkeeping (tracing, not the
/// fields themselves).
#[derive(Clone, Debug)]
pub struct Proto {
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
    /// Nested prototypes are heap objects (so they can be shared/traced
    /// independently); this holds handles into the arena, not the protos
    /// themselves.
    pub protos: Vec<GcObjectId>,
    pub upvalues: Vec<UpvalDesc>,
    pub debug: DebugInfo,
}

impl Proto {
    pub fn new(num_params: u8, is_vararg: bool, max_stack_size: u8) -> Self {
        Proto {
            num_params,
            is_vararg,
            max_stack_size: max_stack_size.max(2),
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            debug: DebugInfo::default(),
        }
    }

    /// Line for `pc`, reconstructed from the nearest preceding absolute
    /// checkpoint plus the intervening deltas (spec §4.7).
    pub fn line_for_pc(&self, pc: usize) -> i32 {
        if self.debug.line_deltas.is_empty() {
            return -1;
        }
        let mut checkpoint = self
            .debug
            .abs_line_info
            .iter()
            .rev()
            .find(|c| c.pc as usize <= pc)
            .copied()
            .unwrap_or(AbsLineInfo { pc: 0, line: self.debug.line_defined });
        let mut line = checkpoint.line;
        let mut p = checkpoint.pc as usize;
        while p < pc {
            line += self.debug.line_deltas.get(p + 1).copied().unwrap_or(0) as i32;
            p += 1;
        }
        checkpoint.pc = p as u32;
        line
    }
}

/// Objects a [`Proto`] references; used by `GlobalState`'s `trace_children`.
pub fn trace_proto(proto: &Proto, mut out: impl FnMut(GcObjectId)) {
    for &p in &proto.protos {
        out(p);
    }
    for c in &proto.constants {
        if let Value::Object(id) = c {
            out(*id);
        }
    }
    for up in &proto.upvalues {
        out(up.name);
    }
    if let Some(src) = proto.debug.source_name {
        out(src);
    }
    for local in &proto.debug.local_vars {
        out(local.name);
    }
    for name in proto.debug.upvalue_names.iter().flatten() {
        out(*name);
    }
}
