//! Metamethod event catalogue and the lookup *protocol* (component M).
//!
//! Grounded on `ltm.h`'s `TMS` enum and spec §4.13. This module only
//! answers "which event, and where would we look" — actually invoking a
//! function metamethod means running bytecode, which belongs to
//! `quill-vm`'s interpreter. Keeping the split here is what lets
//! `quill-core` stay free of a dependency on the VM.

/// One metamethod event (spec §4.13). Order matches the fast-path bits in
/// [`crate::table::metaflag`] for the six events worth caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaEvent {
    Index,
    NewIndex,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Idiv,
    Unm,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
    Bnot,
    Eq,
    Lt,
    Le,
    Concat,
    Len,
    Call,
    ToString,
    Gc,
    Close,
    Mode,
    Metatable,
    Name,
}

impl MetaEvent {
    /// The interned event name, e.g. `"__index"`.
    pub fn name(self) -> &'static str {
        match self {
            MetaEvent::Index => "__index",
            MetaEvent::NewIndex => "__newindex",
            MetaEvent::Add => "__add",
            MetaEvent::Sub => "__sub",
            MetaEvent::Mul => "__mul",
            MetaEvent::Div => "__div",
            MetaEvent::Mod => "__mod",
            MetaEvent::Pow => "__pow",
            MetaEvent::Idiv => "__idiv",
            MetaEvent::Unm => "__unm",
            MetaEvent::Band => "__band",
            MetaEvent::Bor => "__bor",
            MetaEvent::Bxor => "__bxor",
            MetaEvent::Shl => "__shl",
            MetaEvent::Shr => "__shr",
            MetaEvent::Bnot => "__bnot",
            MetaEvent::Eq => "__eq",
            MetaEvent::Lt => "__lt",
            MetaEvent::Le => "__le",
            MetaEvent::Concat => "__concat",
            MetaEvent::Len => "__len",
            MetaEvent::Call => "__call",
            MetaEvent::ToString => "__tostring",
            MetaEvent::Gc => "__gc",
            MetaEvent::Close => "__close",
            MetaEvent::Mode => "__mode",
            MetaEvent::Metatable => "__metatable",
            MetaEvent::Name => "__name",
        }
    }

    /// The `flags` bit this event is worth caching under (spec §4.2's
    /// "one bit per fast event: index, newindex, gc, mode, len, eq").
    /// Events outside that set always do a full lookup.
    pub fn cache_bit(self) -> Option<u8> {
        use crate::table::metaflag;
        match self {
            MetaEvent::Index => Some(metaflag::INDEX),
            MetaEvent::NewIndex => Some(metaflag::NEWINDEX),
            MetaEvent::Gc => Some(metaflag::GC),
            MetaEvent::Mode => Some(metaflag::MODE),
            MetaEvent::Len => Some(metaflag::LEN),
            MetaEvent::Eq => Some(metaflag::EQ),
            _ => None,
        }
    }

    pub const ALL: &'static [MetaEvent] = &[
        MetaEvent::Index,
        MetaEvent::NewIndex,
        MetaEvent::Add,
        MetaEvent::Sub,
        MetaEvent::Mul,
        MetaEvent::Div,
        MetaEvent::Mod,
        MetaEvent::Pow,
        MetaEvent::Idiv,
        MetaEvent::Unm,
        MetaEvent::Band,
        MetaEvent::Bor,
        MetaEvent::Bxor,
        MetaEvent::Shl,
        MetaEvent::Shr,
        MetaEvent::Bnot,
        MetaEvent::Eq,
        MetaEvent::Lt,
        MetaEvent::Le,
        MetaEvent::Concat,
        MetaEvent::Len,
        MetaEvent::Call,
        MetaEvent::ToString,
        MetaEvent::Gc,
        MetaEvent::Close,
        MetaEvent::Mode,
        MetaEvent::Metatable,
        MetaEvent::Name,
    ];
}

/// Where a metamethod lookup for a binary operator should search, in
/// order (spec §4.13's lookup protocol).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaSearchOrder {
    /// Look at the left operand's metatable, then the right's.
    LeftThenRight,
    /// `__index`/`__newindex` only ever consult the indexed value itself.
    TargetOnly,
}

impl MetaEvent {
    pub fn search_order(self) -> MetaSearchOrder {
        match self {
            MetaEvent::Index | MetaEvent::NewIndex => MetaSearchOrder::TargetOnly,
            _ => MetaSearchOrder::LeftThenRight,
        }
    }
}
