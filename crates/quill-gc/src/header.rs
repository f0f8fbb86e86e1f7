//! Per-object GC metadata (spec §3.2 "common header": `next`, `tag`,
//! `marked`).
//!
//! `fgc`'s header packs mark bits into spare pointer bits because it must
//! survive concurrent, lock-free access from mutator and collector
//! threads at once. This engine runs on one thread at a time (spec §5), so
//! the header is a plain struct field next to each arena slot instead —
//! there is nothing to race with.

use crate::color::{Age, Color};

/// GC bookkeeping attached to every heap object.
///
/// `quill-core` embeds one of these inside (or alongside) every arena
/// slot; `Heap::header`/`header_mut` hand a reference to it back to the
/// collector. Object *identity* (the `tag`/payload the spec's common
/// header also names) stays in `quill-core` since the collector does not
/// need to know what kind of object it is, only what color it is and how
/// to ask it for its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHeader {
    pub color: Color,
    pub age: Age,
    /// Set once a `__gc`/finalizer-bearing metatable is attached; keeps
    /// the object on the `finobj` list for one extra cycle after it first
    /// becomes reachable (spec §4.5 "Finalization").
    pub has_finalizer: bool,
    /// True from the moment the object is moved to `tobefnz` until its
    /// finalizer has actually run; lets `quill-core` tell "pending
    /// finalization" apart from "ordinary reachable object".
    pub awaiting_finalizer: bool,
    /// Size in bytes, for GC debt accounting (spec §4.4).
    pub size_bytes: u32,
}

impl GcHeader {
    /// A freshly allocated object: current-white, `New`, no finalizer.
    pub fn new(current_white: Color, size_bytes: u32) -> Self {
        debug_assert!(current_white.is_white());
        Self {
            color: current_white,
            age: Age::New,
            has_finalizer: false,
            awaiting_finalizer: false,
            size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_header_is_current_white() {
        let h = GcHeader::new(Color::White0, 32);
        assert_eq!(h.color, Color::White0);
        assert_eq!(h.age, Age::New);
        assert!(!h.has_finalizer);
    }
}
