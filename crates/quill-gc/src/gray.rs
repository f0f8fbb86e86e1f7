//! The named gray work-lists (spec §4.5 "Gray lists": `gray`, `grayagain`,
//! `weak`, `ephemeron`, `allweak`).
//!
//! Every object on any of these lists is gray, with two documented
//! exceptions the spec calls out: a `Touched2` object is black but sits on
//! a gray-ish list so that a further write to it still trips the barrier,
//! and an open upvalue is gray without being enqueued anywhere (the owning
//! thread's trace walks it directly). Both exceptions are handled by
//! `quill-core`'s `Heap` impl, not here — this struct is just the queues.

use crate::GcObjectId;

#[derive(Debug, Default)]
pub struct GrayLists {
    /// Marked, not yet traversed: the main incremental work queue.
    pub gray: Vec<GcObjectId>,
    /// Objects that turned black during propagation but were then written
    /// to via the back barrier; rescanned in the atomic phase.
    pub grayagain: Vec<GcObjectId>,
    /// Weak-value (or weak-both) tables, deferred to the atomic phase.
    pub weak: Vec<GcObjectId>,
    /// Ephemeron tables (weak key, strong value), resolved by fixed point
    /// during the atomic phase.
    pub ephemeron: Vec<GcObjectId>,
    /// Weak-key-and-value tables with no strong side at all.
    pub allweak: Vec<GcObjectId>,
}

impl GrayLists {
    pub fn clear(&mut self) {
        self.gray.clear();
        self.grayagain.clear();
        self.weak.clear();
        self.ephemeron.clear();
        self.allweak.clear();
    }

    pub fn is_propagation_done(&self) -> bool {
        self.gray.is_empty()
    }
}
