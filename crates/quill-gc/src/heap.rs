//! The seam between the collector engine and the object model.
//!
//! `quill-core`'s `GlobalState` (and the per-kind arenas it owns)
//! implements this trait once; everything in [`crate::collector`] talks to
//! the heap only through it. This keeps tracing logic for strings,
//! tables, closures, prototypes, upvalues, userdata, and threads entirely
//! inside `quill-core`, where the types actually live, while the
//! mark/sweep/barrier *mechanism* stays reusable and independent of them.

use crate::color::Color;
use crate::header::GcHeader;
use crate::GcObjectId;

/// How a table's `__mode` metafield should be treated during the atomic
/// phase's weak-table pass (spec §4.5 "Weak tables").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeakMode {
    /// `__mode` contains 'k' only.
    WeakKeys,
    /// `__mode` contains 'v' only.
    WeakValues,
    /// `__mode` contains both 'k' and 'v'.
    WeakBoth,
    /// Weak keys, strong values: reachability of a value depends on its
    /// key also being reachable (spec's ephemeron table).
    Ephemeron,
}

pub trait Heap {
    fn header(&self, id: GcObjectId) -> GcHeader;
    fn set_header(&mut self, id: GcObjectId, header: GcHeader);

    /// Call `out` once per object directly reachable from `id` (one hop,
    /// not transitive). Mirrors each object kind's own reference set:
    /// a table yields its metatable plus every array/hash slot that holds
    /// a collectable value; a Lua closure yields its prototype and each
    /// upvalue; a thread yields every live stack slot and open upvalue.
    fn trace_children(&self, id: GcObjectId, out: &mut dyn FnMut(GcObjectId));

    /// Root set: the main thread, the registry table, every other thread
    /// the embedder still holds a reference to, and (during a running
    /// call) the currently executing thread's stack.
    fn roots(&self, out: &mut dyn FnMut(GcObjectId));

    /// Snapshot of every live object id, for the sweep phase to walk.
    /// `quill-core` backs this with its arena's occupied-slot list; taking
    /// a snapshot rather than an iterator keeps the collector from having
    /// to reason about slots freed mid-sweep.
    fn all_objects(&self) -> Vec<GcObjectId>;

    fn has_finalizer(&self, id: GcObjectId) -> bool;

    /// Run `id`'s `__gc` metamethod in a protected frame. Errors are
    /// swallowed into a warning by the caller (spec §4.5 step 6) — this
    /// returns `Err` only so the collector can log *that* it happened.
    fn run_finalizer(&mut self, id: GcObjectId) -> Result<(), String>;

    /// Did `id`'s finalizer resurrect it (give a still-reachable object a
    /// reference to it)? Checked immediately after `run_finalizer`.
    fn is_resurrected(&self, id: GcObjectId) -> bool;

    /// Reclaim `id`'s storage. Called from the sweep phase for dead
    /// objects, and again after finalization for objects that were not
    /// resurrected.
    fn free(&mut self, id: GcObjectId);

    /// Every table/userdata with a `__mode` field, and which mode it is
    /// in. Scanned during the atomic phase (spec §4.5 step 4: "clear weak
    /// tables").
    fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)>;

    /// Remove every entry from `id` (a weak container) whose relevant
    /// side(s) are dead under `current_white`. For `WeakMode::Ephemeron`
    /// this is one fixed-point iteration; the collector calls it
    /// repeatedly until no entry is removed in a pass, per spec's
    /// "fixed-point marking during atomic phase".
    fn clear_dead_weak_entries(&mut self, id: GcObjectId, current_white: Color) -> usize;

    /// For an ephemeron whose key turned out reachable this pass, mark its
    /// value reachable too and report the newly-gray ids so the collector
    /// can push them back onto the gray list.
    fn revive_ephemeron_values(&mut self, id: GcObjectId, current_white: Color, out: &mut dyn FnMut(GcObjectId));
}
