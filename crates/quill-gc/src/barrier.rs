//! Write barriers (spec §4.5 "Write barriers").
//!
//! Every mutation path in `quill-core`/`quill-vm` that can create a
//! heap-to-heap reference must call exactly one of these. Missing a
//! barrier is a safety bug (a black object can end up pointing at a white
//! one, which the sweeper then frees out from under it); calling one too
//! many times only costs cycles.

use crate::collector::Collector;
use crate::color::Age;
use crate::heap::Heap;
use crate::GcObjectId;

/// Forward barrier: `owner` (already black) just acquired a reference to
/// `child`. If we're in the middle of incremental marking and `child` is
/// still white, gray it immediately so the strong tricolor invariant
/// ("no black object references a white object") holds outside of sweep.
///
/// Use this for single-reference writes: `SETUPVAL`, closing over an
/// upvalue, linking a prototype's nested-proto array at `CLOSURE` time.
pub fn forward<H: Heap>(heap: &mut H, collector: &mut Collector, owner: GcObjectId, child: GcObjectId) {
    if !collector.is_marking() {
        return;
    }
    let owner_h = heap.header(owner);
    if !owner_h.color.is_black() {
        return;
    }
    let child_h = heap.header(child);
    if child_h.color.is_dead(collector.current_white()) || !child_h.color.is_white() {
        // Either already not-white (nothing to do) or somehow already
        // dead-white from a prior cycle reaching across a cycle boundary,
        // which callers must never allow; treat defensively as a no-op.
        return;
    }
    collector.mark_gray(heap, child);
}

/// Back barrier: re-color a *container* (table or Lua closure) gray
/// instead of marking each newly-written child individually. Cheaper than
/// the forward barrier for objects that see many writes in a row (a table
/// being built up in a loop, say), at the cost of rescanning the whole
/// container later instead of just the new edge.
///
/// In generational mode, hitting an `Old` object with the back barrier
/// demotes it to `Touched1` so the next minor cycle rescans it (spec
/// §4.5: "an old object hit by a back barrier becomes Touched1").
pub fn back<H: Heap>(heap: &mut H, collector: &mut Collector, owner: GcObjectId) {
    if !collector.is_marking() {
        // Still worth tracking the generational promotion outside of an
        // active cycle so a subsequent minor cycle knows to rescan.
        let mut h = heap.header(owner);
        if h.age.is_old() && !matches!(h.age, crate::color::Age::Touched1 | crate::color::Age::Touched2) {
            h.age = Age::Touched1;
            heap.set_header(owner, h);
            collector.grayagain_push(owner);
        }
        return;
    }
    let mut h = heap.header(owner);
    if h.color.is_black() {
        h.color = crate::color::Color::Gray;
        if h.age.is_old() {
            h.age = Age::Touched1;
        }
        heap.set_header(owner, h);
        collector.grayagain_push(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::config::GcConfig;
    use crate::header::GcHeader;
    use crate::heap::WeakMode;

    /// Minimal in-memory heap for barrier unit tests: a flat vec of
    /// headers plus an adjacency list, enough to exercise the tricolor
    /// invariant without pulling in quill-core.
    struct ToyHeap {
        headers: Vec<GcHeader>,
        edges: Vec<Vec<GcObjectId>>,
    }

    impl ToyHeap {
        fn new(n: usize, white: Color) -> Self {
            Self {
                headers: (0..n).map(|_| GcHeader::new(white, 8)).collect(),
                edges: vec![Vec::new(); n],
            }
        }
    }

    impl Heap for ToyHeap {
        fn header(&self, id: GcObjectId) -> GcHeader {
            self.headers[id.as_u32() as usize]
        }
        fn set_header(&mut self, id: GcObjectId, header: GcHeader) {
            self.headers[id.as_u32() as usize] = header;
        }
        fn trace_children(&self, id: GcObjectId, out: &mut dyn FnMut(GcObjectId)) {
            for &c in &self.edges[id.as_u32() as usize] {
                out(c);
            }
        }
        fn roots(&self, _out: &mut dyn FnMut(GcObjectId)) {}
        fn all_objects(&self) -> Vec<GcObjectId> {
            (0..self.headers.len() as u32).map(GcObjectId::from_u32).collect()
        }
        fn has_finalizer(&self, _id: GcObjectId) -> bool {
            false
        }
        fn run_finalizer(&mut self, _id: GcObjectId) -> Result<(), String> {
            Ok(())
        }
        fn is_resurrected(&self, _id: GcObjectId) -> bool {
            false
        }
        fn free(&mut self, _id: GcObjectId) {}
        fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)> {
            Vec::new()
        }
        fn clear_dead_weak_entries(&mut self, _id: GcObjectId, _white: Color) -> usize {
            0
        }
        fn revive_ephemeron_values(&mut self, _id: GcObjectId, _white: Color, _out: &mut dyn FnMut(GcObjectId)) {}
    }

    #[test]
    fn forward_barrier_grays_white_child_of_black_owner() {
        let mut heap = ToyHeap::new(2, Color::White0);
        let owner = GcObjectId::from_u32(0);
        let child = GcObjectId::from_u32(1);
        let mut collector = Collector::new(GcConfig::default());
        collector.force_marking_for_test();
        let mut h = heap.header(owner);
        h.color = Color::Black;
        heap.set_header(owner, h);

        forward(&mut heap, &mut collector, owner, child);

        assert!(heap.header(child).color.is_gray());
    }

    #[test]
    fn back_barrier_grays_owner_not_child() {
        let mut heap = ToyHeap::new(1, Color::White0);
        let owner = GcObjectId::from_u32(0);
        let mut collector = Collector::new(GcConfig::default());
        collector.force_marking_for_test();
        let mut h = heap.header(owner);
        h.color = Color::Black;
        heap.set_header(owner, h);

        back(&mut heap, &mut collector, owner);

        assert!(heap.header(owner).color.is_gray());
    }
}
