//! The collector state machine (spec §4.5 "GC cycle (incremental)").
//!
//! `Collector` owns nothing about objects themselves — only the gray
//! lists, the current-white flag, debt accounting, and the phase pointer
//! — and drives a [`Heap`] implementation through one cycle:
//! Pause -> Propagate -> EnterAtomic -> Atomic -> Sweep -> CallFinalizers
//! -> Pause.

use tracing::{debug, trace, warn};

use crate::allocator::AllocFacade;
use crate::color::Color;
use crate::config::{GcConfig, GcMode};
use crate::gray::GrayLists;
use crate::header::GcHeader;
use crate::heap::{Heap, WeakMode};
use crate::stats::GcStats;
use crate::{GcObjectId, GcPhase};

pub struct Collector {
    pub config: GcConfig,
    pub alloc: AllocFacade,
    phase: GcPhase,
    current_white: Color,
    gray: GrayLists,
    tobefnz: Vec<GcObjectId>,
    sweep_snapshot: Vec<GcObjectId>,
    sweep_cursor: usize,
    finalize_cursor: usize,
    /// Estimated live bytes at the end of the last completed cycle; the
    /// basis for the next cycle's debt threshold (`pause_percent`).
    estimate_live_bytes: u64,
    pub stats: GcStats,
    /// `true` for the one cycle an emergency collection runs: disables
    /// finalizer execution so the embedder's panic-free allocation-failure
    /// path never re-enters user code (spec §4.5 "Emergency GC").
    emergency_no_finalize: bool,
}

/// Work budget for one `step` call in each phase, derived from
/// `config.step_size_bytes` but expressed as an object count here since
/// this engine doesn't track per-object byte costs as precisely as a
/// bump-pointer heap would. A handful of objects per step keeps pauses
/// small without making the cycle take forever on a busy mutator.
const MIN_STEP_OBJECTS: usize = 8;

impl Collector {
    pub fn new(config: GcConfig) -> Self {
        let config = config.sanitize();
        Self {
            config,
            alloc: AllocFacade::default(),
            phase: GcPhase::Pause,
            current_white: Color::White0,
            gray: GrayLists::default(),
            tobefnz: Vec::new(),
            sweep_snapshot: Vec::new(),
            sweep_cursor: 0,
            finalize_cursor: 0,
            estimate_live_bytes: 0,
            stats: GcStats::default(),
            emergency_no_finalize: false,
        }
    }

    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    pub fn current_white(&self) -> Color {
        self.current_white
    }

    pub fn mode(&self) -> GcMode {
        self.config.mode
    }

    /// True while the collector is actively marking (Propagate or
    /// EnterAtomic/Atomic), i.e. while write barriers must do real work.
    pub fn is_marking(&self) -> bool {
        matches!(self.phase, GcPhase::Propagate | GcPhase::EnterAtomic | GcPhase::Atomic)
    }

    fn step_budget(&self) -> usize {
        (self.config.step_size_bytes / 64).max(MIN_STEP_OBJECTS)
    }

    fn threshold(&self) -> i64 {
        ((self.estimate_live_bytes as u64 * self.config.pause_percent as u64) / 100) as i64
    }

    /// Color `id` gray and enqueue it, unless it's already past white.
    pub fn mark_gray<H: Heap>(&mut self, heap: &mut H, id: GcObjectId) {
        let mut h = heap.header(id);
        if !h.color.is_white() {
            return;
        }
        h.color = Color::Gray;
        heap.set_header(id, h);
        self.gray.gray.push(id);
        self.stats.objects_marked += 1;
    }

    /// Used by the back barrier once it has already recolored `owner`
    /// gray in the header; just enqueues.
    pub fn grayagain_push(&mut self, id: GcObjectId) {
        self.gray.grayagain.push(id);
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn force_marking_for_test(&mut self) {
        self.phase = GcPhase::Propagate;
    }

    /// Called by the VM's allocation fast path right after
    /// `self.alloc.account_alloc(size)` has already recorded the bytes.
    /// Reports whether debt has crossed this cycle's threshold, so the
    /// caller knows to invoke [`Collector::step`].
    pub fn notify_alloc(&mut self, _size: usize) -> bool {
        self.phase == GcPhase::Pause && self.alloc.debt() > self.threshold().max(1)
    }

    /// Run one bounded quantum of collector work. Safe to call on every
    /// allocation (via [`Collector::notify_alloc`]) or on a timer; cheap
    /// to call when there is nothing to do (`Pause` with debt under
    /// threshold just returns immediately).
    pub fn step<H: Heap>(&mut self, heap: &mut H) -> GcPhase {
        match self.phase {
            GcPhase::Pause => {
                if self.alloc.debt() > self.threshold() {
                    self.start_cycle(heap);
                }
            }
            GcPhase::Propagate => self.propagate_step(heap),
            GcPhase::EnterAtomic => {
                self.phase = GcPhase::Atomic;
            }
            GcPhase::Atomic => self.atomic_phase(heap),
            GcPhase::Sweep => self.sweep_step(heap),
            GcPhase::CallFinalizers => self.call_finalizers_step(heap),
        }
        self.phase
    }

    /// Run whole cycles until the collector returns to `Pause`,
    /// regardless of debt. Used by the embedder's explicit "full
    /// collection" control and by [`Collector::emergency_collect`].
    pub fn full_collect<H: Heap>(&mut self, heap: &mut H) {
        if self.phase == GcPhase::Pause {
            self.start_cycle(heap);
        }
        while self.phase != GcPhase::Pause {
            self.step(heap);
        }
    }

    /// Allocation failed. Try a full collection with finalizers disabled,
    /// then report whether the caller should retry the allocation.
    pub fn emergency_collect<H: Heap>(&mut self, heap: &mut H) {
        warn!("emergency GC triggered by allocation failure");
        self.emergency_no_finalize = true;
        self.stats.emergency_collections += 1;
        self.full_collect(heap);
        self.emergency_no_finalize = false;
    }

    fn start_cycle<H: Heap>(&mut self, heap: &mut H) {
        debug!(mode = ?self.config.mode, "starting GC cycle");
        self.gray.clear();
        // `roots` borrows `heap` immutably while the callback runs, so
        // collect ids first and mark afterwards rather than trying to
        // call `mark_gray` (which needs `&mut heap`) from inside it.
        let mut root_ids = Vec::new();
        heap.roots(&mut |id| root_ids.push(id));
        for id in root_ids {
            self.mark_gray(heap, id);
        }
        self.phase = GcPhase::Propagate;
    }

    fn propagate_step<H: Heap>(&mut self, heap: &mut H) {
        let budget = self.step_budget();
        for _ in 0..budget {
            let Some(id) = self.gray.gray.pop() else {
                self.phase = GcPhase::EnterAtomic;
                return;
            };
            self.blacken(heap, id);
        }
    }

    /// Trace `id`'s children, graying any white ones, then mark `id`
    /// itself black.
    fn blacken<H: Heap>(&mut self, heap: &mut H, id: GcObjectId) {
        let mut children = Vec::new();
        heap.trace_children(id, &mut |child| children.push(child));
        for child in children {
            self.mark_gray(heap, child);
        }
        let mut h = heap.header(id);
        h.color = Color::Black;
        heap.set_header(id, h);
    }

    fn atomic_phase<H: Heap>(&mut self, heap: &mut H) {
        trace!("entering atomic phase");
        // 1. Remark roots (something may have changed since start_cycle
        //    if allocations interleaved with propagation created new
        //    roots, e.g. a freshly-pushed stack slot).
        let mut root_ids = Vec::new();
        heap.roots(&mut |id| root_ids.push(id));
        for id in root_ids {
            self.mark_gray(heap, id);
        }
        self.drain_gray_to_black(heap);

        // 2. Rescan grayagain (objects blackened earlier but then
        //    written to via the back barrier).
        let grayagain = std::mem::take(&mut self.gray.grayagain);
        for id in grayagain {
            self.blacken(heap, id);
        }
        self.drain_gray_to_black(heap);

        // 3. Flip current white now, before any further liveness check:
        //    every object still colored white at this point was never
        //    reached by marking, so from here on `Color::is_dead` (which
        //    compares against the *new* current_white) is exactly
        //    "unreached by this cycle's marking" — the same check the
        //    sweep phase uses on its own snapshot.
        let dead_white = self.current_white;
        self.current_white = Color::other_white(self.current_white);

        // 4. Resolve weak tables: drop dead entries, then ephemerons by
        //    fixed point (a revived ephemeron value may itself need
        //    tracing, which can in turn revive further ephemerons).
        let weak_objs = heap.weak_objects();
        for (id, mode) in &weak_objs {
            match mode {
                WeakMode::WeakKeys | WeakMode::WeakValues | WeakMode::WeakBoth => {
                    heap.clear_dead_weak_entries(*id, self.current_white);
                }
                WeakMode::Ephemeron => {}
            }
        }
        loop {
            let mut revived_any = false;
            for (id, mode) in &weak_objs {
                if *mode != WeakMode::Ephemeron {
                    continue;
                }
                let mut revived = Vec::new();
                heap.revive_ephemeron_values(*id, self.current_white, &mut |rid| revived.push(rid));
                if !revived.is_empty() {
                    revived_any = true;
                    for rid in revived {
                        self.mark_gray(heap, rid);
                    }
                    self.drain_gray_to_black(heap);
                }
            }
            if !revived_any {
                break;
            }
        }
        for (id, mode) in &weak_objs {
            if *mode == WeakMode::Ephemeron {
                heap.clear_dead_weak_entries(*id, self.current_white);
            }
        }

        // 5. Decide finalizer transitions: anything with a finalizer that
        //    is still the dead white is unreachable and moves to
        //    tobefnz instead of being freed outright (spec §4.5
        //    "Finalization"). `mark_gray`/`blacken` below recolor it (and
        //    anything it references) so the sweep phase leaves it alone.
        for id in heap.all_objects() {
            let h = heap.header(id);
            if h.has_finalizer && !h.awaiting_finalizer && h.color == dead_white {
                let mut h = h;
                h.awaiting_finalizer = true;
                h.color = self.current_white; // re-white it as *live* white so mark_gray below accepts it
                heap.set_header(id, h);
                self.tobefnz.push(id);
                // Finalizer-owning objects trace their own children too,
                // since the finalizer call may touch them.
                self.mark_gray(heap, id);
            }
        }
        self.drain_gray_to_black(heap);

        // 6. Take the sweep snapshot and compute the next cycle's
        //    threshold from what just proved reachable (everything not
        //    colored `dead_white`).
        let mut live_bytes = 0u64;
        for id in heap.all_objects() {
            let h = heap.header(id);
            if h.color != dead_white {
                live_bytes += h.size_bytes as u64;
            }
        }
        self.estimate_live_bytes = live_bytes;
        self.sweep_snapshot = heap.all_objects();
        self.sweep_cursor = 0;
        self.phase = GcPhase::Sweep;
    }

    fn drain_gray_to_black<H: Heap>(&mut self, heap: &mut H) {
        while let Some(id) = self.gray.gray.pop() {
            self.blacken(heap, id);
        }
    }

    fn sweep_step<H: Heap>(&mut self, heap: &mut H) {
        let budget = self.step_budget();
        let end = (self.sweep_cursor + budget).min(self.sweep_snapshot.len());
        for i in self.sweep_cursor..end {
            let id = self.sweep_snapshot[i];
            let h = heap.header(id);
            if h.color.is_dead(self.current_white) {
                self.alloc.account_free(h.size_bytes as usize);
                self.stats.objects_freed += 1;
                self.stats.bytes_freed += h.size_bytes as u64;
                heap.free(id);
            } else {
                let mut h = h;
                h.color = self.current_white;
                if self.config.mode == GcMode::Generational {
                    h.age = h.age.promote();
                }
                heap.set_header(id, h);
            }
        }
        self.sweep_cursor = end;
        if self.sweep_cursor >= self.sweep_snapshot.len() {
            self.sweep_snapshot.clear();
            self.finalize_cursor = 0;
            self.phase = GcPhase::CallFinalizers;
        }
    }

    fn call_finalizers_step<H: Heap>(&mut self, heap: &mut H) {
        if self.emergency_no_finalize {
            // Spec §4.5: "inside [an emergency GC], no finalizers run" —
            // but the memory still has to come back, so free these
            // objects outright rather than leaking them.
            for id in self.tobefnz.drain(..) {
                let h = heap.header(id);
                self.alloc.account_free(h.size_bytes as usize);
                self.stats.objects_freed += 1;
                self.stats.bytes_freed += h.size_bytes as u64;
                heap.free(id);
            }
            self.finish_cycle();
            return;
        }
        let budget = self.step_budget();
        let end = (self.finalize_cursor + budget).min(self.tobefnz.len());
        for i in self.finalize_cursor..end {
            let id = self.tobefnz[i];
            if let Err(err) = heap.run_finalizer(id) {
                warn!(%err, "error in __gc finalizer; continuing (finalizer errors never propagate)");
            }
            self.stats.objects_finalized += 1;
            if !heap.is_resurrected(id) {
                heap.free(id);
            } else {
                let mut h = heap.header(id);
                h.awaiting_finalizer = false;
                h.has_finalizer = false; // one resurrection per object, see DESIGN.md
                heap.set_header(id, h);
            }
        }
        self.finalize_cursor = end;
        if self.finalize_cursor >= self.tobefnz.len() {
            self.tobefnz.clear();
            self.finish_cycle();
        }
    }

    fn finish_cycle(&mut self) {
        self.stats.cycles_completed += 1;
        self.alloc.set_debt(self.alloc.debt() - self.threshold().max(1));
        self.phase = GcPhase::Pause;
        debug!(cycle = self.stats.cycles_completed, live_bytes = self.estimate_live_bytes, "GC cycle complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::WeakMode;

    struct ToyHeap {
        headers: Vec<GcHeader>,
        edges: Vec<Vec<GcObjectId>>,
        roots: Vec<GcObjectId>,
        freed: Vec<GcObjectId>,
    }

    impl ToyHeap {
        fn new(n: usize, white: Color) -> Self {
            Self {
                headers: (0..n).map(|_| GcHeader::new(white, 16)).collect(),
                edges: vec![Vec::new(); n],
                roots: Vec::new(),
                freed: Vec::new(),
            }
        }

        fn link(&mut self, from: u32, to: u32) {
            self.edges[from as usize].push(GcObjectId::from_u32(to));
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
        fn roots(&self, out: &mut dyn FnMut(GcObjectId)) {
            for &r in &self.roots {
                out(r);
            }
        }
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
        fn free(&mut self, id: GcObjectId) {
            self.freed.push(id);
        }
        fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)> {
            Vec::new()
        }
        fn clear_dead_weak_entries(&mut self, _id: GcObjectId, _white: Color) -> usize {
            0
        }
        fn revive_ephemeron_values(&mut self, _id: GcObjectId, _white: Color, _out: &mut dyn FnMut(GcObjectId)) {}
    }

    #[test]
    fn unreachable_object_is_swept() {
        let mut heap = ToyHeap::new(2, Color::White0);
        heap.roots.push(GcObjectId::from_u32(0));
        // object 1 is never linked from 0 or from roots: garbage.
        let mut gc = Collector::new(GcConfig::default());
        gc.full_collect(&mut heap);
        assert!(heap.freed.contains(&GcObjectId::from_u32(1)));
        assert!(!heap.freed.contains(&GcObjectId::from_u32(0)));
    }

    #[test]
    fn reachable_chain_survives() {
        let mut heap = ToyHeap::new(3, Color::White0);
        heap.roots.push(GcObjectId::from_u32(0));
        heap.link(0, 1);
        heap.link(1, 2);
        let mut gc = Collector::new(GcConfig::default());
        gc.full_collect(&mut heap);
        assert!(heap.freed.is_empty());
    }

    #[test]
    fn two_full_cycles_leave_live_objects_marked_current_white() {
        let mut heap = ToyHeap::new(1, Color::White0);
        heap.roots.push(GcObjectId::from_u32(0));
        let mut gc = Collector::new(GcConfig::default());
        gc.full_collect(&mut heap);
        let white_after_first = gc.current_white();
        assert_eq!(heap.header(GcObjectId::from_u32(0)).color, white_after_first);
        gc.full_collect(&mut heap);
        assert_eq!(heap.header(GcObjectId::from_u32(0)).color, gc.current_white());
    }
}
