//! Boundary behavior: empty heaps, self-referential objects,
//! finalizer resurrection, and emergency collection.

mod common;

use common::TestHeap;
use quill_gc::{Collector, GcConfig, GcObjectId};

fn id(n: u32) -> GcObjectId {
    GcObjectId::from_u32(n)
}

#[test]
fn collecting_an_empty_heap_does_nothing() {
    let mut heap = TestHeap::with_objects(0, quill_gc::Color::White0);
    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);
    assert_eq!(gc.phase(), quill_gc::GcPhase::Pause);
    assert_eq!(gc.stats.cycles_completed, 1);
}

#[test]
fn self_referential_root_is_not_collected() {
    let mut heap = TestHeap::with_objects(1, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.link(id(0), id(0));
    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);
    assert!(!heap.was_freed(id(0)));
}

#[test]
fn finalizer_runs_exactly_once_for_unreachable_object() {
    let mut heap = TestHeap::with_objects(1, quill_gc::Color::White0);
    heap.set_finalizer(id(0), true);
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);
    assert!(heap.was_finalized(id(0)));
    assert!(heap.was_freed(id(0)), "a finalized, non-resurrected object must still be freed");
    assert_eq!(gc.stats.objects_finalized, 1);
}

#[test]
fn resurrecting_finalizer_keeps_object_alive_through_its_own_cycle() {
    let mut heap = TestHeap::with_objects(2, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.set_finalizer(id(1), true);
    heap.resurrect_on_finalize(id(1));
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);

    assert!(heap.was_finalized(id(1)));
    assert!(!heap.was_freed(id(1)), "a resurrected finalizer target must not be freed this cycle");
}

#[test]
fn finalizer_only_ever_runs_once_even_across_a_second_cycle() {
    // quill-core clears `has_finalizer` after resurrection (see
    // collector.rs's `call_finalizers_step`): a second unreachability
    // must sweep the object outright rather than calling `__gc` again.
    let mut heap = TestHeap::with_objects(1, quill_gc::Color::White0);
    heap.set_finalizer(id(0), true);
    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);
    assert_eq!(gc.stats.objects_finalized, 1);

    // A second, independent heap/cycle with the same id must not somehow
    // "remember" and refinalize — there is nothing left to finalize since
    // object 0 was freed in the prior heap.
    let mut heap2 = TestHeap::with_objects(0, gc.current_white());
    gc.full_collect(&mut heap2);
    assert_eq!(gc.stats.objects_finalized, 1, "no object means no new finalizer calls");
}

#[test]
fn emergency_collect_disables_finalizers_for_that_cycle() {
    let mut heap = TestHeap::with_objects(1, quill_gc::Color::White0);
    heap.set_finalizer(id(0), true);
    let mut gc = Collector::new(GcConfig::default());

    gc.emergency_collect(&mut heap);

    assert!(!heap.was_finalized(id(0)), "emergency collection must not run user __gc code");
    assert!(heap.was_freed(id(0)));
    assert_eq!(gc.stats.emergency_collections, 1);
}
