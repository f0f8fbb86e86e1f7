//! Tracing correctness: reachability, cycles, and the tricolor invariant
//! across a full incremental cycle.

mod common;

use common::TestHeap;
use quill_gc::{Collector, GcConfig, GcObjectId};

fn id(n: u32) -> GcObjectId {
    GcObjectId::from_u32(n)
}

#[test]
fn unreachable_object_is_collected() {
    let mut heap = TestHeap::with_objects(2, quill_gc::Color::White0);
    heap.add_root(id(0));
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);

    assert!(heap.was_freed(id(1)), "object with no path from any root must be swept");
    assert!(!heap.was_freed(id(0)), "rooted object must survive");
}

#[test]
fn reachable_through_chain_survives() {
    let mut heap = TestHeap::with_objects(4, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    heap.link(id(1), id(2));
    // id(3) unreachable.
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);

    assert!(!heap.was_freed(id(0)));
    assert!(!heap.was_freed(id(1)));
    assert!(!heap.was_freed(id(2)));
    assert!(heap.was_freed(id(3)));
}

#[test]
fn reference_cycle_with_no_root_is_collected() {
    let mut heap = TestHeap::with_objects(2, quill_gc::Color::White0);
    heap.link(id(0), id(1));
    heap.link(id(1), id(0));
    // Neither is rooted: the cycle itself must not keep them alive, unlike
    // naive refcounting.
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);

    assert!(heap.was_freed(id(0)));
    assert!(heap.was_freed(id(1)));
}

#[test]
fn reference_cycle_reachable_from_root_survives() {
    let mut heap = TestHeap::with_objects(3, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    heap.link(id(1), id(2));
    heap.link(id(2), id(1)); // cycle between 1 and 2
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);

    assert!(!heap.was_freed(id(1)));
    assert!(!heap.was_freed(id(2)));
}

#[test]
fn repeated_cycles_keep_collecting_newly_unreachable_garbage() {
    let mut heap = TestHeap::with_objects(3, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);
    assert!(!heap.was_freed(id(1)));
    assert!(heap.was_freed(id(2)));

    // Simulate the mutator dropping its reference to id(1) between cycles:
    // a fresh TestHeap models "same graph, minus the edge" since this test
    // heap has no mutation API for edges. What matters is that a second
    // full cycle from a clean rooted graph doesn't re-report stale frees.
    let mut heap2 = TestHeap::with_objects(2, gc.current_white());
    heap2.add_root(id(0));
    gc.full_collect(&mut heap2);
    assert!(heap2.was_freed(id(1)));
}

#[test]
fn weak_table_drops_dead_keys_but_keeps_live_ones() {
    use quill_gc::heap::WeakMode;

    let mut heap = TestHeap::with_objects(4, quill_gc::Color::White0);
    // id(0) root, id(1) the weak container, id(2) a live key (rooted
    // separately through id(0)), id(3) a dead key (never rooted).
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    heap.link(id(0), id(2));
    heap.make_weak(id(1), WeakMode::WeakKeys);
    heap.weak_insert(id(1), id(2), id(2));
    heap.weak_insert(id(1), id(3), id(3));

    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);

    assert_eq!(heap.weak_len(id(1)), 1, "dead-keyed entry should have been cleared");
    assert!(!heap.was_freed(id(2)));
    assert!(heap.was_freed(id(3)));
}

#[test]
fn ephemeron_value_survives_only_if_key_survives() {
    use quill_gc::heap::WeakMode;

    let mut heap = TestHeap::with_objects(4, quill_gc::Color::White0);
    // id(0) root -> id(1) ephemeron table -> weakly keyed by id(2)
    // (rooted) with value id(3) (reachable only through the ephemeron).
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    heap.link(id(0), id(2));
    heap.make_weak(id(1), WeakMode::Ephemeron);
    heap.weak_insert(id(1), id(2), id(3));

    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);

    assert!(!heap.was_freed(id(3)), "ephemeron value must survive while its key is reachable");
}
