//! Larger synthetic heaps: linked lists, binary trees, and many
//! independent garbage chains, run through several back-to-back cycles.

mod common;

use common::TestHeap;
use quill_gc::{Collector, GcConfig, GcObjectId};

fn id(n: u32) -> GcObjectId {
    GcObjectId::from_u32(n)
}

#[test]
fn long_linked_list_survives_a_cycle_and_its_tail_garbage_is_swept() {
    const LIVE_LEN: u32 = 500;
    const GARBAGE_LEN: u32 = 500;
    let total = LIVE_LEN + GARBAGE_LEN;
    let mut heap = TestHeap::with_objects(total as usize, quill_gc::Color::White0);
    heap.add_root(id(0));
    for i in 0..LIVE_LEN - 1 {
        heap.link(id(i), id(i + 1));
    }
    // The garbage half forms its own chain, rooted nowhere.
    for i in LIVE_LEN..total - 1 {
        heap.link(id(i), id(i + 1));
    }

    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);

    for i in 0..LIVE_LEN {
        assert!(!heap.was_freed(id(i)), "live chain element {i} was incorrectly swept");
    }
    for i in LIVE_LEN..total {
        assert!(heap.was_freed(id(i)), "garbage chain element {i} was not swept");
    }
}

#[test]
fn binary_tree_of_depth_ten_is_fully_retained() {
    // 2^11 - 1 nodes, rooted at 0, each node i has children 2i+1, 2i+2.
    let n: u32 = 2047;
    let mut heap = TestHeap::with_objects(n as usize, quill_gc::Color::White0);
    heap.add_root(id(0));
    for i in 0..n {
        let left = 2 * i + 1;
        let right = 2 * i + 2;
        if left < n {
            heap.link(id(i), id(left));
        }
        if right < n {
            heap.link(id(i), id(right));
        }
    }

    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);

    for i in 0..n {
        assert!(!heap.was_freed(id(i)), "tree node {i} incorrectly swept");
    }
}

#[test]
fn many_independent_garbage_islands_are_all_reclaimed() {
    let islands = 200u32;
    let size_per_island = 3u32;
    let total = islands * size_per_island;
    let mut heap = TestHeap::with_objects(total as usize, quill_gc::Color::White0);
    // No roots at all: everything is garbage, including islands that
    // reference each other in cycles.
    for isle in 0..islands {
        let base = isle * size_per_island;
        heap.link(id(base), id(base + 1));
        heap.link(id(base + 1), id(base + 2));
        heap.link(id(base + 2), id(base)); // cycle back to base
    }

    let mut gc = Collector::new(GcConfig::default());
    gc.full_collect(&mut heap);

    for i in 0..total {
        assert!(heap.was_freed(id(i)), "unrooted island member {i} survived collection");
    }
}

#[test]
fn incremental_stepping_reaches_the_same_result_as_a_full_collect() {
    let n = 300u32;
    let mut heap = TestHeap::with_objects(n as usize, quill_gc::Color::White0);
    heap.add_root(id(0));
    for i in 0..n / 2 {
        heap.link(id(0), id(i));
    }

    let mut gc = Collector::new(GcConfig { step_size_bytes: 64, ..GcConfig::default() });
    // Drive the whole cycle one small step at a time instead of via
    // `full_collect`, to exercise the incremental budget path.
    gc.alloc.account_alloc(n as usize * 32).unwrap();
    while gc.notify_alloc(0) || gc.phase() != quill_gc::GcPhase::Pause {
        gc.step(&mut heap);
        if gc.phase() == quill_gc::GcPhase::Pause {
            break;
        }
    }

    for i in 0..n / 2 {
        assert!(!heap.was_freed(id(i)), "reachable node {i} swept during incremental stepping");
    }
    for i in n / 2..n {
        assert!(heap.was_freed(id(i)), "garbage node {i} survived incremental stepping");
    }
}

#[test]
fn repeated_full_collections_are_idempotent_on_a_stable_live_set() {
    let mut heap = TestHeap::with_objects(5, quill_gc::Color::White0);
    heap.add_root(id(0));
    heap.link(id(0), id(1));
    heap.link(id(1), id(2));
    let mut gc = Collector::new(GcConfig::default());

    gc.full_collect(&mut heap);
    let freed_after_first = heap.was_freed(id(3));
    gc.full_collect(&mut heap);
    gc.full_collect(&mut heap);

    assert!(freed_after_first);
    assert!(!heap.was_freed(id(0)));
    assert!(!heap.was_freed(id(1)));
    assert!(!heap.was_freed(id(2)));
    assert_eq!(gc.stats.cycles_completed, 3);
}
