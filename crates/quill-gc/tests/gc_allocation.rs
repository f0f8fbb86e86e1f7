//! Allocator-facade accounting (spec §4.4): debt bookkeeping, the
//! embedder memory-ceiling hook, and the threshold that triggers a
//! collection.

mod common;

use common::TestHeap;
use quill_gc::{AllocFacade, Collector, GcConfig, GcObjectId};

#[test]
fn growth_and_shrink_round_trip_to_zero_debt() {
    let mut alloc = AllocFacade::default();
    alloc.account_alloc(256).unwrap();
    assert_eq!(alloc.total_bytes(), 256);
    alloc.account_free(256);
    assert_eq!(alloc.total_bytes(), 0);
    assert_eq!(alloc.debt(), 0);
}

#[test]
fn embedder_hook_can_impose_a_hard_ceiling() {
    let mut seen = 0usize;
    let mut alloc = AllocFacade::new(Some(Box::new(move |_old, new| {
        seen = new;
        seen <= 1024
    })));
    assert!(alloc.account_alloc(512).is_ok());
    assert!(alloc.account_alloc(600).is_err(), "growth past the ceiling must fail");
}

#[test]
fn collector_stays_paused_below_threshold_and_runs_above_it() {
    let mut heap = TestHeap::with_objects(1, quill_gc::Color::White0);
    heap.add_root(GcObjectId::from_u32(0));
    let mut gc = Collector::new(GcConfig { pause_percent: 100, ..GcConfig::default() });

    assert_eq!(gc.phase(), quill_gc::GcPhase::Pause);
    // With no live-bytes estimate yet, threshold() is 0, so the very
    // first allocation's debt (> 0) should request a step.
    gc.alloc.account_alloc(64).unwrap();
    assert!(gc.notify_alloc(64));
    gc.step(&mut heap);
    assert_ne!(gc.phase(), quill_gc::GcPhase::Pause, "a step should have moved the cycle forward");
}

#[test]
fn full_collect_resets_debt_relative_to_the_new_live_set() {
    let mut heap = TestHeap::with_objects(2, quill_gc::Color::White0);
    heap.add_root(GcObjectId::from_u32(0));
    heap.link(GcObjectId::from_u32(0), GcObjectId::from_u32(1));
    let mut gc = Collector::new(GcConfig::default());
    gc.alloc.account_alloc(4096).unwrap();

    gc.full_collect(&mut heap);

    assert_eq!(gc.phase(), quill_gc::GcPhase::Pause);
    assert_eq!(gc.stats.cycles_completed, 1);
}
