//! Quickcheck-driven law tests for the small pieces of pure logic in
//! this crate that are cheap to state as properties rather than
//! examples.

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use quill_gc::{AllocFacade, Color, GcConfig};

#[quickcheck]
fn other_white_is_its_own_inverse(start_white: bool) -> bool {
    let start = if start_white { Color::White0 } else { Color::White1 };
    Color::other_white(Color::other_white(start)) == start
}

#[quickcheck]
fn sanitize_is_idempotent(pause_percent: u32, step_size_bytes: usize) -> bool {
    let cfg = GcConfig { pause_percent, step_size_bytes, ..GcConfig::default() };
    let once = cfg.clone().sanitize();
    let twice = once.clone().sanitize();
    once == twice
}

#[quickcheck]
fn sanitize_never_produces_a_zero_pause_percent(pause_percent: u32) -> bool {
    let cfg = GcConfig { pause_percent, ..GcConfig::default() }.sanitize();
    cfg.pause_percent >= 1
}

#[quickcheck]
fn allocator_debt_round_trips_through_alloc_then_free(size: usize) -> TestResult {
    if size > 1 << 40 {
        return TestResult::discard();
    }
    let mut alloc = AllocFacade::default();
    alloc.account_alloc(size).unwrap();
    alloc.account_free(size);
    TestResult::from_bool(alloc.total_bytes() == 0 && alloc.debt() == 0)
}
