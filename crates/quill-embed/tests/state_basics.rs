//! Construction, raw table access, and reference round trips through the
//! embedding facade.

use quill_embed::{State, VmConfig};

fn state() -> State {
    State::new_state(&VmConfig::default(), Some(23))
}

#[test]
fn new_state_starts_with_a_usable_main_thread() {
    let s = state();
    // A freshly constructed main thread has no pending call frames.
    let th = s.main_thread();
    assert_eq!(s.global().heap.thread(th).call_infos.len(), 0);
}

#[test]
fn raw_set_then_raw_get_round_trips_through_the_facade() {
    let mut s = state();
    let t = s.new_table().unwrap();
    let key = s.new_string(b"answer").unwrap();

    s.raw_set(t, key, s.integer(42)).unwrap();
    let got = s.raw_get(t, key).unwrap();

    assert_eq!(s.as_integer(got), Some(42));
}

#[test]
fn raw_get_on_a_missing_key_is_nil_not_an_error() {
    let mut s = state();
    let t = s.new_table().unwrap();
    let key = s.new_string(b"missing").unwrap();

    let got = s.raw_get(t, key).unwrap();
    assert!(got.is_nil());
}

#[test]
fn a_reference_round_trips_to_the_same_value_until_unreferenced() {
    let mut s = state();
    let t = s.new_table().unwrap();

    let handle = s.reference(t).unwrap();
    assert_eq!(s.get_reference(handle), t);

    s.unreference(handle).unwrap();
    assert!(s.get_reference(handle).is_nil());
}

#[test]
fn raw_set_on_a_non_table_value_is_a_type_error() {
    let mut s = state();
    let err = s.raw_set(s.integer(1), s.integer(1), s.nil());
    assert!(err.is_err());
}

#[test]
fn gc_step_and_full_collect_do_not_panic_on_an_empty_heap() {
    let mut s = state();
    let _ = s.gc_step();
    s.gc_full_collect();
}
