//! A table with `__mode = "v"` drops values nothing else is holding.

use quill_core::Value;
use quill_embed::{State, VmConfig};

fn state() -> State {
    State::new_state(&VmConfig::default(), Some(29))
}

#[test]
fn an_unreferenced_value_in_a_weak_valued_table_is_collected() {
    let mut s = state();
    let t = s.new_table().unwrap();
    let handle = s.reference(t).unwrap(); // root t itself through the registry

    let mode_key = s.new_string(b"__mode").unwrap();
    let mode_v = s.new_string(b"v").unwrap();
    let mt = s.new_table().unwrap();
    s.raw_set(mt, mode_key, mode_v).unwrap();

    let Value::Object(t_id) = t else { unreachable!() };
    let Value::Object(mt_id) = mt else { unreachable!() };
    s.global_mut().heap.set_table_metatable(t_id, Some(mt_id));

    // The table stored here has no other root.
    let held = s.new_table().unwrap();
    s.raw_set(t, s.integer(1), held).unwrap();
    assert!(!s.raw_get(t, s.integer(1)).unwrap().is_nil());

    s.gc_full_collect();

    let after = s.raw_get(t, s.integer(1)).unwrap();
    assert!(after.is_nil(), "a weak-valued table must drop an otherwise-unreferenced entry after a full collection");

    assert_eq!(s.get_reference(handle), t, "the table itself, rooted in the registry, must survive");
}

#[test]
fn a_value_also_referenced_elsewhere_survives_in_a_weak_valued_table() {
    let mut s = state();
    let t = s.new_table().unwrap();
    s.reference(t).unwrap();

    let mode_key = s.new_string(b"__mode").unwrap();
    let mode_v = s.new_string(b"v").unwrap();
    let mt = s.new_table().unwrap();
    s.raw_set(mt, mode_key, mode_v).unwrap();

    let Value::Object(t_id) = t else { unreachable!() };
    let Value::Object(mt_id) = mt else { unreachable!() };
    s.global_mut().heap.set_table_metatable(t_id, Some(mt_id));

    let held = s.new_table().unwrap();
    let held_handle = s.reference(held).unwrap(); // rooted elsewhere too
    s.raw_set(t, s.integer(1), held).unwrap();

    s.gc_full_collect();

    let after = s.raw_get(t, s.integer(1)).unwrap();
    assert!(!after.is_nil(), "an entry with another root must survive even in a weak-valued table");
    assert_eq!(s.get_reference(held_handle), held);
}
