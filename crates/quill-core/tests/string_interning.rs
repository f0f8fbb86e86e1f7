//! Component B: short strings dedup by identity, long strings don't.

use quill_core::GlobalState;
use quill_gc::GcConfig;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(1))
}

#[test]
fn identical_short_strings_share_one_object() {
    let mut g = heap();
    let a = g.heap.new_string(b"hello").unwrap();
    let b = g.heap.new_string(b"hello").unwrap();
    assert_eq!(a, b, "two interns of the same short string must return the same object");
}

#[test]
fn distinct_short_strings_are_distinct_objects() {
    let mut g = heap();
    let a = g.heap.new_string(b"hello").unwrap();
    let b = g.heap.new_string(b"world").unwrap();
    assert_ne!(a, b);
}

#[test]
fn long_strings_are_not_deduplicated() {
    let mut g = heap();
    let long = vec![b'x'; 64]; // past the 40-byte short-string cap
    let a = g.heap.new_string(&long).unwrap();
    let b = g.heap.new_string(&long).unwrap();
    assert_ne!(a, b, "long strings are separate heap objects even with identical bytes");
    assert!(g.heap.string_eq(a, b), "but they compare equal by content");
}

#[test]
fn string_eq_is_false_across_differing_content() {
    let mut g = heap();
    let a = g.heap.new_string(b"abc").unwrap();
    let b = g.heap.new_string(b"abcd").unwrap();
    assert!(!g.heap.string_eq(a, b));
}
