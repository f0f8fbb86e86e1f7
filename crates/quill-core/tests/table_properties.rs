//! The array/hash table: integer/float key equality,
//! raw round-trip, and the length border.

use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(7))
}

#[test]
fn integer_and_float_keys_with_the_same_value_collide() {
    let mut g = heap();
    let t = g.heap.new_table().unwrap();
    let s = g.heap.new_string(b"a").unwrap();
    g.heap.raw_set_in(t, Value::Integer(1), Value::Object(s)).unwrap();

    let via_float = g.heap.table(t).raw_get(&g.heap, &Value::Float(1.0));
    match via_float {
        Value::Object(id) => assert!(g.heap.string_eq(id, s)),
        other => panic!("expected the string stored under key 1, got {other:?}"),
    }
}

#[test]
fn non_integral_float_key_is_independent() {
    let mut g = heap();
    let t = g.heap.new_table().unwrap();
    let b = g.heap.new_string(b"b").unwrap();
    g.heap.raw_set_in(t, Value::Float(1.5), Value::Object(b)).unwrap();

    let missing = g.heap.table(t).raw_get(&g.heap, &Value::Integer(1));
    assert!(missing.is_nil());
    let hit = g.heap.table(t).raw_get(&g.heap, &Value::Float(1.5));
    assert!(matches!(hit, Value::Object(id) if g.heap.string_eq(id, b)));
}

#[test]
fn rawget_then_rawset_of_the_same_value_is_a_noop() {
    let mut g = heap();
    let t = g.heap.new_table().unwrap();
    g.heap.raw_set_in(t, Value::Integer(5), Value::Integer(99)).unwrap();
    let before = g.heap.table(t).raw_get(&g.heap, &Value::Integer(5));
    g.heap.raw_set_in(t, Value::Integer(5), before).unwrap();
    let after = g.heap.table(t).raw_get(&g.heap, &Value::Integer(5));
    assert!(matches!((before, after), (Value::Integer(x), Value::Integer(y)) if x == y));
}

#[test]
fn array_part_holds_a_dense_integer_run() {
    let mut g = heap();
    let t = g.heap.new_table().unwrap();
    for i in 1..=8 {
        g.heap.raw_set_in(t, Value::Integer(i), Value::Integer(i * 10)).unwrap();
    }
    assert_eq!(g.heap.table(t).length(&g.heap), 8);
    for i in 1..=8 {
        assert!(matches!(g.heap.table(t).raw_get(&g.heap, &Value::Integer(i)), Value::Integer(v) if v == i * 10));
    }
}

#[test]
fn next_key_visits_every_live_entry_exactly_once() {
    let mut g = heap();
    let t = g.heap.new_table().unwrap();
    g.heap.raw_set_in(t, Value::Integer(1), Value::Integer(10)).unwrap();
    g.heap.raw_set_in(t, Value::Integer(2), Value::Integer(20)).unwrap();
    let k1 = g.heap.new_string(b"k1").unwrap();
    g.heap.raw_set_in(t, Value::Object(k1), Value::Integer(30)).unwrap();

    let mut seen = Vec::new();
    let mut key = Value::NIL;
    loop {
        match g.heap.table(t).next_key(&g.heap, &key).unwrap() {
            Some((k, v)) => {
                seen.push(v.as_f64().map(|f| f as i64));
                key = k;
            }
            None => break,
        }
    }
    assert_eq!(seen.len(), 3);
    assert!(seen.contains(&Some(10)));
    assert!(seen.contains(&Some(20)));
    assert!(seen.contains(&Some(30)));
}
