//! Protected calls catch errors without unwinding past the call boundary.

use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;
use quill_vm::error::{VmError, VmStatus};
use quill_vm::{tbc, unwind};

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(19))
}

#[test]
fn protected_call_turns_a_runtime_type_error_into_a_returned_value() {
    let mut g = heap();
    let thread = g.heap.main_thread;

    // Calling a nil value is a runtime type error, not a panic.
    let (status, results) = quill_vm::interp::protected_call(&mut g, thread, Value::NIL, &[], None, 1);

    assert_eq!(status, VmStatus::ErrRun);
    assert_eq!(results.len(), 1);
    assert!(!results[0].is_nil(), "the error value pcall reports must not be nil");
}

#[test]
fn unwind_to_reports_back_the_exact_table_that_was_raised() {
    let mut g = heap();
    let thread = g.heap.main_thread;
    let raised = g.heap.new_table().unwrap();

    let mark = unwind::mark_protected(&g, thread);
    let err = unwind::unwind_to(&mut g, thread, mark, Value::Object(raised), |_, _, _, _| Ok(()));

    match err {
        Value::Object(id) => assert_eq!(id, raised, "unwind_to must hand back the same object that was raised"),
        other => panic!("expected the raised table back unchanged, got {other:?}"),
    }
}

#[test]
fn a_failing_close_handler_replaces_the_original_error() {
    let mut g = heap();
    let thread = g.heap.main_thread;
    let original = g.heap.new_string(b"first error").unwrap();
    let replacement = g.heap.new_string(b"error from close handler").unwrap();

    // A to-be-closed value with a __close metamethod, so close_from's
    // callback actually runs instead of finding nothing to close.
    let close_key = g.heap.new_string(b"__close").unwrap();
    let noop_close = g.heap.new_table().unwrap();
    let mt = g.heap.new_table().unwrap();
    g.heap.raw_set_in(mt, Value::Object(close_key), Value::Object(noop_close)).unwrap();
    let closeable = g.heap.new_table().unwrap();
    g.heap.set_table_metatable(closeable, Some(mt));

    let mark = unwind::mark_protected(&g, thread);
    let base = g.heap.thread(thread).stack.len();
    g.heap.thread_mut(thread).push_value(Value::Object(closeable));
    tbc::mark_tbc(&mut g, thread, base, Value::Object(closeable)).unwrap();

    let err = unwind::unwind_to(&mut g, thread, mark, Value::Object(original), |_, _, _, _| {
        Err(VmError::Raised(Value::Object(replacement)))
    });

    match err {
        Value::Object(id) => assert_eq!(id, replacement, "a close handler's own error must win over the original"),
        other => panic!("expected the replacement error back, got {other:?}"),
    }
}
