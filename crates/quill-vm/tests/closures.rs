//! Upvalue capture by reference across a closed outer frame.

use quill_core::opcode::Instruction;
use quill_core::proto::{Proto, UpvalDesc};
use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(11))
}

/// `(fn() { local x = 10; return fn() { x += 1; return x } end))()`: the
/// outer function builds and returns the inner closure, then the test
/// calls that closure three times and expects 11, 12, 13.
#[test]
fn repeated_calls_see_the_mutation_made_by_the_previous_call() {
    let mut g = heap();
    let name = g.heap.new_string(b"x").unwrap();
    let thread = g.heap.main_thread;

    let mut inner = Proto::new(0, false, 2);
    inner.upvalues.push(UpvalDesc { in_stack: true, idx: 0, name });
    inner.code = vec![
        Instruction::GetUpval { a: 0, b: 0 },
        Instruction::AddI { a: 0, b: 0, imm: 1 },
        Instruction::SetUpval { a: 0, b: 0 },
        Instruction::Return1 { a: 0 },
    ];
    let inner_id = g.heap.new_proto(inner).unwrap();

    let mut outer = Proto::new(0, false, 2);
    outer.protos.push(inner_id);
    outer.code = vec![Instruction::LoadI { a: 0, sbx: 10 }, Instruction::Closure { a: 1, bx: 0 }, Instruction::Return1 { a: 1 }];
    let outer_id = g.heap.new_proto(outer).unwrap();
    let outer_closure = g.heap.new_lua_closure(outer_id, Vec::new()).unwrap();

    let mut results = quill_vm::call_for_results(&mut g, thread, Value::Object(outer_closure), &[], 1).unwrap();
    let closure = results.pop().expect("outer returned the inner closure");

    for expected in [11, 12, 13] {
        let mut r = quill_vm::call_for_results(&mut g, thread, closure, &[], 1).unwrap();
        let v = r.pop().unwrap();
        assert!(matches!(v, Value::Integer(n) if n == expected), "expected {expected}, got {v:?}");
    }
}
