//! Coroutine resume/yield round trip.

use quill_core::opcode::Instruction;
use quill_core::proto::Proto;
use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;
use quill_vm::error::VmStatus;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(17))
}

/// `fn(x) { local y = coroutine.yield(x + 1); return y * 2 }`
fn make_body(g: &mut GlobalState) -> Value {
    let mut proto = Proto::new(1, false, 4);
    proto.constants.push(Value::LightCFunction(quill_vm::interp::yield_marker));
    proto.code = vec![
        Instruction::LoadK { a: 1, bx: 0 },                        // r1 = yield marker
        Instruction::AddI { a: 2, b: 0, imm: 1 },                  // r2 = x + 1
        Instruction::Call { a: 1, b: 2, c: 2 },                    // r1 = yield(r2)
        Instruction::ArithImm { op: quill_core::opcode::ArithOp::Mul, a: 3, b: 1, imm: 2 }, // r3 = y * 2
        Instruction::Return1 { a: 3 },
    ];
    let proto_id = g.heap.new_proto(proto).unwrap();
    let closure = g.heap.new_lua_closure(proto_id, Vec::new()).unwrap();
    Value::Object(closure)
}

#[test]
fn resume_yield_resume_returns_the_values_each_side_produced() {
    let mut g = heap();
    let body = make_body(&mut g);
    let co = quill_vm::coroutine::create(&mut g, body).unwrap();

    let (status1, v1) = quill_vm::coroutine::resume(&mut g, co, &[Value::Integer(10)]);
    assert_eq!(status1, VmStatus::Yield);
    assert!(matches!(v1.as_slice(), [Value::Integer(11)]), "x+1 with x=10 must yield 11, got {v1:?}");

    let (status2, v2) = quill_vm::coroutine::resume(&mut g, co, &[Value::Integer(5)]);
    assert_eq!(status2, VmStatus::Ok);
    assert!(matches!(v2.as_slice(), [Value::Integer(10)]), "y*2 with y=5 must return 10, got {v2:?}");

    // A further resume on a finished coroutine is the dead-coroutine error.
    let (status3, _) = quill_vm::coroutine::resume(&mut g, co, &[]);
    assert_eq!(status3, VmStatus::ErrRun);
}
