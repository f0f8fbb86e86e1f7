//! Tail-recursive calls must not grow the call-info chain.

use quill_core::opcode::Instruction;
use quill_core::proto::{Proto, UpvalDesc};
use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(19))
}

/// `local function count(n, acc) if n == 0 then return acc end return
/// count(n - 1, acc + 1) end`, closing over itself through an upvalue the
/// way a local recursive function does.
fn make_counter(g: &mut GlobalState) -> Value {
    let mut proto = Proto::new(2, false, 6);
    proto.upvalues.push(UpvalDesc { in_stack: false, idx: 0, name: g.heap.new_string(b"count").unwrap() });
    proto.code = vec![
        Instruction::EqI { a: 0, imm: 0, k: true },
        Instruction::Jmp { sj: 4 },
        Instruction::GetUpval { a: 2, b: 0 },
        Instruction::AddI { a: 3, b: 0, imm: -1 },
        Instruction::AddI { a: 4, b: 1, imm: 1 },
        Instruction::TailCall { a: 2, b: 3, c: 0, k: false },
        Instruction::Return1 { a: 1 },
    ];
    let proto_id = g.heap.new_proto(proto).unwrap();

    let uv = g.heap.new_open_upvalue(g.heap.main_thread, 0).unwrap();
    let closure_id = g.heap.new_lua_closure(proto_id, vec![uv]).unwrap();
    g.heap.close_upvalue(uv, Value::Object(closure_id));
    Value::Object(closure_id)
}

#[test]
fn deep_tail_recursion_runs_without_growing_the_call_chain() {
    let mut g = heap();
    let thread = g.heap.main_thread;
    let count = make_counter(&mut g);

    let depth_before = g.heap.thread(thread).call_infos.len();
    let mut r = quill_vm::call_for_results(&mut g, thread, count, &[Value::Integer(500_000), Value::Integer(0)], 1).unwrap();
    let depth_after = g.heap.thread(thread).call_infos.len();

    assert_eq!(depth_before, depth_after, "tail calls must not leave extra frames on the call-info chain");
    let v = r.pop().unwrap();
    assert!(matches!(v, Value::Integer(500_000)), "500,000 tail-recursive steps must land on 500000, got {v:?}");
}
