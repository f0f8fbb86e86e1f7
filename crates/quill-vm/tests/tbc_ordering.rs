//! To-be-closed variables close in reverse declaration order.

use quill_core::opcode::Instruction;
use quill_core::proto::Proto;
use quill_core::{GlobalState, Value};
use quill_gc::GcConfig;
use quill_vm::tbc;

fn heap() -> GlobalState {
    GlobalState::new(GcConfig::default(), Some(13))
}

/// Builds a closure that appends `marker` to its single upvalue (a log
/// table) and returns nothing: `log[#log+1] = marker`.
fn make_close_fn(g: &mut GlobalState, log: quill_gc::GcObjectId, marker: &[u8]) -> Value {
    let marker_id = g.heap.new_string(marker).unwrap();
    let uv = g.heap.new_open_upvalue(g.heap.main_thread, 0).unwrap();
    g.heap.close_upvalue(uv, Value::Object(log));

    let mut proto = Proto::new(0, false, 3);
    proto.constants.push(Value::Object(marker_id));
    proto.code = vec![
        Instruction::GetUpval { a: 0, b: 0 },     // r0 = log
        Instruction::Len { a: 1, b: 0 },          // r1 = #log
        Instruction::AddI { a: 1, b: 1, imm: 1 }, // r1 = r1 + 1
        Instruction::LoadK { a: 2, bx: 0 },        // r2 = marker
        Instruction::SetTable { a: 0, b: 1, c: 2, k_c: false }, // log[r1] = r2
        Instruction::Return0,
    ];
    let proto_id = g.heap.new_proto(proto).unwrap();
    let closure = g.heap.new_lua_closure(proto_id, vec![uv]).unwrap();
    Value::Object(closure)
}

#[test]
fn close_handlers_run_in_reverse_declaration_order() {
    let mut g = heap();
    let thread = g.heap.main_thread;
    let log = g.heap.new_table().unwrap();

    let close_a = make_close_fn(&mut g, log, b"a");
    let close_b = make_close_fn(&mut g, log, b"b");

    let mt_a = g.heap.new_table().unwrap();
    let mt_b = g.heap.new_table().unwrap();
    let close_key = g.heap.new_string(b"__close").unwrap();
    g.heap.raw_set_in(mt_a, Value::Object(close_key), close_a).unwrap();
    g.heap.raw_set_in(mt_b, Value::Object(close_key), close_b).unwrap();

    let a = g.heap.new_table().unwrap();
    let b = g.heap.new_table().unwrap();
    g.heap.set_table_metatable(a, Some(mt_a));
    g.heap.set_table_metatable(b, Some(mt_b));

    let base = g.heap.thread(thread).stack.len();
    g.heap.thread_mut(thread).push_value(Value::Object(a));
    g.heap.thread_mut(thread).push_value(Value::Object(b));
    tbc::mark_tbc(&mut g, thread, base, Value::Object(a)).unwrap();
    tbc::mark_tbc(&mut g, thread, base + 1, Value::Object(b)).unwrap();

    tbc::close_from(&mut g, thread, base, None, |state, close_fn, obj, err| {
        if close_fn.is_nil() {
            return Ok(());
        }
        quill_vm::call_for_results(state, thread, close_fn, &[obj, err], 0).map(|_| ())
    })
    .unwrap();

    let rendered: Vec<String> = (0..2)
        .map(|i| {
            let v = g.heap.table(log).raw_get(&g.heap, &Value::Integer(i + 1));
            match v {
                Value::Object(id) => String::from_utf8(g.heap.object_bytes(id).unwrap().to_vec()).unwrap(),
                other => panic!("expected a string log entry, got {other:?}"),
            }
        })
        .collect();
    assert_eq!(rendered, vec!["b", "a"], "close handlers must run LIFO");
}
