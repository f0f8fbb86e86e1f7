//! Bytecode load/dump (spec §6.2): a binary chunk format good enough to
//! round-trip a prototype tree through this runtime. Bit-exact
//! compatibility with the source's own binary chunks is explicitly not
//! required once a writer ships alongside the reader, so the layout below
//! borrows the header shape (magic, version/format bytes, data-check
//! bytes, size/endianness/fingerprint checks) but encodes the body as
//! this crate's own tagged [`Instruction`]/[`Value`] variants rather than
//! packed 32-bit words.

use quill_core::closure::{Upvalue, UpvalueState};
use quill_core::opcode::{ArithOp, Instruction};
use quill_core::proto::{AbsLineInfo, DebugInfo, LocalVarDesc, Proto, UpvalDesc};
use quill_core::{GcObject, Value};
use quill_gc::GcObjectId;

use crate::error::{LoadError, LoadResult};
use crate::state::State;

const MAGIC: &[u8; 4] = b"\x1bLua";
const VERSION: u8 = 0x10; // major 1, minor 0
const FORMAT: u8 = 0;
const DATA_CHECK: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
const FINGERPRINT: f64 = 370.5;
const ENDIAN_CHECK: i64 = 0x5678;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    fn opt_bytes(&mut self, b: Option<&[u8]>) {
        match b {
            Some(b) => {
                self.bool(true);
                self.bytes(b);
            }
            None => self.bool(false),
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> LoadResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(LoadError::Truncated { expected: n - (self.buf.len() - self.pos) });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> LoadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> LoadResult<bool> {
        Ok(self.u8()? != 0)
    }

    fn u32(&mut self) -> LoadResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> LoadResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> LoadResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> LoadResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn bytes(&mut self) -> LoadResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn opt_bytes(&mut self) -> LoadResult<Option<Vec<u8>>> {
        if self.bool()? {
            Ok(Some(self.bytes()?))
        } else {
            Ok(None)
        }
    }
}

fn encode_arith_op(op: ArithOp) -> u8 {
    match op {
        ArithOp::Add => 0,
        ArithOp::Sub => 1,
        ArithOp::Mul => 2,
        ArithOp::Div => 3,
        ArithOp::Idiv => 4,
        ArithOp::Mod => 5,
        ArithOp::Pow => 6,
        ArithOp::Band => 7,
        ArithOp::Bor => 8,
        ArithOp::Bxor => 9,
        ArithOp::Shl => 10,
        ArithOp::Shr => 11,
    }
}

fn decode_arith_op(tag: u8) -> LoadResult<ArithOp> {
    Ok(match tag {
        0 => ArithOp::Add,
        1 => ArithOp::Sub,
        2 => ArithOp::Mul,
        3 => ArithOp::Div,
        4 => ArithOp::Idiv,
        5 => ArithOp::Mod,
        6 => ArithOp::Pow,
        7 => ArithOp::Band,
        8 => ArithOp::Bor,
        9 => ArithOp::Bxor,
        10 => ArithOp::Shl,
        11 => ArithOp::Shr,
        _ => return Err(LoadError::BadOpcode(tag)),
    })
}

fn encode_instruction(w: &mut Writer, instr: &Instruction) {
    match *instr {
        Instruction::Move { a, b } => { w.u8(0); w.u8(a); w.u8(b); }
        Instruction::LoadI { a, sbx } => { w.u8(1); w.u8(a); w.i32(sbx); }
        Instruction::LoadF { a, sbx } => { w.u8(2); w.u8(a); w.i32(sbx); }
        Instruction::LoadK { a, bx } => { w.u8(3); w.u8(a); w.u32(bx); }
        Instruction::LoadKX { a, extra_arg } => { w.u8(4); w.u8(a); w.u32(extra_arg); }
        Instruction::LoadFalse { a } => { w.u8(5); w.u8(a); }
        Instruction::LoadTrue { a } => { w.u8(6); w.u8(a); }
        Instruction::LoadNil { a, b } => { w.u8(7); w.u8(a); w.u8(b); }
        Instruction::GetUpval { a, b } => { w.u8(8); w.u8(a); w.u8(b); }
        Instruction::SetUpval { a, b } => { w.u8(9); w.u8(a); w.u8(b); }
        Instruction::GetTabUp { a, b, c } => { w.u8(10); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::GetTable { a, b, c } => { w.u8(11); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::GetI { a, b, c } => { w.u8(12); w.u8(a); w.u8(b); w.i32(c); }
        Instruction::GetField { a, b, c } => { w.u8(13); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::SetTabUp { a, b, c, k_c } => { w.u8(14); w.u8(a); w.u8(b); w.u8(c); w.bool(k_c); }
        Instruction::SetTable { a, b, c, k_c } => { w.u8(15); w.u8(a); w.u8(b); w.u8(c); w.bool(k_c); }
        Instruction::SetI { a, b, c, k_c } => { w.u8(16); w.u8(a); w.u8(b); w.i32(c); w.bool(k_c); }
        Instruction::SetField { a, b, c, k_c } => { w.u8(17); w.u8(a); w.u8(b); w.u8(c); w.bool(k_c); }
        Instruction::NewTable { a, narray, nhash } => { w.u8(18); w.u8(a); w.u32(narray); w.u32(nhash); }
        Instruction::Self_ { a, b, c, k_c } => { w.u8(19); w.u8(a); w.u8(b); w.u8(c); w.bool(k_c); }
        Instruction::AddI { a, b, imm } => { w.u8(20); w.u8(a); w.u8(b); w.i32(imm); }
        Instruction::Arith { op, a, b, c } => { w.u8(21); w.u8(encode_arith_op(op)); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::ArithK { op, a, b, c } => { w.u8(22); w.u8(encode_arith_op(op)); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::ArithImm { op, a, b, imm } => { w.u8(23); w.u8(encode_arith_op(op)); w.u8(a); w.u8(b); w.i32(imm); }
        Instruction::Unm { a, b } => { w.u8(24); w.u8(a); w.u8(b); }
        Instruction::BNot { a, b } => { w.u8(25); w.u8(a); w.u8(b); }
        Instruction::Not { a, b } => { w.u8(26); w.u8(a); w.u8(b); }
        Instruction::Len { a, b } => { w.u8(27); w.u8(a); w.u8(b); }
        Instruction::Concat { a, b } => { w.u8(28); w.u8(a); w.u8(b); }
        Instruction::MmBin { a, b, event } => { w.u8(29); w.u8(a); w.u8(b); w.u8(event); }
        Instruction::MmBinI { a, imm, event, flipped } => { w.u8(30); w.u8(a); w.i32(imm); w.u8(event); w.bool(flipped); }
        Instruction::MmBinK { a, b, event, flipped } => { w.u8(31); w.u8(a); w.u8(b); w.u8(event); w.bool(flipped); }
        Instruction::Eq { a, b, k } => { w.u8(32); w.u8(a); w.u8(b); w.bool(k); }
        Instruction::Lt { a, b, k } => { w.u8(33); w.u8(a); w.u8(b); w.bool(k); }
        Instruction::Le { a, b, k } => { w.u8(34); w.u8(a); w.u8(b); w.bool(k); }
        Instruction::EqK { a, b, k } => { w.u8(35); w.u8(a); w.u8(b); w.bool(k); }
        Instruction::EqI { a, imm, k } => { w.u8(36); w.u8(a); w.i32(imm); w.bool(k); }
        Instruction::LtI { a, imm, k } => { w.u8(37); w.u8(a); w.i32(imm); w.bool(k); }
        Instruction::LeI { a, imm, k } => { w.u8(38); w.u8(a); w.i32(imm); w.bool(k); }
        Instruction::GtI { a, imm, k } => { w.u8(39); w.u8(a); w.i32(imm); w.bool(k); }
        Instruction::GeI { a, imm, k } => { w.u8(40); w.u8(a); w.i32(imm); w.bool(k); }
        Instruction::Jmp { sj } => { w.u8(41); w.i32(sj); }
        Instruction::Test { a, k } => { w.u8(42); w.u8(a); w.bool(k); }
        Instruction::TestSet { a, b, k } => { w.u8(43); w.u8(a); w.u8(b); w.bool(k); }
        Instruction::Call { a, b, c } => { w.u8(44); w.u8(a); w.u8(b); w.u8(c); }
        Instruction::TailCall { a, b, c, k } => { w.u8(45); w.u8(a); w.u8(b); w.u8(c); w.bool(k); }
        Instruction::Return { a, b, c, k } => { w.u8(46); w.u8(a); w.u8(b); w.u8(c); w.bool(k); }
        Instruction::Return0 => { w.u8(47); }
        Instruction::Return1 { a } => { w.u8(48); w.u8(a); }
        Instruction::ForPrep { a, bx } => { w.u8(49); w.u8(a); w.u32(bx); }
        Instruction::ForLoop { a, bx } => { w.u8(50); w.u8(a); w.u32(bx); }
        Instruction::TForPrep { a, bx } => { w.u8(51); w.u8(a); w.u32(bx); }
        Instruction::TForCall { a, c } => { w.u8(52); w.u8(a); w.u8(c); }
        Instruction::TForLoop { a, bx } => { w.u8(53); w.u8(a); w.u32(bx); }
        Instruction::Closure { a, bx } => { w.u8(54); w.u8(a); w.u32(bx); }
        Instruction::Vararg { a, c } => { w.u8(55); w.u8(a); w.u8(c); }
        Instruction::VarargPrep { a } => { w.u8(56); w.u8(a); }
        Instruction::Close { a } => { w.u8(57); w.u8(a); }
        Instruction::Tbc { a } => { w.u8(58); w.u8(a); }
    }
}

fn decode_instruction(r: &mut Reader) -> LoadResult<Instruction> {
    let tag = r.u8()?;
    Ok(match tag {
        0 => Instruction::Move { a: r.u8()?, b: r.u8()? },
        1 => Instruction::LoadI { a: r.u8()?, sbx: r.i32()? },
        2 => Instruction::LoadF { a: r.u8()?, sbx: r.i32()? },
        3 => Instruction::LoadK { a: r.u8()?, bx: r.u32()? },
        4 => Instruction::LoadKX { a: r.u8()?, extra_arg: r.u32()? },
        5 => Instruction::LoadFalse { a: r.u8()? },
        6 => Instruction::LoadTrue { a: r.u8()? },
        7 => Instruction::LoadNil { a: r.u8()?, b: r.u8()? },
        8 => Instruction::GetUpval { a: r.u8()?, b: r.u8()? },
        9 => Instruction::SetUpval { a: r.u8()?, b: r.u8()? },
        10 => Instruction::GetTabUp { a: r.u8()?, b: r.u8()?, c: r.u8()? },
        11 => Instruction::GetTable { a: r.u8()?, b: r.u8()?, c: r.u8()? },
        12 => Instruction::GetI { a: r.u8()?, b: r.u8()?, c: r.i32()? },
        13 => Instruction::GetField { a: r.u8()?, b: r.u8()?, c: r.u8()? },
        14 => Instruction::SetTabUp { a: r.u8()?, b: r.u8()?, c: r.u8()?, k_c: r.bool()? },
        15 => Instruction::SetTable { a: r.u8()?, b: r.u8()?, c: r.u8()?, k_c: r.bool()? },
        16 => Instruction::SetI { a: r.u8()?, b: r.u8()?, c: r.i32()?, k_c: r.bool()? },
        17 => Instruction::SetField { a: r.u8()?, b: r.u8()?, c: r.u8()?, k_c: r.bool()? },
        18 => Instruction::NewTable { a: r.u8()?, narray: r.u32()?, nhash: r.u32()? },
        19 => Instruction::Self_ { a: r.u8()?, b: r.u8()?, c: r.u8()?, k_c: r.bool()? },
        20 => Instruction::AddI { a: r.u8()?, b: r.u8()?, imm: r.i32()? },
        21 => { let op = decode_arith_op(r.u8()?)?; Instruction::Arith { op, a: r.u8()?, b: r.u8()?, c: r.u8()? } }
        22 => { let op = decode_arith_op(r.u8()?)?; Instruction::ArithK { op, a: r.u8()?, b: r.u8()?, c: r.u8()? } }
        23 => { let op = decode_arith_op(r.u8()?)?; Instruction::ArithImm { op, a: r.u8()?, b: r.u8()?, imm: r.i32()? } }
        24 => Instruction::Unm { a: r.u8()?, b: r.u8()? },
        25 => Instruction::BNot { a: r.u8()?, b: r.u8()? },
        26 => Instruction::Not { a: r.u8()?, b: r.u8()? },
        27 => Instruction::Len { a: r.u8()?, b: r.u8()? },
        28 => Instruction::Concat { a: r.u8()?, b: r.u8()? },
        29 => Instruction::MmBin { a: r.u8()?, b: r.u8()?, event: r.u8()? },
        30 => Instruction::MmBinI { a: r.u8()?, imm: r.i32()?, event: r.u8()?, flipped: r.bool()? },
        31 => Instruction::MmBinK { a: r.u8()?, b: r.u8()?, event: r.u8()?, flipped: r.bool()? },
        32 => Instruction::Eq { a: r.u8()?, b: r.u8()?, k: r.bool()? },
        33 => Instruction::Lt { a: r.u8()?, b: r.u8()?, k: r.bool()? },
        34 => Instruction::Le { a: r.u8()?, b: r.u8()?, k: r.bool()? },
        35 => Instruction::EqK { a: r.u8()?, b: r.u8()?, k: r.bool()? },
        36 => Instruction::EqI { a: r.u8()?, imm: r.i32()?, k: r.bool()? },
        37 => Instruction::LtI { a: r.u8()?, imm: r.i32()?, k: r.bool()? },
        38 => Instruction::LeI { a: r.u8()?, imm: r.i32()?, k: r.bool()? },
        39 => Instruction::GtI { a: r.u8()?, imm: r.i32()?, k: r.bool()? },
        40 => Instruction::GeI { a: r.u8()?, imm: r.i32()?, k: r.bool()? },
        41 => Instruction::Jmp { sj: r.i32()? },
        42 => Instruction::Test { a: r.u8()?, k: r.bool()? },
        43 => Instruction::TestSet { a: r.u8()?, b: r.u8()?, k: r.bool()? },
        44 => Instruction::Call { a: r.u8()?, b: r.u8()?, c: r.u8()? },
        45 => Instruction::TailCall { a: r.u8()?, b: r.u8()?, c: r.u8()?, k: r.bool()? },
        46 => Instruction::Return { a: r.u8()?, b: r.u8()?, c: r.u8()?, k: r.bool()? },
        47 => Instruction::Return0,
        48 => Instruction::Return1 { a: r.u8()? },
        49 => Instruction::ForPrep { a: r.u8()?, bx: r.u32()? },
        50 => Instruction::ForLoop { a: r.u8()?, bx: r.u32()? },
        51 => Instruction::TForPrep { a: r.u8()?, bx: r.u32()? },
        52 => Instruction::TForCall { a: r.u8()?, c: r.u8()? },
        53 => Instruction::TForLoop { a: r.u8()?, bx: r.u32()? },
        54 => Instruction::Closure { a: r.u8()?, bx: r.u32()? },
        55 => Instruction::Vararg { a: r.u8()?, c: r.u8()? },
        56 => Instruction::VarargPrep { a: r.u8()? },
        57 => Instruction::Close { a: r.u8()? },
        58 => Instruction::Tbc { a: r.u8()? },
        _ => return Err(LoadError::BadOpcode(tag)),
    })
}

fn encode_constant(state: &State, w: &mut Writer, v: &Value) {
    match *v {
        Value::Nil(_) => w.u8(0),
        Value::Boolean(b) => { w.u8(1); w.bool(b); }
        Value::Integer(i) => { w.u8(2); w.i64(i); }
        Value::Float(f) => { w.u8(3); w.f64(f); }
        Value::Object(id) => {
            let bytes = state.global().heap.object_bytes(id).expect("non-string object in constant table");
            w.u8(4);
            w.bytes(bytes);
        }
        Value::LightCFunction(_) | Value::LightUserdata(_) => panic!("non-constant value in constant table"),
    }
}

fn decode_constant(state: &mut State, r: &mut Reader) -> LoadResult<Value> {
    Ok(match r.u8()? {
        0 => Value::NIL,
        1 => Value::Boolean(r.bool()?),
        2 => Value::Integer(r.i64()?),
        3 => Value::Float(r.f64()?),
        4 => {
            let bytes = r.bytes()?;
            Value::Object(state.global_mut().heap.new_string(&bytes)?)
        }
        tag => return Err(LoadError::BadConstantTag(tag)),
    })
}

fn encode_proto(state: &State, w: &mut Writer, proto: &Proto) {
    w.opt_bytes(proto.debug.source_name.map(|id| state.global().heap.object_bytes(id).expect("source name")));
    w.i32(proto.debug.line_defined);
    w.i32(proto.debug.last_line_defined);
    w.u8(proto.num_params);
    w.bool(proto.is_vararg);
    w.u8(proto.max_stack_size);

    w.u32(proto.code.len() as u32);
    for instr in &proto.code {
        encode_instruction(w, instr);
    }

    w.u32(proto.constants.len() as u32);
    for c in &proto.constants {
        encode_constant(state, w, c);
    }

    w.u32(proto.upvalues.len() as u32);
    for up in &proto.upvalues {
        w.bool(up.in_stack);
        w.u8(up.idx);
        w.bytes(state.global().heap.object_bytes(up.name).unwrap_or(b""));
    }

    w.u32(proto.protos.len() as u32);
    for &p in &proto.protos {
        let nested = state.global().heap.proto(p);
        encode_proto(state, w, nested);
    }

    let stripped = proto.debug.line_deltas.is_empty();
    w.bool(!stripped);
    if !stripped {
        w.u32(proto.debug.line_deltas.len() as u32);
        for d in &proto.debug.line_deltas {
            w.u8(*d as u8);
        }
        w.u32(proto.debug.abs_line_info.len() as u32);
        for a in &proto.debug.abs_line_info {
            w.u32(a.pc);
            w.i32(a.line);
        }
        w.u32(proto.debug.local_vars.len() as u32);
        for l in &proto.debug.local_vars {
            w.bytes(state.global().heap.object_bytes(l.name).unwrap_or(b""));
            w.u32(l.start_pc);
            w.u32(l.end_pc);
        }
        w.u32(proto.debug.upvalue_names.len() as u32);
        for n in &proto.debug.upvalue_names {
            w.opt_bytes(n.and_then(|id| state.global().heap.object_bytes(id)));
        }
    }
}

fn decode_proto(state: &mut State, r: &mut Reader) -> LoadResult<GcObjectId> {
    let source_name = match r.opt_bytes()? {
        Some(b) => Some(state.global_mut().heap.new_string(&b)?),
        None => None,
    };
    let line_defined = r.i32()?;
    let last_line_defined = r.i32()?;
    let num_params = r.u8()?;
    let is_vararg = r.bool()?;
    let max_stack_size = r.u8()?;

    let mut proto = Proto::new(num_params, is_vararg, max_stack_size);
    proto.debug.source_name = source_name;
    proto.debug.line_defined = line_defined;
    proto.debug.last_line_defined = last_line_defined;

    let code_len = r.u32()? as usize;
    proto.code.reserve(code_len);
    for _ in 0..code_len {
        proto.code.push(decode_instruction(r)?);
    }

    let k_len = r.u32()? as usize;
    proto.constants.reserve(k_len);
    for _ in 0..k_len {
        proto.constants.push(decode_constant(state, r)?);
    }

    let up_len = r.u32()? as usize;
    proto.upvalues.reserve(up_len);
    for _ in 0..up_len {
        let in_stack = r.bool()?;
        let idx = r.u8()?;
        let name_bytes = r.bytes()?;
        let name = state.global_mut().heap.new_string(&name_bytes)?;
        proto.upvalues.push(UpvalDesc { in_stack, idx, name });
    }

    let nested_len = r.u32()? as usize;
    proto.protos.reserve(nested_len);
    for _ in 0..nested_len {
        proto.protos.push(decode_proto(state, r)?);
    }

    if r.bool()? {
        let mut debug = DebugInfo::default();
        let deltas_len = r.u32()? as usize;
        debug.line_deltas.reserve(deltas_len);
        for _ in 0..deltas_len {
            debug.line_deltas.push(r.u8()? as i8);
        }
        let abs_len = r.u32()? as usize;
        debug.abs_line_info.reserve(abs_len);
        for _ in 0..abs_len {
            debug.abs_line_info.push(AbsLineInfo { pc: r.u32()?, line: r.i32()? });
        }
        let locals_len = r.u32()? as usize;
        debug.local_vars.reserve(locals_len);
        for _ in 0..locals_len {
            let name_bytes = r.bytes()?;
            let name = state.global_mut().heap.new_string(&name_bytes)?;
            debug.local_vars.push(LocalVarDesc { name, start_pc: r.u32()?, end_pc: r.u32()? });
        }
        let upnames_len = r.u32()? as usize;
        debug.upvalue_names.reserve(upnames_len);
        for _ in 0..upnames_len {
            let name = match r.opt_bytes()? {
                Some(b) => Some(state.global_mut().heap.new_string(&b)?),
                None => None,
            };
            debug.upvalue_names.push(name);
        }
        debug.source_name = proto.debug.source_name;
        debug.line_defined = proto.debug.line_defined;
        debug.last_line_defined = proto.debug.last_line_defined;
        proto.debug = debug;
    }

    Ok(state.global_mut().heap.alloc_object(GcObject::Proto(proto))?)
}

/// Serialize the prototype tree rooted at `proto_id` (spec §6.2); pairs
/// with [`load_bytecode`] for round-tripping a compiled chunk.
pub fn dump_bytecode(state: &State, proto_id: GcObjectId) -> Vec<u8> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(MAGIC);
    w.u8(VERSION);
    w.u8(FORMAT);
    w.buf.extend_from_slice(DATA_CHECK);
    w.u8(std::mem::size_of::<i64>() as u8);
    w.u8(std::mem::size_of::<usize>() as u8);
    w.u8(1); // instruction unit size: this format is not packed-word based
    w.i64(ENDIAN_CHECK);
    w.f64(FINGERPRINT);

    let proto = state.global().heap.proto(proto_id);
    encode_proto(state, &mut w, proto);
    w.buf
}

/// Deserialize a chunk produced by [`dump_bytecode`] and wrap it in a
/// callable closure. `env`, when given, becomes the value bound to the
/// chunk's first declared upvalue (conventionally `_ENV`); any further
/// declared upvalues close over nil, since a freshly loaded chunk has no
/// enclosing frame to capture from (spec §6.1's "Load" explicitly treats
/// bytecode mode as untrusted-input-safe, not source-equivalent).
pub fn load_bytecode(state: &mut State, bytes: &[u8], env: Option<Value>) -> LoadResult<Value> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != MAGIC {
        return Err(LoadError::BadSignature);
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(LoadError::VersionMismatch { chunk: version, runtime: VERSION });
    }
    let format = r.u8()?;
    if format != FORMAT {
        return Err(LoadError::UnknownFormat(format));
    }
    if r.take(6)? != DATA_CHECK {
        return Err(LoadError::DataCheckFailed);
    }
    let size_int = r.u8()?;
    let size_sizet = r.u8()?;
    let _instr_unit = r.u8()?;
    if size_int != std::mem::size_of::<i64>() as u8 || size_sizet != std::mem::size_of::<usize>() as u8 {
        return Err(LoadError::DataCheckFailed);
    }
    let endian = r.i64()?;
    if endian != ENDIAN_CHECK {
        return Err(LoadError::DataCheckFailed);
    }
    let fingerprint = r.f64()?;
    if fingerprint.to_bits() != FINGERPRINT.to_bits() {
        return Err(LoadError::DataCheckFailed);
    }

    let proto_id = decode_proto(state, &mut r)?;
    let num_upvalues = state.global().heap.proto(proto_id).upvalues.len();
    let mut upvalues = Vec::with_capacity(num_upvalues);
    for i in 0..num_upvalues {
        let value = if i == 0 { env.unwrap_or(Value::NIL) } else { Value::NIL };
        upvalues.push(state.global_mut().heap.alloc_object(GcObject::Upvalue(Upvalue { state: UpvalueState::Closed(value) }))?);
    }
    let closure = state.global_mut().heap.new_lua_closure(proto_id, upvalues)?;
    Ok(Value::Object(closure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn sample_proto(state: &mut State) -> GcObjectId {
        let mut proto = Proto::new(0, false, 2);
        proto.code.push(Instruction::LoadI { a: 0, sbx: 42 });
        proto.code.push(Instruction::Return1 { a: 0 });
        state.global_mut().heap.alloc_object(GcObject::Proto(proto)).unwrap()
    }

    #[test]
    fn round_trips_a_tiny_chunk() {
        let mut state = State::new_state(&VmConfig::default(), Some(1));
        let proto_id = sample_proto(&mut state);

        let bytes = dump_bytecode(&state, proto_id);
        let closure = load_bytecode(&mut state, &bytes, None).unwrap();

        let thread = state.main_thread();
        let results = crate::call::call(&mut state, thread, closure, &[], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Value::Integer(42)));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut state = State::new_state(&VmConfig::default(), Some(1));
        let proto_id = sample_proto(&mut state);
        let mut bytes = dump_bytecode(&state, proto_id);
        bytes.truncate(bytes.len() - 4);

        let err = load_bytecode(&mut state, &bytes, None).unwrap_err();
        assert!(matches!(err, LoadError::Truncated { .. }));
    }

    #[test]
    fn rejects_bad_signature() {
        let mut state = State::new_state(&VmConfig::default(), Some(1));
        let err = load_bytecode(&mut state, b"not a chunk at all, long enough to pass header reads!!", None).unwrap_err();
        assert!(matches!(err, LoadError::BadSignature));
    }
}
