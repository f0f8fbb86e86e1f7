//! Global state shared by every thread of one VM instance (component,
//! spec §3.7). This is the object arena plus everything `quill_gc::Heap`
//! needs to drive a cycle over it.
//!
//! Split into two fields rather than one flat struct: `collector: Collector`
//! and `heap: ObjectHeap`. `quill_gc::heap::Heap` is implemented on
//! `ObjectHeap`, not on `GlobalState` itself, so that
//! `self.collector.step(&mut self.heap)` borrows two disjoint fields
//! instead of a method trying to hand `self` to itself — the
//! self-referential-call problem an arena-of-indices design runs into as
//! soon as the "driver" and the "driven" are the same object.
//!
//! `ObjectHeap` caches the collector's current white color locally
//! (`current_white`) because allocation needs it but lives on the other
//! side of the split; `GlobalState` re-syncs it every time it drives the
//! collector forward.

use std::sync::Arc;

use quill_gc::heap::{Heap, WeakMode};
use quill_gc::{Collector, Color, GcConfig, GcHeader, GcObjectId, GcPhase};
use quill_util::hash::{os_random_seed, seeded_hash_bits, seeded_hash_bytes, seeded_hash_i64};

use crate::closure::{CClosure, LuaClosure, Upvalue, UpvalueState};
use crate::error::{CoreError, CoreResult, OUT_OF_MEMORY_MESSAGE};
use crate::metamethod::MetaEvent;
use crate::object::{GcObject, Userdata};
use crate::proto::Proto;
use crate::string_table::{LuaString, StringBytes, StringTable, DEFAULT_SHORT_STRING_CAP};
use crate::table::{normalize_key, Table, TableKeyOps};
use crate::thread::Thread;
use crate::value::{HostFn, TypeTag, Value};

struct ObjectSlot {
    header: GcHeader,
    object: Option<GcObject>,
}

#[derive(Clone, Copy, Debug)]
enum RegistrySlot {
    Free,
    Used,
}

/// The object arena, string table, registry, per-type metatables, and
/// thread set. Implements [`quill_gc::heap::Heap`] and
/// [`crate::table::TableKeyOps`].
pub struct ObjectHeap {
    objects: Vec<ObjectSlot>,
    free_list: Vec<u32>,
    string_table: StringTable,
    seed: u64,
    current_white: Color,
    pub registry: GcObjectId,
    type_metatables: [Option<GcObjectId>; 8],
    event_names: Vec<GcObjectId>,
    pub main_thread: GcObjectId,
    /// The thread currently executing, if any — its stack is a root
    /// while a call is in progress even before anything else reaches it
    /// (spec §4.5/§5).
    pub current_thread: Option<GcObjectId>,
    registry_slots: Vec<RegistrySlot>,
    short_string_cap: usize,
    warn_fn: Option<Box<dyn FnMut(&str)>>,
    panic_fn: Option<Box<dyn FnMut(&Value)>>,
    /// Set by `quill-vm` at VM construction: given a finalizer function
    /// value and the object it belongs to, actually call it. `quill-core`
    /// has no interpreter of its own, so running a `__gc` Lua closure has
    /// to be delegated across the crate boundary (mirrors the `Heap`
    /// trait seam quill-gc already uses for tracing).
    finalizer_hook: Option<Box<dyn FnMut(&mut ObjectHeap, GcObjectId, Value) -> Result<(), String>>>,
    out_of_memory_string: GcObjectId,
}

pub struct GlobalState {
    pub collector: Collector,
    pub heap: ObjectHeap,
}

impl ObjectHeap {
    fn new_with_seed(seed: u64) -> Self {
        let mut heap = ObjectHeap {
            objects: Vec::new(),
            free_list: Vec::new(),
            string_table: StringTable::new(seed),
            seed,
            current_white: Color::White0,
            registry: GcObjectId::from_u32(0),
            type_metatables: Default::default(),
            event_names: Vec::new(),
            main_thread: GcObjectId::from_u32(0),
            current_thread: None,
            registry_slots: Vec::new(),
            short_string_cap: DEFAULT_SHORT_STRING_CAP,
            warn_fn: None,
            panic_fn: None,
            finalizer_hook: None,
            out_of_memory_string: GcObjectId::from_u32(0),
        };

        // Spec §4.1's failure mode: the OOM string must exist before
        // anything else that could fail to allocate.
        heap.out_of_memory_string = heap
            .new_string(OUT_OF_MEMORY_MESSAGE.as_bytes())
            .expect("interning the out-of-memory string must not itself fail");

        for event in MetaEvent::ALL {
            let id = heap.new_string(event.name().as_bytes()).expect("interning event names must not fail");
            heap.event_names.push(id);
        }

        heap.registry = heap.new_table().expect("registry table allocation must not fail");
        heap.main_thread = heap.new_thread().expect("main thread allocation must not fail");
        heap.current_thread = Some(heap.main_thread);
        heap
    }

    fn alloc_slot(&mut self, header: GcHeader, object: GcObject) -> GcObjectId {
        if let Some(idx) = self.free_list.pop() {
            self.objects[idx as usize] = ObjectSlot { header, object: Some(object) };
            GcObjectId::from_u32(idx)
        } else {
            let idx = self.objects.len() as u32;
            self.objects.push(ObjectSlot { header, object: Some(object) });
            GcObjectId::from_u32(idx)
        }
    }

    fn object(&self, id: GcObjectId) -> &GcObject {
        self.objects[id.as_u32() as usize].object.as_ref().expect("dereferenced a freed GcObjectId")
    }

    fn object_mut(&mut self, id: GcObjectId) -> &mut GcObject {
        self.objects[id.as_u32() as usize].object.as_mut().expect("dereferenced a freed GcObjectId")
    }

    pub fn type_tag_of(&self, value: &Value) -> TypeTag {
        match value {
            Value::Nil(_) => TypeTag::Nil,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Integer(_) | Value::Float(_) => TypeTag::Number,
            Value::LightUserdata(_) => TypeTag::Userdata,
            Value::LightCFunction(_) => TypeTag::Function,
            Value::Object(id) => self.object(*id).type_tag(),
        }
    }

    pub fn object_bytes(&self, id: GcObjectId) -> Option<&[u8]> {
        self.object(id).as_string().map(|s| s.as_bytes())
    }

    fn object_hash(&self, id: GcObjectId) -> u64 {
        match self.object(id).as_string() {
            Some(s) => s.hash.unwrap_or_else(|| self.string_table.hash_bytes(s.as_bytes())),
            None => seeded_hash_bits(self.seed, id.as_u32() as u64),
        }
    }

    // -- string interning (component B, spec §4.1) --------------------

    /// Intern (or find) a short string, or build a `LongString` object
    /// when `bytes.len()` exceeds the configured cap.
    pub fn new_string(&mut self, bytes: &[u8]) -> CoreResult<GcObjectId> {
        if bytes.len() > self.short_string_cap {
            return self.new_long(bytes.to_vec().into_boxed_slice());
        }
        let hash = self.string_table.hash_bytes(bytes);
        if let Some(id) = self.string_table.find(hash, bytes, |id| self.object_bytes(id).unwrap_or(&[])) {
            return Ok(id);
        }
        let obj = GcObject::ShortString(LuaString { bytes: StringBytes::Owned(bytes.into()), is_short: true, hash: Some(hash) });
        let id = self.alloc_object(obj)?;
        self.string_table.insert(id, hash);
        Ok(id)
    }

    pub fn new_long(&mut self, bytes: Box<[u8]>) -> CoreResult<GcObjectId> {
        let obj = GcObject::LongString(LuaString { bytes: StringBytes::Owned(bytes), is_short: false, hash: None });
        self.alloc_object(obj)
    }

    pub fn new_long_external(&mut self, bytes: Arc<[u8]>) -> CoreResult<GcObjectId> {
        let obj = GcObject::LongString(LuaString { bytes: StringBytes::External(bytes), is_short: false, hash: None });
        self.alloc_object(obj)
    }

    /// Lazily compute and cache a long string's hash the first time it is
    /// used as a table key (spec §4.1).
    pub fn hash_long(&mut self, id: GcObjectId) -> u64 {
        let hash = self.string_table.hash_bytes(self.object(id).as_string().expect("not a string").as_bytes());
        if let GcObject::LongString(s) = self.object_mut(id) {
            s.hash = Some(hash);
        }
        hash
    }

    pub fn string_eq(&self, a: GcObjectId, b: GcObjectId) -> bool {
        if a == b {
            return true;
        }
        match (self.object(a).as_string(), self.object(b).as_string()) {
            (Some(sa), Some(sb)) => sa.is_short == sb.is_short && sa.as_bytes() == sb.as_bytes(),
            _ => false,
        }
    }

    // -- object arena allocation ----------------------------------------

    /// Allocate a fresh arena slot for `object`, current-white. Debt
    /// accounting against the embedder's memory ceiling happens
    /// separately, through [`GlobalState::notify_alloc`] — this call
    /// itself never fails.
    pub fn alloc_object(&mut self, object: GcObject) -> CoreResult<GcObjectId> {
        let size = object.approx_size_bytes() as u32;
        let header = GcHeader::new(self.current_white, size);
        Ok(self.alloc_slot(header, object))
    }

    pub fn new_table(&mut self) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Table(Table::new()))
    }

    pub fn new_table_sized(&mut self, narray: usize, nhash: usize) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Table(Table::with_size_hints(narray, nhash)))
    }

    pub fn new_lua_closure(&mut self, proto: GcObjectId, upvalues: Vec<GcObjectId>) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::LuaClosure(LuaClosure { proto, upvalues }))
    }

    pub fn new_cclosure(&mut self, func: HostFn, upvalues: Vec<Value>) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::CClosure(CClosure { func, upvalues }))
    }

    pub fn new_proto(&mut self, proto: Proto) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Proto(proto))
    }

    pub fn new_open_upvalue(&mut self, thread: GcObjectId, register: usize) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Upvalue(Upvalue::open(thread, register)))
    }

    pub fn new_thread(&mut self) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Thread(Thread::new()))
    }

    pub fn new_userdata(&mut self, data: Box<dyn std::any::Any>, n_user_values: usize) -> CoreResult<GcObjectId> {
        self.alloc_object(GcObject::Userdata(Userdata { data, metatable: None, user_values: vec![Value::NIL; n_user_values] }))
    }

    // -- accessors --------------------------------------------------------

    pub fn table(&self, id: GcObjectId) -> &Table {
        self.object(id).as_table().expect("not a table")
    }

    pub fn table_mut(&mut self, id: GcObjectId) -> &mut Table {
        self.object_mut(id).as_table_mut().expect("not a table")
    }

    pub fn object_as_table(&self, id: GcObjectId) -> Option<&Table> {
        self.object(id).as_table()
    }

    pub fn object_is_callable(&self, id: GcObjectId) -> bool {
        matches!(self.object(id), GcObject::LuaClosure(_) | GcObject::CClosure(_))
    }

    pub fn object_as_lua_closure(&self, id: GcObjectId) -> Option<&LuaClosure> {
        self.object(id).as_lua_closure()
    }

    pub fn object_as_cclosure(&self, id: GcObjectId) -> Option<&CClosure> {
        self.object(id).as_cclosure()
    }

    /// Raw table write that needs read access to `self` (string contents,
    /// seed) for hashing while the table itself is mutated. Moves the
    /// table out of the arena for the duration of the call so the two
    /// borrows don't alias the same `&mut self` — nothing reentrant (no
    /// metamethod call, no allocation that could trigger a GC trace over
    /// this object) happens inside `Table::raw_set` itself.
    pub fn raw_set_in(&mut self, id: GcObjectId, key: Value, value: Value) -> CoreResult<()> {
        let idx = id.as_u32() as usize;
        let mut table = match self.objects[idx].object.take() {
            Some(GcObject::Table(t)) => t,
            other => {
                self.objects[idx].object = other;
                panic!("not a table");
            }
        };
        let result = table.raw_set(self, key, value);
        self.objects[idx].object = Some(GcObject::Table(table));
        result
    }

    pub fn thread(&self, id: GcObjectId) -> &Thread {
        self.object(id).as_thread().expect("not a thread")
    }

    pub fn thread_mut(&mut self, id: GcObjectId) -> &mut Thread {
        self.object_mut(id).as_thread_mut().expect("not a thread")
    }

    pub fn proto(&self, id: GcObjectId) -> &Proto {
        self.object(id).as_proto().expect("not a proto")
    }

    pub fn lua_closure(&self, id: GcObjectId) -> &LuaClosure {
        self.object(id).as_lua_closure().expect("not a lua closure")
    }

    pub fn cclosure(&self, id: GcObjectId) -> &CClosure {
        self.object(id).as_cclosure().expect("not a c closure")
    }

    pub fn upvalue(&self, id: GcObjectId) -> &Upvalue {
        self.object(id).as_upvalue().expect("not an upvalue")
    }

    pub fn close_upvalue(&mut self, id: GcObjectId, value: Value) {
        if let Some(u) = self.object_mut(id).as_upvalue_mut() {
            u.state = UpvalueState::Closed(value);
        }
    }

    // -- metatables (spec §3.7, §4.13) -------------------------------

    pub fn metatable_of(&self, value: &Value) -> Option<GcObjectId> {
        match value {
            Value::Object(id) => self.object(*id).metatable().or_else(|| self.type_metatables[self.type_tag_of(value) as usize]),
            _ => self.type_metatables[self.type_tag_of(value) as usize],
        }
    }

    pub fn set_type_metatable(&mut self, tag: TypeTag, mt: Option<GcObjectId>) {
        self.type_metatables[tag as usize] = mt;
    }

    pub fn set_table_metatable(&mut self, table: GcObjectId, mt: Option<GcObjectId>) {
        self.table_mut(table).metatable = mt;
        self.table_mut(table).invalidate_metamethod_cache();
    }

    pub fn event_name(&self, event: MetaEvent) -> GcObjectId {
        self.event_names[event as usize]
    }

    /// The lookup protocol's field fetch (spec §4.13 step 2): find
    /// `event` in `value`'s metatable, using the table's absent-bit cache
    /// first.
    pub fn get_metamethod(&self, value: &Value, event: MetaEvent) -> Value {
        let Some(mt_id) = self.metatable_of(value) else { return Value::NIL };
        let mt = self.table(mt_id);
        if let Some(bit) = event.cache_bit() {
            if mt.has_cached_absent(bit) {
                return Value::NIL;
            }
        }
        let name = self.event_name(event);
        mt.raw_get(self, &Value::Object(name))
    }

    // -- GC-facing lookups --------------------------------------------

    pub fn header_of(&self, id: GcObjectId) -> GcHeader {
        self.objects[id.as_u32() as usize].header
    }

    pub fn current_white(&self) -> Color {
        self.current_white
    }

    fn set_current_white(&mut self, white: Color) {
        self.current_white = white;
    }

    /// Change the short/long string boundary (spec §6.3); takes effect
    /// for strings interned after the call, existing strings keep
    /// whichever representation they were built with.
    pub fn set_short_string_cap(&mut self, cap: usize) {
        self.short_string_cap = cap;
    }

    pub fn set_finalizer_hook(&mut self, hook: Box<dyn FnMut(&mut ObjectHeap, GcObjectId, Value) -> Result<(), String>>) {
        self.finalizer_hook = Some(hook);
    }

    pub fn set_warn_fn(&mut self, f: Option<Box<dyn FnMut(&str)>>) {
        self.warn_fn = f;
    }

    pub fn warn(&mut self, msg: &str) {
        if let Some(f) = &mut self.warn_fn {
            f(msg);
        }
    }

    pub fn set_panic_fn(&mut self, f: Option<Box<dyn FnMut(&Value)>>) {
        self.panic_fn = f;
    }

    pub fn panic(&mut self, error: &Value) {
        if let Some(f) = &mut self.panic_fn {
            f(error);
        }
    }

    pub fn out_of_memory_error(&self) -> Value {
        Value::Object(self.out_of_memory_string)
    }

    // -- registry (spec §6.1 "References") -----------------------------

    /// Pin `v` and return a stable integer handle; `unreference` releases
    /// it. Implemented as `registry[handle] = v`, so reachability falls
    /// out of the registry table already being a GC root.
    pub fn reference(&mut self, v: Value) -> CoreResult<i64> {
        let slot = self.registry_slots.iter().position(|s| matches!(s, RegistrySlot::Free));
        let idx = match slot {
            Some(i) => {
                self.registry_slots[i] = RegistrySlot::Used;
                i
            }
            None => {
                self.registry_slots.push(RegistrySlot::Used);
                self.registry_slots.len() - 1
            }
        };
        let key = Value::Integer(idx as i64 + 1);
        self.raw_set_in(self.registry, key, v)?;
        Ok(idx as i64 + 1)
    }

    pub fn unreference(&mut self, handle: i64) -> CoreResult<()> {
        if handle < 1 || handle as usize > self.registry_slots.len() {
            return Ok(());
        }
        self.registry_slots[handle as usize - 1] = RegistrySlot::Free;
        self.raw_set_in(self.registry, Value::Integer(handle), Value::NIL)
    }

    pub fn get_reference(&self, handle: i64) -> Value {
        self.table(self.registry).raw_get(self, &Value::Integer(handle))
    }

    // -- weak table support (spec §4.5 "Weak tables") --------------------

    fn weak_mode_of(&self, id: GcObjectId) -> Option<WeakMode> {
        let table = self.objects[id.as_u32() as usize].object.as_ref()?.as_table()?;
        let mt_id = table.metatable?;
        let mt = self.objects[mt_id.as_u32() as usize].object.as_ref()?.as_table()?;
        let mode_name = self.event_names[MetaEvent::Mode as usize];
        let Value::Object(mode_str_id) = mt.raw_get(self, &Value::Object(mode_name)) else { return None };
        let bytes = self.object_bytes(mode_str_id)?;
        match (bytes.contains(&b'k'), bytes.contains(&b'v')) {
            (true, true) => Some(WeakMode::WeakBoth),
            (true, false) => Some(WeakMode::Ephemeron),
            (false, true) => Some(WeakMode::WeakValues),
            (false, false) => None,
        }
    }
}

impl GlobalState {
    pub fn new(config: GcConfig, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(os_random_seed);
        GlobalState { collector: Collector::new(config), heap: ObjectHeap::new_with_seed(seed) }
    }

    fn sync_white(&mut self) {
        self.heap.set_current_white(self.collector.current_white());
    }

    pub fn step(&mut self) -> GcPhase {
        let phase = self.collector.step(&mut self.heap);
        self.sync_white();
        phase
    }

    pub fn full_collect(&mut self) {
        self.collector.full_collect(&mut self.heap);
        self.sync_white();
    }

    pub fn emergency_collect(&mut self) {
        self.collector.emergency_collect(&mut self.heap);
        self.sync_white();
    }

    /// Account a fresh allocation and drive a step if the new debt
    /// crosses this cycle's threshold (spec §4.4's debt-driven pacing).
    pub fn notify_alloc(&mut self, size: usize) -> CoreResult<()> {
        self.collector.alloc.account_alloc(size).map_err(|_| CoreError::OutOfMemory)?;
        if self.collector.notify_alloc(size) {
            self.step();
        }
        Ok(())
    }
}

impl TableKeyOps for ObjectHeap {
    fn hash_key(&self, key: &Value) -> u64 {
        match normalize_key(*key) {
            Value::Nil(_) => 0,
            Value::Boolean(b) => seeded_hash_bits(self.seed, b as u64),
            Value::Integer(i) => seeded_hash_i64(self.seed, i),
            Value::Float(f) => seeded_hash_bits(self.seed, f.to_bits()),
            Value::LightUserdata(p) => seeded_hash_bits(self.seed, p as u64),
            Value::LightCFunction(f) => seeded_hash_bits(self.seed, f as usize as u64),
            Value::Object(id) => match self.object(id).as_string() {
                Some(s) => s.hash.unwrap_or_else(|| seeded_hash_bytes(self.seed, s.as_bytes())),
                None => self.object_hash(id),
            },
        }
    }

    fn keys_equal(&self, a: &Value, b: &Value) -> bool {
        match (normalize_key(*a), normalize_key(*b)) {
            (Value::Object(ia), Value::Object(ib)) => {
                if ia == ib {
                    return true;
                }
                match (self.object(ia).as_string(), self.object(ib).as_string()) {
                    (Some(sa), Some(sb)) => sa.as_bytes() == sb.as_bytes(),
                    _ => false,
                }
            }
            (a, b) => a.raw_primitive_eq(&b).unwrap_or(false),
        }
    }
}

impl Heap for ObjectHeap {
    fn header(&self, id: GcObjectId) -> GcHeader {
        self.objects[id.as_u32() as usize].header
    }

    fn set_header(&mut self, id: GcObjectId, header: GcHeader) {
        self.objects[id.as_u32() as usize].header = header;
    }

    fn trace_children(&self, id: GcObjectId, out: &mut dyn FnMut(GcObjectId)) {
        if let Some(obj) = &self.objects[id.as_u32() as usize].object {
            obj.trace(|child| out(child));
        }
    }

    fn roots(&self, out: &mut dyn FnMut(GcObjectId)) {
        out(self.registry);
        out(self.main_thread);
        if let Some(t) = self.current_thread {
            if t != self.main_thread {
                out(t);
            }
        }
        for mt in self.type_metatables.iter().flatten() {
            out(*mt);
        }
        for &name in &self.event_names {
            out(name);
        }
        out(self.out_of_memory_string);
    }

    fn all_objects(&self) -> Vec<GcObjectId> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some())
            .map(|(i, _)| GcObjectId::from_u32(i as u32))
            .collect()
    }

    fn has_finalizer(&self, id: GcObjectId) -> bool {
        self.header(id).has_finalizer
    }

    fn run_finalizer(&mut self, id: GcObjectId) -> Result<(), String> {
        let gc_fn = self.get_metamethod(&Value::Object(id), MetaEvent::Gc);
        if gc_fn.is_nil() {
            return Ok(());
        }
        let mut hook = self.finalizer_hook.take();
        let result = match &mut hook {
            Some(f) => f(self, id, gc_fn),
            None => Ok(()),
        };
        self.finalizer_hook = hook;
        result
    }

    fn is_resurrected(&self, id: GcObjectId) -> bool {
        // `quill-vm`'s finalizer hook is responsible for actually linking
        // the object back into a reachable structure during
        // `run_finalizer`; by the time the collector asks, a black or
        // gray header here means a reachable write happened since the
        // atomic phase re-whited it.
        !self.header(id).color.is_white()
    }

    fn free(&mut self, id: GcObjectId) {
        let idx = id.as_u32() as usize;
        if let Some(GcObject::ShortString(s)) = self.objects[idx].object.take() {
            if let Some(hash) = s.hash {
                self.string_table.remove(id, hash);
            }
        }
        self.free_list.push(id.as_u32());
    }

    fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.object.as_ref()?;
                let id = GcObjectId::from_u32(i as u32);
                self.weak_mode_of(id).map(|mode| (id, mode))
            })
            .collect()
    }

    fn clear_dead_weak_entries(&mut self, id: GcObjectId, current_white: Color) -> usize {
        let Some(mode) = self.weak_mode_of(id) else { return 0 };
        let entries: Vec<(Option<Value>, Value, usize)> = self.table(id).live_entries().collect();
        let mut cleared = 0;
        for (key_opt, value, idx) in entries {
            let key_dead = matches!(key_opt, Some(Value::Object(k)) if self.header(k).color.is_dead(current_white));
            let value_dead = matches!(value, Value::Object(v) if self.header(v).color.is_dead(current_white));
            let should_clear = match mode {
                WeakMode::WeakKeys | WeakMode::Ephemeron => key_dead,
                WeakMode::WeakValues => value_dead,
                WeakMode::WeakBoth => key_dead || value_dead,
            };
            if !should_clear {
                continue;
            }
            if key_dead {
                if let Some(key) = key_opt {
                    let hash = self.hash_key(&key);
                    self.table_mut(id).clear_dead_key(idx, hash);
                }
            } else {
                self.table_mut(id).clear_value_at(idx);
            }
            cleared += 1;
        }
        cleared
    }

    fn revive_ephemeron_values(&mut self, id: GcObjectId, current_white: Color, out: &mut dyn FnMut(GcObjectId)) {
        if self.weak_mode_of(id) != Some(WeakMode::Ephemeron) {
            return;
        }
        let entries: Vec<(Option<Value>, Value)> = self.table(id).live_entries().map(|(k, v, _)| (k, v)).collect();
        for (key_opt, value) in entries {
            let key_alive = match key_opt {
                Some(Value::Object(k)) => !self.header(k).color.is_dead(current_white),
                Some(_) | None => true,
            };
            if !key_alive {
                continue;
            }
            if let Value::Object(v) = value {
                if self.header(v).color.is_dead(current_white) {
                    out(v);
                }
            }
        }
    }
}
