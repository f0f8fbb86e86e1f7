//! The universal associative container (component C).
//!
//! Grounded on `ltable.h`'s split array/hash layout and spec §3.4/§4.2.
//! Every method below is the *raw* operation — no `__index`/`__newindex`
//! consultation. The metamethod chain-walk (`finish_get`/`finish_set` in
//! the source) needs to call back into the interpreter to invoke a
//! function metamethod, so that dispatch loop lives in `quill-vm`;
//! `metamethod.rs` in this crate only describes *which* event fires and
//! where to look, not how to execute it.
//!
//! Key hashing and equality need to compare string *contents*, which this
//! module can't do on its own (a `Value::Object` is just an id) — so
//! every method that needs it takes a `&dyn TableKeyOps` the same way
//! `string_table.rs` takes a `bytes_of` callback.

use quill_gc::GcObjectId;

use crate::error::{CoreError, CoreResult};
use crate::value::{NilVariant, Value};

/// How to hash and compare a [`Value`] used as a table key. `GlobalState`
/// implements this (it owns the string table and object arena needed to
/// compare string/long-string contents).
pub trait TableKeyOps {
    fn hash_key(&self, key: &Value) -> u64;
    fn keys_equal(&self, a: &Value, b: &Value) -> bool;
}

pub mod metaflag {
    pub const INDEX: u8 = 1 << 0;
    pub const NEWINDEX: u8 = 1 << 1;
    pub const GC: u8 = 1 << 2;
    pub const MODE: u8 = 1 << 3;
    pub const LEN: u8 = 1 << 4;
    pub const EQ: u8 = 1 << 5;
}

#[derive(Clone, Debug)]
enum NodeKey {
    Empty,
    /// A key whose referent a weak-table sweep has reclaimed. Keeping the
    /// hash (not the key itself) preserves `next`'s chain position (spec
    /// §3.4's "dead keys") without holding a reference the GC would have
    /// to keep tracing.
    Dead { hash: u64 },
    Live(Value),
}

#[derive(Clone, Debug)]
struct Node {
    key: NodeKey,
    value: Value,
    next: Option<usize>,
}

impl Node {
    fn empty() -> Self {
        Node { key: NodeKey::Empty, value: Value::NIL, next: None }
    }
}

#[derive(Clone, Debug)]
pub struct Table {
    /// `array[i]` holds the value for integer key `i + 1`.
    array: Vec<Value>,
    nodes: Vec<Node>,
    /// Cursor for `find_free_node`, scanned backward (ltable.c's actual
    /// `lastfree` optimization: free slots tend to cluster at the end
    /// right after a rehash).
    last_free: usize,
    pub metatable: Option<GcObjectId>,
    /// Bitmap of confirmed-absent fast metamethods (spec §4.2).
    pub flags: u8,
}

/// Converts an integral float key to its integer form so `t[1]` and
/// `t[1.0]` name the same slot (spec §3.4, scenario S6).
pub fn normalize_key(key: Value) -> Value {
    if let Value::Float(f) = key {
        if f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) {
            return Value::Integer(f as i64);
        }
    }
    key
}

impl Table {
    pub fn new() -> Self {
        Table { array: Vec::new(), nodes: Vec::new(), last_free: 0, metatable: None, flags: 0 }
    }

    pub fn with_size_hints(narray: usize, nhash: usize) -> Self {
        let mut t = Self::new();
        t.array = vec![Value::NIL; narray];
        let hash_size = nhash.next_power_of_two();
        if hash_size > 0 {
            t.nodes = vec![Node::empty(); hash_size];
            t.last_free = hash_size;
        }
        t
    }

    fn array_index(&self, key: &Value) -> Option<usize> {
        match key {
            Value::Integer(i) if *i >= 1 && (*i as u64) <= self.array.len() as u64 => Some((*i - 1) as usize),
            _ => None,
        }
    }

    fn mainposition(&self, ops: &dyn TableKeyOps, key: &Value) -> usize {
        debug_assert!(!self.nodes.is_empty());
        (ops.hash_key(key) as usize) % self.nodes.len()
    }

    fn find_node(&self, ops: &dyn TableKeyOps, key: &Value) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut idx = self.mainposition(ops, key);
        loop {
            if let NodeKey::Live(k) = &self.nodes[idx].key {
                if ops.keys_equal(k, key) {
                    return Some(idx);
                }
            }
            idx = self.nodes[idx].next?;
        }
    }

    /// Raw read (spec §4.2): never consults `__index`. Returns `Value::NIL`
    /// for both a genuinely absent key and a key whose value was set nil.
    pub fn raw_get(&self, ops: &dyn TableKeyOps, key: &Value) -> Value {
        let key = normalize_key(*key);
        if let Some(i) = self.array_index(&key) {
            return self.array[i];
        }
        match self.find_node(ops, &key) {
            Some(idx) => self.nodes[idx].value,
            None => Value::NIL,
        }
    }

    /// Raw write (spec §4.2). Growing the array part only happens via the
    /// append fast path (`key == array.len() + 1`); any other new integer
    /// key lands in the hash part until the next rehash promotes it.
    pub fn raw_set(&mut self, ops: &dyn TableKeyOps, key: Value, value: Value) -> CoreResult<()> {
        let key = normalize_key(key);
        if matches!(key, Value::Nil(NilVariant::Nil)) {
            return Err(CoreError::NilKey);
        }
        if let Value::Float(f) = key {
            if f.is_nan() {
                return Err(CoreError::NanKey);
            }
        }
        if let Some(i) = self.array_index(&key) {
            self.array[i] = value;
            return Ok(());
        }
        if let Value::Integer(i) = key {
            if i >= 1 && i as usize == self.array.len() + 1 {
                self.array.push(value);
                return Ok(());
            }
        }
        if let Some(idx) = self.find_node(ops, &key) {
            self.nodes[idx].value = value;
            return Ok(());
        }
        if value.is_nil() {
            // Never allocate a hash slot just to store "absent".
            return Ok(());
        }
        self.insert_new_key(ops, key, value);
        Ok(())
    }

    fn find_free_node(&mut self) -> Option<usize> {
        while self.last_free > 0 {
            self.last_free -= 1;
            if matches!(self.nodes[self.last_free].key, NodeKey::Empty) {
                return Some(self.last_free);
            }
        }
        None
    }

    fn insert_new_key(&mut self, ops: &dyn TableKeyOps, key: Value, value: Value) {
        if self.nodes.is_empty() {
            self.rehash(ops, Some((key, value)));
            return;
        }
        let main = self.mainposition(ops, &key);
        if matches!(self.nodes[main].key, NodeKey::Empty) {
            self.nodes[main] = Node { key: NodeKey::Live(key), value, next: None };
            return;
        }
        match self.find_free_node() {
            Some(free) => {
                let existing_next = self.nodes[main].next;
                self.nodes[free] = Node { key: NodeKey::Live(key), value, next: existing_next };
                self.nodes[main].next = Some(free);
            }
            None => self.rehash(ops, Some((key, value))),
        }
    }

    /// Rehash policy (spec §4.2): count live integer keys by power-of-two
    /// range, choose the largest array size `p` such that at least half
    /// of `1..=p` is occupied, and size the hash part for the remainder.
    fn rehash(&mut self, ops: &dyn TableKeyOps, pending: Option<(Value, Value)>) {
        let mut live: Vec<(Value, Value)> = Vec::new();
        for (i, v) in self.array.iter().enumerate() {
            if !v.is_nil() {
                live.push((Value::Integer(i as i64 + 1), *v));
            }
        }
        for node in &self.nodes {
            if let NodeKey::Live(k) = &node.key {
                if !node.value.is_nil() {
                    live.push((*k, node.value));
                }
            }
        }
        if let Some(p) = pending {
            live.push(p);
        }

        const BUCKETS: usize = 64;
        let mut counts = [0usize; BUCKETS];
        let mut total_ints = 0usize;
        for (k, _) in &live {
            if let Value::Integer(i) = k {
                if *i >= 1 {
                    let bucket = (64 - (*i as u64).leading_zeros()) as usize;
                    if bucket < BUCKETS {
                        counts[bucket] += 1;
                    }
                    total_ints += 1;
                }
            }
        }
        let mut array_size = 0usize;
        let mut cumulative = 0usize;
        for (i, count) in counts.iter().enumerate() {
            cumulative += count;
            let p = 1usize << i;
            if cumulative * 2 >= p {
                array_size = p;
            }
        }

        let absorbed = live
            .iter()
            .filter(|(k, _)| matches!(k, Value::Integer(i) if *i >= 1 && (*i as usize) <= array_size))
            .count();
        let hash_size = (live.len() - absorbed).next_power_of_two();

        self.array = vec![Value::NIL; array_size];
        self.nodes = vec![Node::empty(); hash_size.max(if hash_size > 0 { hash_size } else { 0 })];
        self.last_free = self.nodes.len();

        for (k, v) in live {
            if let Value::Integer(i) = k {
                if i >= 1 && (i as usize) <= array_size {
                    self.array[(i - 1) as usize] = v;
                    continue;
                }
            }
            if self.nodes.is_empty() {
                self.nodes.push(Node::empty());
                self.last_free = 1;
            }
            let main = self.mainposition(ops, &k);
            if matches!(self.nodes[main].key, NodeKey::Empty) {
                self.nodes[main] = Node { key: NodeKey::Live(k), value: v, next: None };
            } else if let Some(free) = self.find_free_node() {
                let existing_next = self.nodes[main].next;
                self.nodes[free] = Node { key: NodeKey::Live(k), value: v, next: existing_next };
                self.nodes[main].next = Some(free);
            } else {
                // Should not happen: the table was sized for exactly
                // `live.len()` entries. Grow by one node defensively
                // rather than silently dropping a key.
                self.nodes.push(Node { key: NodeKey::Live(k), value: v, next: None });
            }
        }
    }

    /// `#t` (spec §4.2): returns *a* border, not necessarily the largest.
    pub fn length(&self, ops: &dyn TableKeyOps) -> i64 {
        let n = self.array.len();
        if n > 0 && !self.array[n - 1].is_nil() {
            return self.hash_border_search(ops, n as i64 + 1);
        }
        if n == 0 {
            if self.raw_get(ops, &Value::Integer(1)).is_nil() {
                return 0;
            }
            return self.hash_border_search(ops, 1);
        }
        let mut lo = 0usize;
        let mut hi = n;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.array[mid - 1].is_nil() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo as i64
    }

    fn hash_border_search(&self, ops: &dyn TableKeyOps, start: i64) -> i64 {
        let mut i = start - 1;
        let mut j = start;
        loop {
            if self.raw_get(ops, &Value::Integer(j)).is_nil() {
                break;
            }
            i = j;
            match j.checked_mul(2) {
                Some(next) => j = next,
                None => {
                    // Degenerate: walk forward one at a time rather than
                    // overflow the doubling search.
                    let mut k = i;
                    while !self.raw_get(ops, &Value::Integer(k + 1)).is_nil() {
                        k += 1;
                    }
                    return k;
                }
            }
        }
        while j - i > 1 {
            let mid = i + (j - i) / 2;
            if self.raw_get(ops, &Value::Integer(mid)).is_nil() {
                j = mid;
            } else {
                i = mid;
            }
        }
        i
    }

    /// `next(t, k)` (spec §4.2): array part first, then hash part in
    /// storage order (which is "some" order, not insertion order — the
    /// contract only requires covering every live key exactly once).
    pub fn next_key(&self, ops: &dyn TableKeyOps, key: &Value) -> CoreResult<Option<(Value, Value)>> {
        let start_hash_idx = if matches!(key, Value::Nil(NilVariant::Nil)) {
            if let Some(pos) = self.array.iter().position(|v| !v.is_nil()) {
                return Ok(Some((Value::Integer(pos as i64 + 1), self.array[pos])));
            }
            0
        } else {
            let key = normalize_key(*key);
            if let Some(i) = self.array_index(&key) {
                if let Some(pos) = self.array[i + 1..].iter().position(|v| !v.is_nil()) {
                    let idx = i + 1 + pos;
                    return Ok(Some((Value::Integer(idx as i64 + 1), self.array[idx])));
                }
                0
            } else {
                let slot = self
                    .locate_hash_slot(ops, &key)
                    .ok_or_else(|| CoreError::BadArgument { index: 2, message: "invalid key to 'next'".into() })?;
                slot + 1
            }
        };
        for idx in start_hash_idx..self.nodes.len() {
            if let NodeKey::Live(k) = &self.nodes[idx].key {
                if !self.nodes[idx].value.is_nil() {
                    return Ok(Some((*k, self.nodes[idx].value)));
                }
            }
        }
        Ok(None)
    }

    fn locate_hash_slot(&self, ops: &dyn TableKeyOps, key: &Value) -> Option<usize> {
        if let Some(idx) = self.find_node(ops, key) {
            return Some(idx);
        }
        // The key may name a node the GC has since turned into a dead
        // key; match by hash alone so iteration can still resume.
        let hash = ops.hash_key(key);
        self.nodes.iter().position(|n| matches!(n.key, NodeKey::Dead { hash: h } if h == hash))
    }

    /// Called by `GlobalState`'s weak-table GC hook when a key's referent
    /// has been swept: keeps the node's chain position alive (spec §3.4
    /// dead keys) without holding a traced reference.
    pub fn clear_dead_key(&mut self, idx: usize, hash: u64) {
        self.nodes[idx].key = NodeKey::Dead { hash };
        self.nodes[idx].value = Value::NIL;
    }

    pub fn clear_value_at(&mut self, idx: usize) {
        self.nodes[idx].value = Value::NIL;
    }

    pub fn array_len(&self) -> usize {
        self.array.len()
    }

    pub fn array_value(&self, idx: usize) -> Value {
        self.array[idx]
    }

    pub fn hash_len(&self) -> usize {
        self.nodes.len()
    }

    /// Every live (non-nil-valued) key-value pair, in storage order. Used
    /// by the collector's `trace_children` and by weak-table processing.
    pub fn live_entries(&self) -> impl Iterator<Item = (Option<Value>, Value, usize)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match &n.key {
            NodeKey::Live(k) if !n.value.is_nil() => Some((Some(*k), n.value, i)),
            _ => None,
        })
    }

    pub fn has_cached_absent(&self, bit: u8) -> bool {
        self.flags & bit != 0
    }

    pub fn mark_metamethod_absent(&mut self, bit: u8) {
        self.flags |= bit;
    }

    pub fn invalidate_metamethod_cache(&mut self) {
        self.flags = 0;
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Objects a [`Table`] references; used by `GlobalState`'s `trace_children`.
pub fn trace_table(t: &Table, mut out: impl FnMut(GcObjectId)) {
    for v in &t.array {
        if let Value::Object(id) = v {
            out(*id);
        }
    }
    for node in &t.nodes {
        if let NodeKey::Live(k) = &node.key {
            if let Value::Object(id) = k {
                out(*id);
            }
        }
        if let Value::Object(id) = &node.value {
            out(*id);
        }
    }
    if let Some(mt) = t.metatable {
        out(mt);
    }
}
