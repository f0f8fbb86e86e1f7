//! Shared test heap for the integration suite.
//!
//! A minimal [`Heap`] backed by a flat `Vec` of object slots with an
//! adjacency list for children and an explicit root set. Good enough to
//! exercise every collector phase (propagation, atomic weak/ephemeron
//! resolution, sweep, finalization) without dragging in `quill-core`.

use quill_gc::heap::{Heap, WeakMode};
use quill_gc::{Color, GcHeader, GcObjectId};

#[derive(Default)]
pub struct TestHeap {
    headers: Vec<GcHeader>,
    edges: Vec<Vec<GcObjectId>>,
    roots: Vec<GcObjectId>,
    finalizers: Vec<bool>,
    resurrect_on_finalize: Vec<bool>,
    finalized: Vec<bool>,
    freed: Vec<GcObjectId>,
    weak: Vec<Option<WeakMode>>,
    /// For weak/ephemeron objects: the entries this object currently
    /// holds, as (key, value) id pairs.
    weak_entries: Vec<Vec<(GcObjectId, GcObjectId)>>,
}

impl TestHeap {
    pub fn with_objects(n: usize, white: Color) -> Self {
        Self {
            headers: (0..n).map(|_| GcHeader::new(white, 32)).collect(),
            edges: vec![Vec::new(); n],
            roots: Vec::new(),
            finalizers: vec![false; n],
            resurrect_on_finalize: vec![false; n],
            finalized: vec![false; n],
            freed: Vec::new(),
            weak: vec![None; n],
            weak_entries: vec![Vec::new(); n],
        }
    }

    pub fn add_root(&mut self, id: GcObjectId) {
        self.roots.push(id);
    }

    pub fn link(&mut self, from: GcObjectId, to: GcObjectId) {
        self.edges[from.as_u32() as usize].push(to);
    }

    pub fn set_finalizer(&mut self, id: GcObjectId, has: bool) {
        self.finalizers[id.as_u32() as usize] = has;
        let mut h = self.header(id);
        h.has_finalizer = has;
        self.set_header(id, h);
    }

    pub fn resurrect_on_finalize(&mut self, id: GcObjectId) {
        self.resurrect_on_finalize[id.as_u32() as usize] = true;
    }

    pub fn was_finalized(&self, id: GcObjectId) -> bool {
        self.finalized[id.as_u32() as usize]
    }

    pub fn was_freed(&self, id: GcObjectId) -> bool {
        self.freed.contains(&id)
    }

    pub fn make_weak(&mut self, id: GcObjectId, mode: WeakMode) {
        self.weak[id.as_u32() as usize] = Some(mode);
    }

    pub fn weak_insert(&mut self, container: GcObjectId, key: GcObjectId, value: GcObjectId) {
        self.weak_entries[container.as_u32() as usize].push((key, value));
    }

    pub fn weak_len(&self, container: GcObjectId) -> usize {
        self.weak_entries[container.as_u32() as usize].len()
    }

    pub fn object_count(&self) -> usize {
        self.headers.len()
    }
}

impl Heap for TestHeap {
    fn header(&self, id: GcObjectId) -> GcHeader {
        self.headers[id.as_u32() as usize]
    }

    fn set_header(&mut self, id: GcObjectId, header: GcHeader) {
        self.headers[id.as_u32() as usize] = header;
    }

    fn trace_children(&self, id: GcObjectId, out: &mut dyn FnMut(GcObjectId)) {
        for &c in &self.edges[id.as_u32() as usize] {
            out(c);
        }
    }

    fn roots(&self, out: &mut dyn FnMut(GcObjectId)) {
        for &r in &self.roots {
            out(r);
        }
    }

    fn all_objects(&self) -> Vec<GcObjectId> {
        (0..self.headers.len() as u32).map(GcObjectId::from_u32).collect()
    }

    fn has_finalizer(&self, id: GcObjectId) -> bool {
        self.finalizers[id.as_u32() as usize]
    }

    fn run_finalizer(&mut self, id: GcObjectId) -> Result<(), String> {
        self.finalized[id.as_u32() as usize] = true;
        if self.resurrect_on_finalize[id.as_u32() as usize] {
            if let Some(&root) = self.roots.first() {
                self.edges[root.as_u32() as usize].push(id);
            }
        }
        Ok(())
    }

    fn is_resurrected(&self, id: GcObjectId) -> bool {
        self.resurrect_on_finalize[id.as_u32() as usize]
    }

    fn free(&mut self, id: GcObjectId) {
        self.freed.push(id);
    }

    fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)> {
        self.weak
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.map(|m| (GcObjectId::from_u32(i as u32), m)))
            .collect()
    }

    fn clear_dead_weak_entries(&mut self, id: GcObjectId, current_white: Color) -> usize {
        let mode = self.weak[id.as_u32() as usize].expect("clear_dead_weak_entries on non-weak object");
        let before = self.weak_entries[id.as_u32() as usize].len();
        self.weak_entries[id.as_u32() as usize].retain(|&(k, v)| {
            let key_alive = !self.headers[k.as_u32() as usize].color.is_dead(current_white);
            let val_alive = !self.headers[v.as_u32() as usize].color.is_dead(current_white);
            match mode {
                WeakMode::WeakKeys => key_alive,
                WeakMode::WeakValues => val_alive,
                WeakMode::WeakBoth => key_alive && val_alive,
                WeakMode::Ephemeron => key_alive,
            }
        });
        before - self.weak_entries[id.as_u32() as usize].len()
    }

    fn revive_ephemeron_values(&mut self, id: GcObjectId, current_white: Color, out: &mut dyn FnMut(GcObjectId)) {
        if self.weak[id.as_u32() as usize] != Some(WeakMode::Ephemeron) {
            return;
        }
        for &(key, value) in &self.weak_entries[id.as_u32() as usize] {
            let key_alive = !self.headers[key.as_u32() as usize].color.is_dead(current_white);
            let value_is_white = self.headers[value.as_u32() as usize].color.is_white();
            if key_alive && value_is_white {
                out(value);
            }
        }
    }
}
