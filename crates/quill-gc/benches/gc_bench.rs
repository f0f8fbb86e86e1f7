//! Collector throughput benchmarks.
//!
//! Run with `cargo bench --package quill-gc`.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quill_gc::heap::{Heap, WeakMode};
use quill_gc::{Collector, Color, GcConfig, GcHeader, GcObjectId};

/// The same flat-vec heap the integration tests use, duplicated here
/// rather than shared across a `dev-dependencies`-only boundary (a
/// bench target can't depend on `tests/common` directly).
struct BenchHeap {
    headers: Vec<GcHeader>,
    edges: Vec<Vec<GcObjectId>>,
    roots: Vec<GcObjectId>,
}

impl BenchHeap {
    fn linked_list(len: usize) -> Self {
        let mut heap = Self {
            headers: (0..len).map(|_| GcHeader::new(Color::White0, 32)).collect(),
            edges: vec![Vec::new(); len],
            roots: vec![GcObjectId::from_u32(0)],
        };
        for i in 0..len.saturating_sub(1) as u32 {
            heap.edges[i as usize].push(GcObjectId::from_u32(i + 1));
        }
        heap
    }

    fn binary_tree(nodes: usize) -> Self {
        let mut heap = Self {
            headers: (0..nodes).map(|_| GcHeader::new(Color::White0, 32)).collect(),
            edges: vec![Vec::new(); nodes],
            roots: vec![GcObjectId::from_u32(0)],
        };
        for i in 0..nodes as u32 {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            if (left as usize) < nodes {
                heap.edges[i as usize].push(GcObjectId::from_u32(left));
            }
            if (right as usize) < nodes {
                heap.edges[i as usize].push(GcObjectId::from_u32(right));
            }
        }
        heap
    }
}

impl Heap for BenchHeap {
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
    fn has_finalizer(&self, _id: GcObjectId) -> bool {
        false
    }
    fn run_finalizer(&mut self, _id: GcObjectId) -> Result<(), String> {
        Ok(())
    }
    fn is_resurrected(&self, _id: GcObjectId) -> bool {
        false
    }
    fn free(&mut self, _id: GcObjectId) {}
    fn weak_objects(&self) -> Vec<(GcObjectId, WeakMode)> {
        Vec::new()
    }
    fn clear_dead_weak_entries(&mut self, _id: GcObjectId, _white: Color) -> usize {
        0
    }
    fn revive_ephemeron_values(&mut self, _id: GcObjectId, _white: Color, _out: &mut dyn FnMut(GcObjectId)) {}
}

fn bench_full_collect_linked_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_collect_linked_list");
    for &len in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(format!("len_{len}"), |b| {
            b.iter_batched(
                || (BenchHeap::linked_list(len), Collector::new(GcConfig::default())),
                |(mut heap, mut gc)| {
                    gc.full_collect(&mut heap);
                    black_box(gc.stats);
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_full_collect_binary_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_collect_binary_tree");
    for &nodes in &[255usize, 2_047, 8_191] {
        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_function(format!("nodes_{nodes}"), |b| {
            b.iter_batched(
                || (BenchHeap::binary_tree(nodes), Collector::new(GcConfig::default())),
                |(mut heap, mut gc)| {
                    gc.full_collect(&mut heap);
                    black_box(gc.stats);
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_incremental_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_step");
    group.bench_function("single_step_on_large_tree", |b| {
        b.iter_batched(
            || {
                let mut heap = BenchHeap::binary_tree(8_191);
                let mut gc = Collector::new(GcConfig { step_size_bytes: 256, ..GcConfig::default() });
                gc.alloc.account_alloc(8_191 * 32).unwrap();
                (heap, gc)
            },
            |(mut heap, mut gc)| {
                black_box(gc.step(&mut heap));
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_allocator_accounting(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_accounting");
    group.bench_function("account_alloc_then_free", |b| {
        let mut alloc = quill_gc::AllocFacade::default();
        b.iter(|| {
            alloc.account_alloc(black_box(64)).unwrap();
            alloc.account_free(black_box(64));
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_full_collect_linked_list,
    bench_full_collect_binary_tree,
    bench_incremental_step,
    bench_allocator_accounting
);
criterion_main!(benches);
