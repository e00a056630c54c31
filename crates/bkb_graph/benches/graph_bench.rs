//! Benchmarks for bkb_graph
//!
//! Run with: cargo bench -p bkb_graph

use bkb_graph::GraphStore;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn layered_store(layers: usize, width: usize) -> GraphStore {
    let mut store = GraphStore::new();
    let mut previous = Vec::new();
    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for w in 0..width {
            let id = store.add_inode(format!("L{}_{}", layer, w), "on").unwrap();
            store.add_inode(format!("L{}_{}", layer, w), "off").unwrap();
            if previous.is_empty() {
                store.add_snode(id, [], 1.0).unwrap();
            } else {
                store
                    .add_snode(id, [previous[w % previous.len()]], 0.7)
                    .unwrap();
            }
            current.push(id);
        }
        previous = current;
    }
    store
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for layers in [5, 20, 50].iter() {
        group.bench_with_input(BenchmarkId::new("layered", layers), layers, |b, &layers| {
            b.iter(|| black_box(layered_store(layers, 20)));
        });
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let store = layered_store(50, 20);
    c.bench_function("verify", |b| b.iter(|| black_box(&store).verify().unwrap()));
}

criterion_group!(benches, bench_build, bench_verify);
criterion_main!(benches);
