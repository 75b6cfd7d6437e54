//! Benchmarks for HNSW build and search throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use forge_ann::{AnnIndex, HnswIndex, Label};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_hnsw_search(c: &mut Criterion) {
    let dim = 128;
    let n = 10_000;
    let data = random_data(n, dim, 3);

    let index = HnswIndex::new(dim, n).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    let queries = random_data(100, dim, 4);

    c.bench_function("hnsw_search_k10", |bench| {
        let mut qi = 0;
        bench.iter(|| {
            let query = &queries[(qi % 100) * dim..((qi % 100) + 1) * dim];
            qi += 1;
            black_box(index.search(black_box(query), 10))
        })
    });

    c.bench_function("hnsw_search_batch_100_k10", |bench| {
        bench.iter(|| black_box(index.search_batch(black_box(&queries), 10)))
    });
}

fn bench_hnsw_insert(c: &mut Criterion) {
    let dim = 128;
    let data = random_data(1000, dim, 5);

    c.bench_function("hnsw_insert_1000", |bench| {
        bench.iter(|| {
            let index = HnswIndex::new(dim, 1000).unwrap();
            for i in 0..1000 {
                index
                    .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                    .unwrap();
            }
            black_box(index.len())
        })
    });
}

criterion_group!(benches, bench_hnsw_search, bench_hnsw_insert);
criterion_main!(benches);
