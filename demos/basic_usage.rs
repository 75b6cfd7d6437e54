//! Minimal walkthrough: build an HNSW index, query it, inspect memory.
//!
//! Run with: cargo run --example basic_usage

use forge_ann::{AnnIndex, HnswIndex, Label};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() {
    let dim = 128;
    let n = 10_000;

    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<f32> = (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();

    println!("Building HNSW index over {} vectors (dim {})...", n, dim);
    let index = HnswIndex::new(dim, n).expect("valid construction parameters");
    for i in 0..n {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .expect("capacity covers the dataset");
    }

    let query: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let results = index.search(&query, 10);

    println!("Top {} neighbors:", results.len());
    for (rank, r) in results.iter().enumerate() {
        println!("  {:>2}. {} at distance {:.4}", rank + 1, r.label, r.distance);
    }

    println!(
        "Index memory: {:.2} MB (SIMD: {})",
        index.memory_usage() as f64 / (1024.0 * 1024.0),
        forge_ann::distance::isa_name()
    );
}
