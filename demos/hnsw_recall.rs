//! Measure HNSW and HNSW+PQ recall against the brute-force oracle.
//!
//! Run with: cargo run --release --example hnsw_recall

use forge_ann::{recall_at_k, Dataset, HnswIndex, HnswPqIndex, Label, SearchResult};
use std::time::Instant;

fn main() {
    let dim = 128;
    let n = 20_000;
    let n_queries = 200;
    let k = 10;

    println!("Generating {} vectors (dim {})...", n, dim);
    let mut dataset = Dataset::generate(n, n_queries, dim, 99);
    println!("Computing brute-force ground truth...");
    dataset.compute_ground_truth(k);

    let start = Instant::now();
    let hnsw = HnswIndex::new(dim, n).expect("valid construction parameters");
    for i in 0..dataset.len() {
        hnsw.add(Label::new(i as i32), dataset.vector(i))
            .expect("capacity covers the dataset");
    }
    println!("HNSW build: {:.1?}", start.elapsed());

    let start = Instant::now();
    let hybrid = HnswPqIndex::new(dim, n).expect("valid construction parameters");
    hybrid.train(&dataset.vectors).expect("training sample is non-empty");
    for i in 0..dataset.len() {
        hybrid
            .add(Label::new(i as i32), dataset.vector(i))
            .expect("capacity covers the dataset");
    }
    println!(
        "HNSW+PQ build: {:.1?} (compression {:.0}x)",
        start.elapsed(),
        hybrid.get_compression_ratio()
    );

    let contenders: Vec<(&str, Box<dyn Fn(&[f32]) -> Vec<SearchResult> + '_>)> = vec![
        ("HNSW", Box::new(|q: &[f32]| hnsw.search(q, k))),
        ("HNSW+PQ", Box::new(|q: &[f32]| hybrid.search(q, k))),
    ];

    for (name, search) in contenders {
        let start = Instant::now();
        let mut total = 0.0f32;
        for qi in 0..n_queries {
            let predicted: Vec<i32> = search(dataset.query(qi))
                .into_iter()
                .map(|r| r.label.as_i32())
                .collect();
            total += recall_at_k(&predicted, &dataset.ground_truth[qi], k);
        }
        let elapsed = start.elapsed();
        println!(
            "{:<8} recall@{} = {:.3}, {:.2} ms/query",
            name,
            k,
            total / n_queries as f32,
            elapsed.as_secs_f64() * 1000.0 / n_queries as f64
        );
    }
}
