//! End-to-end index behavior: result contracts, capacity accounting,
//! quantization arithmetic, probe scaling, and recall gates against the
//! brute-force oracle. All randomness is seeded.

use forge_ann::{
    recall_at_k, AnnIndex, BruteForceIndex, Dataset, HnswIndex, HnswPqIndex, IvfConfig, IvfIndex,
    Label, PqIndex, ProductQuantizer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

// =============================================================================
// Result contracts
// =============================================================================

#[test]
fn hnsw_single_vector_sanity() {
    let index = HnswIndex::new(128, 100).unwrap();
    index.add(Label::new(7), &[0.5; 128]).unwrap();

    let results = index.search(&[0.5; 128], 5);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].label, Label::new(7));
    assert_eq!(results[0].distance, 0.0);
}

#[test]
fn count_bounds_and_sortedness() {
    let dim = 64;
    let n = 500;
    let data = random_data(n, dim, 1001);
    let index = HnswIndex::new(dim, n).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    let queries = random_data(20, dim, 1002);
    for k in [1, 5, 10, 700] {
        for qi in 0..20 {
            let results = index.search(&queries[qi * dim..(qi + 1) * dim], k);
            assert!(results.len() <= k.min(n));
            for pair in results.windows(2) {
                assert!(pair[0].distance <= pair[1].distance);
            }
        }
    }
}

#[test]
fn labels_are_preserved_not_remapped() {
    // Labels are opaque: negative, duplicated, and sparse values must come
    // back exactly as inserted.
    let dim = 32;
    let n = 200;
    let data = random_data(n, dim, 1003);
    let index = HnswIndex::new(dim, n).unwrap();

    let label_of = |i: usize| -> i32 { (i as i32) * 3 - 100 };
    for i in 0..n {
        index
            .add(Label::new(label_of(i)), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    let mut oracle = BruteForceIndex::new(dim, n).unwrap();
    for i in 0..n {
        oracle
            .add(Label::new(label_of(i)), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    for i in (0..n).step_by(23) {
        let query = &data[i * dim..(i + 1) * dim];
        let got = index.search(query, 1);
        let expected = oracle.search(query, 1);
        assert_eq!(got[0].label, expected[0].label);
        assert_eq!(got[0].label.as_i32(), label_of(i));
    }
}

// =============================================================================
// Capacity and size accounting
// =============================================================================

#[test]
fn append_only_size_accounting() {
    let dim = 16;
    let index = HnswIndex::new(dim, 50).unwrap();

    let labels: Vec<Label> = (0..30).map(Label::new).collect();
    let vectors = random_data(30, dim, 1005);
    let report = index.add_batch(&labels, &vectors);

    assert_eq!(report.added, 30);
    assert!(report.is_complete());
    assert_eq!(index.len(), 30);
}

#[test]
fn capacity_is_a_hard_bound() {
    let dim = 16;
    let cap = 25;
    let index = HnswIndex::new(dim, cap).unwrap();
    let data = random_data(cap + 1, dim, 1007);

    for i in 0..cap {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }
    assert_eq!(index.len(), cap);

    // The (capacity + 1)-th add fails cleanly and changes nothing.
    assert!(index
        .add(Label::new(999), &data[cap * dim..(cap + 1) * dim])
        .is_err());
    assert_eq!(index.len(), cap);
    assert!(index.len() <= index.capacity());
}

// =============================================================================
// HNSW recall
// =============================================================================

#[test]
fn hnsw_self_query_recall() {
    let dim = 128;
    let n = 1000;
    let data = random_data(n, dim, 42);
    let index = HnswIndex::new(dim, 2000).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    let mut hits = 0;
    for i in 0..50 {
        let query = &data[i * dim..(i + 1) * dim];
        let results = index.search(query, 1);
        if results[0].label == Label::new(i as i32) {
            hits += 1;
            assert!(results[0].distance < 1e-5);
        }
    }
    assert!(hits >= 49, "self-query recall too low: {}/50", hits);
}

#[test]
fn hnsw_batch_matches_sequential() {
    let dim = 128;
    let n = 1000;
    let data = random_data(n, dim, 42);
    let index = HnswIndex::new(dim, 2000).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
            .unwrap();
    }

    let queries = random_data(100, dim, 43);
    let batch = index.search_batch(&queries, 10);
    assert_eq!(batch.len(), 100);

    for qi in 0..100 {
        let sequential = index.search(&queries[qi * dim..(qi + 1) * dim], 10);
        let mut batch_labels: Vec<i32> = batch[qi].iter().map(|r| r.label.as_i32()).collect();
        let mut seq_labels: Vec<i32> = sequential.iter().map(|r| r.label.as_i32()).collect();
        // Order may differ only among exact distance ties; the label sets
        // must be identical.
        batch_labels.sort_unstable();
        seq_labels.sort_unstable();
        assert_eq!(batch_labels, seq_labels);
    }
}

#[test]
fn hnsw_recall_against_brute_force() {
    let dim = 128;
    let n = 1000;
    let k = 10;
    let mut dataset = Dataset::generate(n, 50, dim, 77);
    dataset.compute_ground_truth(k);

    let index = HnswIndex::new(dim, n).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), dataset.vector(i))
            .unwrap();
    }

    let mut total = 0.0f32;
    for qi in 0..50 {
        let predicted: Vec<i32> = index
            .search(dataset.query(qi), k)
            .into_iter()
            .map(|r| r.label.as_i32())
            .collect();
        total += recall_at_k(&predicted, &dataset.ground_truth[qi], k);
    }
    let recall = total / 50.0;
    assert!(recall >= 0.9, "recall@10 = {} below gate", recall);
}

// =============================================================================
// PQ arithmetic
// =============================================================================

#[test]
fn pq_compression_and_memory() {
    let dim = 128;
    let n = 500;
    let data = random_data(n, dim, 2001);
    let mut index = PqIndex::new(dim, n).unwrap();
    index.train(&data).unwrap();

    assert!((index.get_compression_ratio() - 64.0).abs() < 1e-6);

    let labels: Vec<Label> = (0..n as i32).map(Label::new).collect();
    let report = index.add_batch(&labels, &data);
    assert!(report.is_complete());

    // Codes: n * M bytes. Codebooks: M * 2^bits * (dim / M) * 4 bytes.
    let expected = n * 8 + 8 * 256 * (dim / 8) * 4;
    assert_eq!(index.compressed_memory_usage(), expected);
}

#[test]
fn pq_self_distance_equals_quantization_error() {
    let dim = 64;
    let m = 8;
    let data = random_data(600, dim, 2003);
    let pq = ProductQuantizer::train(&data, dim, m, 8, 25).unwrap();

    let sub_dim = dim / m;
    for i in (0..600).step_by(67) {
        let v = &data[i * dim..(i + 1) * dim];
        let codes = pq.encode(v);
        let table = pq.build_distance_table(v);
        let adc = pq.adc_distance(&table, &codes);

        let direct: f32 = (0..m)
            .map(|s| {
                let sub = &v[s * sub_dim..(s + 1) * sub_dim];
                forge_ann::distance::euclidean_distance_squared(
                    sub,
                    pq.centroid(s, codes[s] as usize),
                )
            })
            .sum();

        assert!((adc - direct).abs() < 1e-3, "adc={}, direct={}", adc, direct);
        assert!(adc >= 0.0);
    }
}

// =============================================================================
// IVF probing
// =============================================================================

#[test]
fn ivf_probe_monotonicity() {
    let dim = 64;
    let n = 5000;
    let n_lists = 32;
    let k = 10;
    let n_queries = 50;

    let mut dataset = Dataset::generate(n, n_queries, dim, 3001);
    dataset.compute_ground_truth(k);

    let config = IvfConfig {
        n_lists,
        ..IvfConfig::default()
    };
    let mut index = IvfIndex::with_config(dim, n, config).unwrap();
    index.train(&dataset.vectors).unwrap();
    for i in 0..n {
        index
            .add(Label::new(i as i32), dataset.vector(i))
            .unwrap();
    }

    let mut last_recall = 0.0f32;
    for probes in [1, 4, 16, 32] {
        index.set_n_probes(probes);
        let mut total = 0.0f32;
        for qi in 0..n_queries {
            let predicted: Vec<i32> = index
                .search(dataset.query(qi), k)
                .into_iter()
                .map(|r| r.label.as_i32())
                .collect();
            total += recall_at_k(&predicted, &dataset.ground_truth[qi], k);
        }
        let recall = total / n_queries as f32;
        assert!(
            recall >= last_recall,
            "recall dropped from {} to {} at {} probes",
            last_recall,
            recall,
            probes
        );
        last_recall = recall;
    }

    // Probing every list degenerates to exact search.
    assert!((last_recall - 1.0).abs() < 1e-6);
}

// =============================================================================
// Hybrid recall
// =============================================================================

#[test]
fn hnsw_pq_recall_against_hnsw_baseline() {
    let dim = 128;
    let n = 5000;
    let k = 5;
    let n_queries = 100;

    let dataset = Dataset::generate(n, n_queries, dim, 4001);

    let baseline = HnswIndex::new(dim, n).unwrap();
    for i in 0..n {
        baseline
            .add(Label::new(i as i32), dataset.vector(i))
            .unwrap();
    }

    let hybrid = HnswPqIndex::new(dim, n).unwrap();
    hybrid.train(&dataset.vectors).unwrap();
    for i in 0..n {
        hybrid
            .add(Label::new(i as i32), dataset.vector(i))
            .unwrap();
    }

    let mut total = 0.0f32;
    for qi in 0..n_queries {
        let truth: Vec<i32> = baseline
            .search(dataset.query(qi), k)
            .into_iter()
            .map(|r| r.label.as_i32())
            .collect();
        let predicted: Vec<i32> = hybrid
            .search(dataset.query(qi), k)
            .into_iter()
            .map(|r| r.label.as_i32())
            .collect();
        total += recall_at_k(&predicted, &truth, k);
    }
    let recall = total / n_queries as f32;
    assert!(recall >= 0.6, "hybrid recall@5 = {} below gate", recall);
}
