//! Correctness tests verifying SIMD implementations match scalar baselines.

use forge_ann::distance::{scalar, simd};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_pair(dim: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let b = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    (a, b)
}

#[test]
fn test_simd_squared_matches_scalar() {
    // Edge dimensions around the 8-lane and 4-lane boundaries
    for dim in [1, 3, 7, 8, 9, 15, 16, 17, 64, 128, 256] {
        let (a, b) = random_pair(dim, dim as u64);

        let scalar_result = scalar::euclidean_distance_squared(&a, &b);
        let simd_result = simd::euclidean_distance_squared(&a, &b);
        let diff = (scalar_result - simd_result).abs();

        assert!(
            diff < 1e-4,
            "Squared Euclidean mismatch at dim {}: scalar={}, simd={}, diff={}",
            dim,
            scalar_result,
            simd_result,
            diff
        );
    }
}

#[test]
fn test_dot_product_simd_matches_scalar() {
    for dim in [1, 3, 7, 8, 9, 15, 16, 17, 64, 128, 256] {
        let (a, b) = random_pair(dim, 100 + dim as u64);

        let scalar_result = scalar::dot_product(&a, &b);
        let simd_result = simd::dot_product(&a, &b);
        let diff = (scalar_result - simd_result).abs();

        assert!(
            diff < 1e-4,
            "Dot product mismatch at dim {}: scalar={}, simd={}, diff={}",
            dim,
            scalar_result,
            simd_result,
            diff
        );
    }
}

#[test]
fn test_cosine_simd_matches_scalar() {
    for dim in [4, 12, 32, 96, 200] {
        let (a, b) = random_pair(dim, 200 + dim as u64);

        let scalar_result = scalar::cosine_distance(&a, &b);
        let simd_result = simd::cosine_distance(&a, &b);
        assert!(
            (scalar_result - simd_result).abs() < 1e-4,
            "Cosine mismatch at dim {}",
            dim
        );
    }
}

#[test]
fn test_euclidean_properties() {
    let (v1, v2) = random_pair(128, 301);

    // Distance to self is zero
    let self_distance = simd::euclidean_distance_squared(&v1, &v1);
    assert!(
        self_distance < 1e-6,
        "Distance to self should be 0, got {}",
        self_distance
    );

    // Symmetry: d(a,b) == d(b,a)
    let d1 = simd::euclidean_distance_squared(&v1, &v2);
    let d2 = simd::euclidean_distance_squared(&v2, &v1);
    assert!(
        (d1 - d2).abs() < 1e-6,
        "Distance should be symmetric: {} vs {}",
        d1,
        d2
    );

    // Non-negativity
    assert!(d1 >= 0.0);
}

#[test]
fn test_dot_product_properties() {
    let (v1, v2) = random_pair(128, 303);

    // Commutativity
    let d1 = simd::dot_product(&v1, &v2);
    let d2 = simd::dot_product(&v2, &v1);
    assert!((d1 - d2).abs() < 1e-6);

    // Self dot product is the squared norm, never negative
    let self_dot = simd::dot_product(&v1, &v1);
    assert!(self_dot >= 0.0);
}

#[test]
fn test_known_values() {
    let a = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let b = vec![3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    let dist_sq = simd::euclidean_distance_squared(&a, &b);
    assert!(
        (dist_sq - 25.0).abs() < 1e-5,
        "Expected squared distance 25.0, got {}",
        dist_sq
    );

    let e1 = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let e2 = vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    let dot = simd::dot_product(&e1, &e2);
    assert!(dot.abs() < 1e-6);

    // Orthogonal unit vectors: squared distance 2, cosine distance 1
    assert!((simd::euclidean_distance_squared(&e1, &e2) - 2.0).abs() < 1e-5);
    assert!((simd::cosine_distance(&e1, &e2) - 1.0).abs() < 1e-5);
}

#[test]
fn test_batch_kernel_matches_pairwise() {
    let dim = 96;
    let n = 33;
    let mut rng = StdRng::seed_from_u64(305);
    let query: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let vectors: Vec<f32> = (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut out = vec![0.0f32; n];
    (simd::kernels().batch_euclidean_sq)(&query, &vectors, n, &mut out);

    for i in 0..n {
        let row = &vectors[i * dim..(i + 1) * dim];
        let exact = scalar::euclidean_distance_squared(&query, row);
        assert!(
            (out[i] - exact).abs() / exact.max(1.0) < 1e-4,
            "row {}: batch={}, exact={}",
            i,
            out[i],
            exact
        );
    }
}
