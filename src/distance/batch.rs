//! Batch distance kernels built on the norm-expansion identity.
//!
//! For squared Euclidean distance, `‖q − v‖² = ‖q‖² + ‖v‖² − 2·q·v`, so a
//! query-against-many computation reduces to one dot product per row plus
//! precomputed norms, and a many-against-many computation reduces to a
//! row-major matrix product `Q · Vᵀ`. Accumulated floating-point error can
//! push a true zero slightly negative; results in `[-1e-6, 0)` are clamped
//! to zero.

use super::simd;
use rayon::prelude::*;

/// Tolerance for clamping slightly-negative squared distances.
const NEGATIVE_EPSILON: f32 = -1e-6;

#[inline]
fn clamp_negative(d: f32) -> f32 {
    if d < 0.0 && d > NEGATIVE_EPSILON {
        0.0
    } else {
        d
    }
}

/// Squared norm of each row of a row-major matrix.
pub fn row_norms_squared(matrix: &[f32], rows: usize, cols: usize, norms: &mut [f32]) {
    debug_assert!(matrix.len() >= rows * cols);
    debug_assert!(norms.len() >= rows);

    for i in 0..rows {
        let row = &matrix[i * cols..(i + 1) * cols];
        norms[i] = simd::dot_product(row, row);
    }
}

/// Row-major matrix product `C = A · Bᵀ`.
///
/// `a` is `[m][k]`, `b` is `[n][k]`, `c` receives `[m][n]`. Rows of the
/// output are computed in parallel; each entry is a SIMD dot product.
pub fn matrix_multiply(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    debug_assert!(a.len() >= m * k);
    debug_assert!(b.len() >= n * k);
    debug_assert!(c.len() >= m * n);

    c[..m * n]
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, out_row)| {
            let a_row = &a[i * k..(i + 1) * k];
            for (j, out) in out_row.iter_mut().enumerate() {
                let b_row = &b[j * k..(j + 1) * k];
                *out = simd::dot_product(a_row, b_row);
            }
        });
}

/// Squared Euclidean distance from one query to `n` contiguous rows.
///
/// Uses the norm-expansion identity with a SIMD dot product per row.
pub fn batch_euclidean_distance_squared(query: &[f32], vectors: &[f32], n: usize, out: &mut [f32]) {
    let dim = query.len();
    debug_assert!(vectors.len() >= n * dim);
    debug_assert!(out.len() >= n);

    let query_norm = simd::dot_product(query, query);

    for i in 0..n {
        let row = &vectors[i * dim..(i + 1) * dim];
        let row_norm = simd::dot_product(row, row);
        let dot = simd::dot_product(query, row);
        out[i] = clamp_negative(query_norm + row_norm - 2.0 * dot);
    }
}

/// Same as [`batch_euclidean_distance_squared`] but reusing precomputed row
/// norms (the vector store keeps one per row).
pub fn batch_euclidean_distance_squared_with_norms(
    query: &[f32],
    vectors: &[f32],
    norms: &[f32],
    n: usize,
    out: &mut [f32],
) {
    let dim = query.len();
    debug_assert!(vectors.len() >= n * dim);
    debug_assert!(norms.len() >= n);
    debug_assert!(out.len() >= n);

    let query_norm = simd::dot_product(query, query);

    for i in 0..n {
        let row = &vectors[i * dim..(i + 1) * dim];
        let dot = simd::dot_product(query, row);
        out[i] = clamp_negative(query_norm + norms[i] - 2.0 * dot);
    }
}

/// Squared Euclidean distances for every (query, vector) pair.
///
/// `queries` is `[n_queries][dim]`, `vectors` is `[n_vectors][dim]`, and
/// `out` receives the `[n_queries][n_vectors]` distance matrix.
pub fn batch_euclidean_distance_multi_query(
    queries: &[f32],
    vectors: &[f32],
    n_queries: usize,
    n_vectors: usize,
    dim: usize,
    out: &mut [f32],
) {
    debug_assert!(out.len() >= n_queries * n_vectors);

    let mut query_norms = vec![0.0f32; n_queries];
    row_norms_squared(queries, n_queries, dim, &mut query_norms);

    let mut vector_norms = vec![0.0f32; n_vectors];
    row_norms_squared(vectors, n_vectors, dim, &mut vector_norms);

    matrix_multiply(queries, vectors, out, n_queries, n_vectors, dim);

    for i in 0..n_queries {
        let row = &mut out[i * n_vectors..(i + 1) * n_vectors];
        for (j, d) in row.iter_mut().enumerate() {
            *d = clamp_negative(query_norms[i] + vector_norms[j] - 2.0 * *d);
        }
    }
}
