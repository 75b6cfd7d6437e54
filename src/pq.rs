//! Product Quantization codec for vector compression.
//!
//! Product Quantization (PQ) compresses vectors by splitting them into `M`
//! subvectors and quantizing each subspace independently against its own
//! codebook of `2^B` centroids. A D-dimensional f32 vector becomes `M`
//! small codes, a `D·4 / M` compression at 8 bits per code.
//!
//! Key concepts:
//! - Train one codebook per subspace with seeded k-means (k-means++ init)
//! - Encode each vector as the per-subspace nearest-centroid indices
//! - Asymmetric distance (ADC): the query stays in floats; a precomputed
//!   query-to-centroid table turns each candidate's distance into `M`
//!   table lookups
//!
//! Encoding is deterministic given the codebook. Approximation error is
//! the sum of per-subspace quantization errors and is unbounded in the
//! worst case.

use crate::constants::pq::TRAIN_SEED_BASE;
use crate::distance::euclidean_distance_squared;
use crate::error::{ForgeAnnError, Result};
use crate::types::Dimension;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::kmeans::KMeans;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Product quantizer: `M` codebooks of `2^B` centroids each.
pub struct ProductQuantizer {
    /// Flat codebooks: centroid `(m, c)` spans
    /// `[(m * n_centroids + c) * sub_dim, ...)`.
    codebooks: Vec<f32>,
    n_subvectors: usize,
    sub_dim: usize,
    dim: usize,
    n_centroids: usize,
}

impl ProductQuantizer {
    /// Train a product quantizer on `samples` (row-major, dimension `dim`).
    ///
    /// Each subspace trains independently (in parallel) with RNG seed
    /// `TRAIN_SEED_BASE + subspace_index`, so results are reproducible.
    ///
    /// # Errors
    /// `InvalidParameter` if `dim` is not divisible by `n_subvectors` or
    /// `n_bits` does not fit a byte code; `EmptyVectorSet` without samples.
    pub fn train(
        samples: &[f32],
        dim: usize,
        n_subvectors: usize,
        n_bits: usize,
        max_iterations: usize,
    ) -> Result<Self> {
        if !Dimension::new(dim).is_divisible_by(n_subvectors) {
            return Err(ForgeAnnError::invalid_parameter(format!(
                "dimension {} must be divisible by n_subvectors {}",
                dim, n_subvectors
            )));
        }
        if n_bits == 0 || n_bits > 8 {
            return Err(ForgeAnnError::invalid_parameter(
                "n_bits must be in 1..=8 for byte codes",
            ));
        }
        if samples.is_empty() || samples.len() % dim != 0 {
            return Err(ForgeAnnError::EmptyVectorSet);
        }

        let n_samples = samples.len() / dim;
        let sub_dim = dim / n_subvectors;
        let n_centroids = 1usize << n_bits;

        // Train codebooks in parallel, one subspace each
        let per_subspace: Vec<Vec<f32>> = (0..n_subvectors)
            .into_par_iter()
            .map(|m| {
                let mut sub_data = vec![0.0f32; n_samples * sub_dim];
                for i in 0..n_samples {
                    let src = i * dim + m * sub_dim;
                    sub_data[i * sub_dim..(i + 1) * sub_dim]
                        .copy_from_slice(&samples[src..src + sub_dim]);
                }

                let mut kmeans = KMeans::new(n_centroids, sub_dim, max_iterations);
                let mut rng = StdRng::seed_from_u64(TRAIN_SEED_BASE + m as u64);
                kmeans.fit(&sub_data, &mut rng);
                kmeans.centroids
            })
            .collect();

        let mut codebooks = Vec::with_capacity(n_subvectors * n_centroids * sub_dim);
        for book in per_subspace {
            codebooks.extend_from_slice(&book);
        }

        Ok(Self {
            codebooks,
            n_subvectors,
            sub_dim,
            dim,
            n_centroids,
        })
    }

    /// Number of subvectors (M).
    #[inline]
    pub fn n_subvectors(&self) -> usize {
        self.n_subvectors
    }

    /// Dimension of each subvector.
    #[inline]
    pub fn sub_dim(&self) -> usize {
        self.sub_dim
    }

    /// Original vector dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Centroids per subspace (`2^B`).
    #[inline]
    pub fn n_centroids(&self) -> usize {
        self.n_centroids
    }

    /// The flat codebook buffer.
    pub(crate) fn codebooks(&self) -> &[f32] {
        &self.codebooks
    }

    /// Reassemble a quantizer from a snapshot.
    pub(crate) fn from_parts(
        codebooks: Vec<f32>,
        dim: usize,
        n_subvectors: usize,
        n_centroids: usize,
    ) -> Result<Self> {
        if n_subvectors == 0 || dim % n_subvectors != 0 {
            return Err(ForgeAnnError::invalid_parameter(
                "snapshot dimension not divisible by subvector count",
            ));
        }
        let sub_dim = dim / n_subvectors;
        if codebooks.len() != n_subvectors * n_centroids * sub_dim {
            return Err(ForgeAnnError::invalid_format(
                "codebook buffer disagrees with snapshot geometry",
            ));
        }
        Ok(Self {
            codebooks,
            n_subvectors,
            sub_dim,
            dim,
            n_centroids,
        })
    }

    /// Centroid `(m, c)` as a slice.
    #[inline]
    pub fn centroid(&self, m: usize, c: usize) -> &[f32] {
        let start = (m * self.n_centroids + c) * self.sub_dim;
        &self.codebooks[start..start + self.sub_dim]
    }

    /// Encode a vector into `M` codes, one nearest-centroid index per
    /// subspace.
    ///
    /// # Panics
    /// Panics if `vector.len() != dim` (codec misuse, not a data error).
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        assert_eq!(vector.len(), self.dim, "Vector dimensions must match");

        (0..self.n_subvectors)
            .map(|m| {
                let sub = &vector[m * self.sub_dim..(m + 1) * self.sub_dim];
                self.nearest_centroid(m, sub) as u8
            })
            .collect()
    }

    /// Encode into a caller-provided code buffer.
    pub fn encode_into(&self, vector: &[f32], codes: &mut [u8]) {
        assert_eq!(vector.len(), self.dim, "Vector dimensions must match");
        assert_eq!(codes.len(), self.n_subvectors, "Code buffer length must be M");

        for (m, code) in codes.iter_mut().enumerate() {
            let sub = &vector[m * self.sub_dim..(m + 1) * self.sub_dim];
            *code = self.nearest_centroid(m, sub) as u8;
        }
    }

    fn nearest_centroid(&self, m: usize, sub: &[f32]) -> usize {
        let mut nearest = 0;
        let mut min_dist = f32::MAX;
        for c in 0..self.n_centroids {
            let d = euclidean_distance_squared(sub, self.centroid(m, c));
            if d < min_dist {
                min_dist = d;
                nearest = c;
            }
        }
        nearest
    }

    /// Build the flat query distance table for asymmetric distance
    /// computation.
    ///
    /// Layout: `table[m * n_centroids + c]` = squared distance from query
    /// subvector `m` to centroid `c` of codebook `m`. Any encoded vector's
    /// approximate distance is then the sum of `M` lookups.
    pub fn build_distance_table(&self, query: &[f32]) -> Vec<f32> {
        assert_eq!(query.len(), self.dim, "Query dimensions must match");

        let mut table = Vec::with_capacity(self.n_subvectors * self.n_centroids);
        for m in 0..self.n_subvectors {
            let sub = &query[m * self.sub_dim..(m + 1) * self.sub_dim];
            for c in 0..self.n_centroids {
                table.push(euclidean_distance_squared(sub, self.centroid(m, c)));
            }
        }
        table
    }

    /// ADC distance of one code row through a precomputed table.
    #[inline]
    pub fn adc_distance(&self, table: &[f32], codes: &[u8]) -> f32 {
        adc_distance_dispatch(table, codes, self.n_centroids)
    }

    /// ADC distances for `n` contiguous code rows.
    pub fn adc_distance_batch(&self, table: &[f32], codes: &[u8], n: usize, out: &mut [f32]) {
        debug_assert!(codes.len() >= n * self.n_subvectors);
        debug_assert!(out.len() >= n);

        let m = self.n_subvectors;
        let mut i = 0;
        // Eight rows per block so the table stays hot across rows
        while i + 8 <= n {
            for j in 0..8 {
                let row = &codes[(i + j) * m..(i + j + 1) * m];
                out[i + j] = adc_distance_dispatch(table, row, self.n_centroids);
            }
            i += 8;
        }
        while i < n {
            let row = &codes[i * m..(i + 1) * m];
            out[i] = adc_distance_dispatch(table, row, self.n_centroids);
            i += 1;
        }
    }

    /// Compression ratio versus raw f32 storage: `D·4 / M`.
    pub fn compression_ratio(&self) -> f32 {
        (self.dim * std::mem::size_of::<f32>()) as f32 / self.n_subvectors as f32
    }

    /// Heap bytes held by the codebooks.
    pub fn memory_usage(&self) -> usize {
        self.codebooks.len() * std::mem::size_of::<f32>()
    }
}

// =============================================================================
// ADC kernels
// =============================================================================

/// Dispatch to the fastest available ADC implementation.
#[inline]
pub fn adc_distance_dispatch(table: &[f32], codes: &[u8], n_centroids: usize) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        // The gather kernel is specialized for the 256-centroid layout
        if n_centroids == 256 && codes.len() >= 8 && is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability was just verified.
            return unsafe { adc_distance_avx2(table, codes) };
        }
    }
    adc_distance_scalar(table, codes, n_centroids)
}

/// Scalar ADC: sum one table entry per subspace, four lookups per step.
#[inline]
pub fn adc_distance_scalar(table: &[f32], codes: &[u8], n_centroids: usize) -> f32 {
    let n = codes.len();
    debug_assert!(table.len() >= n * n_centroids);

    let mut sum = 0.0f32;
    let mut m = 0;
    while m + 4 <= n {
        sum += table[m * n_centroids + codes[m] as usize]
            + table[(m + 1) * n_centroids + codes[m + 1] as usize]
            + table[(m + 2) * n_centroids + codes[m + 2] as usize]
            + table[(m + 3) * n_centroids + codes[m + 3] as usize];
        m += 4;
    }
    while m < n {
        sum += table[m * n_centroids + codes[m] as usize];
        m += 1;
    }
    sum
}

/// AVX2 gather ADC for the 256-centroid table layout.
///
/// Gathers eight table entries per iteration via `_mm256_i32gather_ps`,
/// with indices `m * 256 + code[m]`.
///
/// # Safety
/// - Requires the AVX2 CPU feature.
/// - `table` must hold `codes.len() * 256` floats.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn adc_distance_avx2(table: &[f32], codes: &[u8]) -> f32 {
    let n = codes.len();
    debug_assert!(table.len() >= n * 256);

    let mut sum = _mm256_setzero_ps();
    let mut m = 0;

    while m + 8 <= n {
        let idx0 = (m * 256 + *codes.get_unchecked(m) as usize) as i32;
        let idx1 = ((m + 1) * 256 + *codes.get_unchecked(m + 1) as usize) as i32;
        let idx2 = ((m + 2) * 256 + *codes.get_unchecked(m + 2) as usize) as i32;
        let idx3 = ((m + 3) * 256 + *codes.get_unchecked(m + 3) as usize) as i32;
        let idx4 = ((m + 4) * 256 + *codes.get_unchecked(m + 4) as usize) as i32;
        let idx5 = ((m + 5) * 256 + *codes.get_unchecked(m + 5) as usize) as i32;
        let idx6 = ((m + 6) * 256 + *codes.get_unchecked(m + 6) as usize) as i32;
        let idx7 = ((m + 7) * 256 + *codes.get_unchecked(m + 7) as usize) as i32;

        let indices = _mm256_set_epi32(idx7, idx6, idx5, idx4, idx3, idx2, idx1, idx0);

        // Scale = 4: gathering f32 entries
        let values = _mm256_i32gather_ps::<4>(table.as_ptr(), indices);
        sum = _mm256_add_ps(sum, values);

        m += 8;
    }

    let sum_array: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = sum_array.iter().sum();

    while m < n {
        total += *table.get_unchecked(m * 256 + *codes.get_unchecked(m) as usize);
        m += 1;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_samples(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_train_validates_arguments() {
        let samples = random_samples(64, 16, 0);
        assert!(ProductQuantizer::train(&samples, 16, 5, 8, 5).is_err());
        assert!(ProductQuantizer::train(&samples, 16, 0, 8, 5).is_err());
        assert!(ProductQuantizer::train(&samples, 16, 4, 0, 5).is_err());
        assert!(ProductQuantizer::train(&samples, 16, 4, 9, 5).is_err());
        assert!(ProductQuantizer::train(&[], 16, 4, 8, 5).is_err());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let dim = 32;
        let samples = random_samples(500, dim, 1);
        let pq = ProductQuantizer::train(&samples, dim, 4, 4, 10).unwrap();

        let v = &samples[..dim];
        assert_eq!(pq.encode(v), pq.encode(v));
    }

    #[test]
    fn test_training_is_reproducible() {
        let dim = 32;
        let samples = random_samples(300, dim, 2);
        let a = ProductQuantizer::train(&samples, dim, 4, 4, 10).unwrap();
        let b = ProductQuantizer::train(&samples, dim, 4, 4, 10).unwrap();
        assert_eq!(a.codebooks, b.codebooks);
    }

    #[test]
    fn test_adc_self_distance_is_quantization_error() {
        let dim = 32;
        let m = 4;
        let samples = random_samples(400, dim, 3);
        let pq = ProductQuantizer::train(&samples, dim, m, 4, 15).unwrap();

        let v = &samples[5 * dim..6 * dim];
        let codes = pq.encode(v);
        let table = pq.build_distance_table(v);
        let adc = pq.adc_distance(&table, &codes);

        // The table-based distance must equal the sum of per-subspace
        // quantization errors computed directly.
        let sub_dim = dim / m;
        let direct: f32 = (0..m)
            .map(|s| {
                let sub = &v[s * sub_dim..(s + 1) * sub_dim];
                euclidean_distance_squared(sub, pq.centroid(s, codes[s] as usize))
            })
            .sum();

        assert!((adc - direct).abs() < 1e-4, "adc={}, direct={}", adc, direct);
        assert!(adc >= 0.0);
    }

    #[test]
    fn test_adc_scalar_matches_dispatch() {
        let dim = 128;
        let samples = random_samples(600, dim, 4);
        let pq = ProductQuantizer::train(&samples, dim, 8, 8, 10).unwrap();

        let query = &samples[dim..2 * dim];
        let table = pq.build_distance_table(query);

        for i in 0..10 {
            let codes = pq.encode(&samples[i * dim..(i + 1) * dim]);
            let scalar = adc_distance_scalar(&table, &codes, pq.n_centroids());
            let dispatched = pq.adc_distance(&table, &codes);
            assert!(
                (scalar - dispatched).abs() < 1e-4,
                "row {}: scalar={}, dispatched={}",
                i,
                scalar,
                dispatched
            );
        }
    }

    #[test]
    fn test_adc_batch_matches_single() {
        let dim = 64;
        let n = 20;
        let samples = random_samples(500, dim, 5);
        let pq = ProductQuantizer::train(&samples, dim, 8, 8, 10).unwrap();

        let mut codes = Vec::new();
        for i in 0..n {
            codes.extend_from_slice(&pq.encode(&samples[i * dim..(i + 1) * dim]));
        }

        let query = &samples[30 * dim..31 * dim];
        let table = pq.build_distance_table(query);

        let mut batch = vec![0.0; n];
        pq.adc_distance_batch(&table, &codes, n, &mut batch);

        for i in 0..n {
            let row = &codes[i * 8..(i + 1) * 8];
            let single = pq.adc_distance(&table, row);
            assert!((batch[i] - single).abs() < 1e-5);
        }
    }

    #[test]
    fn test_compression_ratio() {
        let dim = 128;
        let samples = random_samples(300, dim, 6);
        let pq = ProductQuantizer::train(&samples, dim, 8, 8, 5).unwrap();
        assert!((pq.compression_ratio() - 64.0).abs() < 1e-6);
        assert_eq!(pq.memory_usage(), 8 * 256 * 16 * 4);
    }
}
