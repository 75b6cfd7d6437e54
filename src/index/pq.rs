//! Flat Product Quantization index.
//!
//! Stores every vector as `M` byte codes and answers queries by scanning
//! all codes with asymmetric distance computation: one table build per
//! query, then `M` table lookups per candidate. No graph, no partitions;
//! compression and simplicity over speed at scale.

use crate::constants::workers;
use crate::error::{ForgeAnnError, Result};
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult, TrainableIndex};
use crate::metrics::IndexStatistics;
use crate::pq::ProductQuantizer;
use crate::store::VectorStore;
use crate::types::{Dimension, Label};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Configuration for [`PqIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqConfig {
    /// Number of subvectors; must divide the dimension.
    pub m: usize,
    /// Code width in bits (256 centroids at 8).
    pub n_bits: usize,
    /// k-means iteration cap for codebook training.
    pub max_iterations: usize,
}

impl Default for PqConfig {
    fn default() -> Self {
        Self {
            m: crate::constants::pq::DEFAULT_SUBVECTORS,
            n_bits: crate::constants::pq::DEFAULT_BITS,
            max_iterations: crate::constants::pq::DEFAULT_ITERATIONS,
        }
    }
}

/// PQ-compressed flat index.
pub struct PqIndex {
    config: PqConfig,
    store: VectorStore,
    quantizer: Option<ProductQuantizer>,
    /// Codes, `m` bytes per row, parallel to the store.
    codes: Vec<u8>,
    num_threads: usize,
}

impl PqIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, PqConfig::default())
    }

    /// Create an index with an explicit configuration.
    ///
    /// # Errors
    /// `InvalidParameter` for zero dimension/capacity or a dimension not
    /// divisible by `m`.
    pub fn with_config(dimension: usize, capacity: usize, config: PqConfig) -> Result<Self> {
        if !Dimension::new(dimension).is_divisible_by(config.m) {
            return Err(ForgeAnnError::invalid_parameter(format!(
                "dimension {} must be divisible by m {}",
                dimension, config.m
            )));
        }
        let store = VectorStore::new(dimension, capacity)?;
        Ok(Self {
            codes: Vec::with_capacity(capacity * config.m),
            config,
            store,
            quantizer: None,
            num_threads: workers::DEFAULT_NUM_THREADS,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &PqConfig {
        &self.config
    }

    /// Bound the fan-out of batch operations. Clamped to at least 1.
    pub fn set_num_threads(&mut self, n: usize) {
        self.num_threads = n.max(1);
    }

    /// Train the codebooks on `samples` (row-major).
    pub fn train(&mut self, samples: &[f32]) -> Result<()> {
        let pq = ProductQuantizer::train(
            samples,
            self.store.dim(),
            self.config.m,
            self.config.n_bits,
            self.config.max_iterations,
        )?;
        self.quantizer = Some(pq);
        Ok(())
    }

    /// True once `train` has completed.
    pub fn is_trained(&self) -> bool {
        self.quantizer.is_some()
    }

    /// Add a vector, returning its internal index.
    ///
    /// # Errors
    /// `NotTrained` before training; store errors propagate unchanged.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        let Some(pq) = self.quantizer.as_ref() else {
            return Err(ForgeAnnError::NotTrained);
        };

        let index = self.store.add(label, vector)?;
        let mut codes = vec![0u8; self.config.m];
        pq.encode_into(vector, &mut codes);
        self.codes.extend_from_slice(&codes);
        debug_assert_eq!(self.codes.len(), (index + 1) * self.config.m);
        Ok(index)
    }

    /// Insert a batch, collecting per-item failures instead of aborting.
    pub fn add_batch(&mut self, labels: &[Label], vectors: &[f32]) -> BatchAddReport {
        let dim = self.store.dim();
        let mut report = BatchAddReport::default();
        for (i, label) in labels.iter().enumerate() {
            let row = &vectors[i * dim..(i + 1) * dim];
            match self.add(*label, row) {
                Ok(_) => report.added += 1,
                Err(_) => report.failed.push(i),
            }
        }
        report
    }

    /// Search for the `k` nearest neighbors by full ADC scan.
    ///
    /// Distances are approximate: each is the sum of the per-subspace
    /// quantization-cell distances from the query. An untrained or empty
    /// index returns no results.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let Some(pq) = self.quantizer.as_ref() else {
            return Vec::new();
        };
        let size = self.store.len();
        if size == 0 || k == 0 {
            return Vec::new();
        }

        let table = pq.build_distance_table(query);

        let mut distances = vec![0.0f32; size];
        pq.adc_distance_batch(&table, &self.codes, size, &mut distances);

        let mut scored: Vec<(f32, usize)> = distances
            .into_iter()
            .enumerate()
            .map(|(i, d)| (d, i))
            .collect();

        let take = k.min(scored.len());
        scored.select_nth_unstable_by(take - 1, |a, b| {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        });
        scored.truncate(take);
        scored.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .map(|(d, i)| SearchResult::new(self.store.label(i), d))
            .collect()
    }

    /// Search many queries, partitioned across the worker pool.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Vec<Vec<SearchResult>> {
        let dim = self.store.dim();
        let n_queries = queries.len() / dim;
        if n_queries == 0 {
            return Vec::new();
        }

        let chunk = n_queries.div_ceil(self.num_threads);
        queries
            .par_chunks(chunk * dim)
            .flat_map_iter(|block| {
                block
                    .chunks_exact(dim)
                    .map(|q| self.search(q, k))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Compression ratio of the codes versus raw f32 rows.
    pub fn get_compression_ratio(&self) -> f32 {
        (self.store.dim() * std::mem::size_of::<f32>()) as f32 / self.config.m as f32
    }

    /// Estimated heap usage: store, codes, and codebooks.
    pub fn get_memory_usage(&self) -> usize {
        let codebooks = self
            .quantizer
            .as_ref()
            .map(|pq| pq.memory_usage())
            .unwrap_or(0);
        self.store.memory_usage() + self.codes.len() + codebooks
    }

    /// Heap bytes held by the compressed representation alone (codes plus
    /// codebooks), excluding the raw row storage.
    pub fn compressed_memory_usage(&self) -> usize {
        let codebooks = self
            .quantizer
            .as_ref()
            .map(|pq| pq.memory_usage())
            .unwrap_or(0);
        self.codes.len() + codebooks
    }

    /// Snapshot of the index state for monitoring.
    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            num_vectors: self.store.len(),
            capacity: self.store.capacity(),
            dimension: self.store.dim(),
            memory_bytes: self.get_memory_usage(),
            compression_ratio: self.get_compression_ratio(),
            num_subvectors: self.config.m,
            ..IndexStatistics::default()
        }
    }

    pub(crate) fn parts(&self) -> (&PqConfig, &VectorStore, Option<&ProductQuantizer>, &[u8]) {
        (&self.config, &self.store, self.quantizer.as_ref(), &self.codes)
    }

    pub(crate) fn restore(
        config: PqConfig,
        store: VectorStore,
        quantizer: Option<ProductQuantizer>,
        codes: Vec<u8>,
    ) -> Self {
        Self {
            config,
            store,
            quantizer,
            codes,
            num_threads: workers::DEFAULT_NUM_THREADS,
        }
    }
}

impl AnnIndex for PqIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        PqIndex::search(self, query, k)
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn dimension(&self) -> usize {
        self.store.dim()
    }

    fn capacity(&self) -> usize {
        self.store.capacity()
    }

    fn memory_usage(&self) -> usize {
        self.get_memory_usage()
    }
}

impl TrainableIndex for PqIndex {
    fn train(&mut self, samples: &[f32]) -> Result<()> {
        PqIndex::train(self, samples)
    }

    fn is_trained(&self) -> bool {
        PqIndex::is_trained(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_add_before_train_fails() {
        let mut index = PqIndex::new(32, 100).unwrap();
        let err = index.add(Label::new(0), &[0.0; 32]).unwrap_err();
        assert!(matches!(err, ForgeAnnError::NotTrained));
    }

    #[test]
    fn test_search_before_train_is_empty() {
        let index = PqIndex::new(32, 100).unwrap();
        assert!(index.search(&[0.0; 32], 5).is_empty());
    }

    #[test]
    fn test_dimension_must_divide() {
        assert!(PqIndex::new(30, 100).is_err());
    }

    #[test]
    fn test_search_returns_near_matches() {
        let dim = 32;
        let data = random_data(400, dim, 7);
        let mut index = PqIndex::new(dim, 400).unwrap();
        index.train(&data).unwrap();

        for i in 0..400 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        // A self-query may carry nonzero quantization error but must rank
        // its own cell at the front.
        let results = index.search(&data[..dim], 5);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].label, Label::new(0));
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_compression_ratio() {
        let index = PqIndex::new(128, 10).unwrap();
        assert!((index.get_compression_ratio() - 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_memory_accounting() {
        let dim = 128;
        let n = 100;
        let data = random_data(n, dim, 9);
        let mut index = PqIndex::new(dim, n).unwrap();
        index.train(&data).unwrap();
        let labels: Vec<Label> = (0..n as i32).map(Label::new).collect();
        let report = index.add_batch(&labels, &data);
        assert!(report.is_complete());

        // Codes: n * m bytes; codebooks: m * 256 * (dim / m) * 4 bytes.
        let expected = n * 8 + 8 * 256 * 16 * 4;
        assert_eq!(index.compressed_memory_usage(), expected);
    }

    #[test]
    fn test_batch_search_matches_single() {
        let dim = 16;
        let data = random_data(150, dim, 21);
        let mut index = PqIndex::new(dim, 150).unwrap();
        index.train(&data).unwrap();
        for i in 0..150 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let queries = random_data(10, dim, 22);
        let batch = index.search_batch(&queries, 5);
        assert_eq!(batch.len(), 10);
        for (i, results) in batch.iter().enumerate() {
            let single = index.search(&queries[i * dim..(i + 1) * dim], 5);
            assert_eq!(results.len(), single.len());
            for (a, b) in results.iter().zip(single.iter()) {
                assert_eq!(a.label, b.label);
            }
        }
    }
}
