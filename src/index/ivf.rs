//! Inverted File (IVF) index.
//!
//! A coarse k-means quantizer partitions the space into `n_lists` cells,
//! each holding a posting list of internal indices. A query ranks all
//! centroids, probes the `n_probes` closest cells, and exactly re-ranks
//! the union of their posting lists. More probes trade speed for recall;
//! probing every cell degenerates to exact search.

use crate::constants::{cache::PREFETCH_DISTANCE, ivf as defaults, workers};
use crate::error::{ForgeAnnError, Result};
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult, TrainableIndex};
use crate::kmeans::KMeans;
use crate::metrics::IndexStatistics;
use crate::store::VectorStore;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Configuration for [`IvfIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfConfig {
    /// Number of coarse cells (posting lists).
    pub n_lists: usize,
    /// Number of cells probed per query.
    pub n_probes: usize,
    /// k-means iteration cap for the coarse quantizer.
    pub max_iterations: usize,
}

impl Default for IvfConfig {
    fn default() -> Self {
        Self {
            n_lists: defaults::DEFAULT_LISTS,
            n_probes: defaults::DEFAULT_PROBES,
            max_iterations: defaults::DEFAULT_ITERATIONS,
        }
    }
}

/// Inverted-file index with exact re-ranking inside probed cells.
pub struct IvfIndex {
    config: IvfConfig,
    store: VectorStore,
    quantizer: Option<KMeans>,
    /// One posting list of internal indices per cell. Every stored row
    /// appears in exactly one list: the cell whose centroid is nearest.
    posting_lists: Vec<Vec<u32>>,
    num_threads: usize,
}

impl IvfIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, IvfConfig::default())
    }

    /// Create an index with an explicit configuration.
    pub fn with_config(dimension: usize, capacity: usize, config: IvfConfig) -> Result<Self> {
        if config.n_lists == 0 {
            return Err(ForgeAnnError::invalid_parameter("n_lists must be positive"));
        }
        let store = VectorStore::new(dimension, capacity)?;
        Ok(Self {
            config,
            store,
            quantizer: None,
            posting_lists: Vec::new(),
            num_threads: workers::DEFAULT_NUM_THREADS,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &IvfConfig {
        &self.config
    }

    /// Adjust the number of probed cells; clamped to `[1, n_lists]`.
    pub fn set_n_probes(&mut self, n_probes: usize) {
        self.config.n_probes = n_probes.clamp(1, self.config.n_lists);
    }

    /// Bound the fan-out of batch operations. Clamped to at least 1.
    pub fn set_num_threads(&mut self, n: usize) {
        self.num_threads = n.max(1);
    }

    /// Train the coarse quantizer on `samples` (row-major).
    ///
    /// # Errors
    /// `EmptyVectorSet` without samples; `DimensionMismatch` for a ragged
    /// buffer.
    pub fn train(&mut self, samples: &[f32]) -> Result<()> {
        let dim = self.store.dim();
        if samples.is_empty() {
            return Err(ForgeAnnError::EmptyVectorSet);
        }
        if samples.len() % dim != 0 {
            return Err(ForgeAnnError::dimension_mismatch(dim, samples.len() % dim));
        }

        let mut kmeans = KMeans::new(self.config.n_lists, dim, self.config.max_iterations);
        let mut rng = StdRng::seed_from_u64(defaults::TRAIN_SEED);
        kmeans.fit(samples, &mut rng);

        self.posting_lists = vec![Vec::new(); self.config.n_lists];
        self.quantizer = Some(kmeans);
        Ok(())
    }

    /// True once `train` has completed.
    pub fn is_trained(&self) -> bool {
        self.quantizer.is_some()
    }

    /// Add a vector to the posting list of its nearest cell.
    ///
    /// # Errors
    /// `NotTrained` before training; store errors propagate unchanged.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        let Some(kmeans) = self.quantizer.as_ref() else {
            return Err(ForgeAnnError::NotTrained);
        };
        if vector.len() != self.store.dim() {
            return Err(ForgeAnnError::dimension_mismatch(
                self.store.dim(),
                vector.len(),
            ));
        }
        let cell = kmeans.assign(vector);
        let index = self.store.add(label, vector)?;
        self.posting_lists[cell].push(index as u32);
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

    /// Search the `n_probes` nearest cells for the `k` nearest neighbors.
    ///
    /// Candidates carry exact distances; ties break by internal index. An
    /// untrained or empty index returns no results.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let Some(kmeans) = self.quantizer.as_ref() else {
            return Vec::new();
        };
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        let probes = self.config.n_probes.min(self.config.n_lists);
        let cells = kmeans.nearest_centroids(query, probes);

        let mut candidates: Vec<(f32, u32)> = Vec::with_capacity(k * 10);
        for (cell, _) in cells {
            let list = &self.posting_lists[cell];
            for (pos, &i) in list.iter().enumerate() {
                if pos + PREFETCH_DISTANCE < list.len() {
                    self.store.prefetch(list[pos + PREFETCH_DISTANCE] as usize);
                }
                if let Some(row) = self.store.get(i as usize) {
                    let d = crate::distance::euclidean_distance_squared(query, row);
                    candidates.push((d, i));
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        candidates.truncate(k);

        candidates
            .into_iter()
            .map(|(d, i)| SearchResult::new(self.store.label(i as usize), d))
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

    /// Estimated heap usage: store, posting lists, and centroids.
    pub fn get_memory_usage(&self) -> usize {
        let lists: usize = self
            .posting_lists
            .iter()
            .map(|l| l.capacity() * std::mem::size_of::<u32>())
            .sum();
        let centroids = self
            .quantizer
            .as_ref()
            .map(|q| q.centroids.len() * std::mem::size_of::<f32>())
            .unwrap_or(0);
        self.store.memory_usage() + lists + centroids
    }

    /// Snapshot of the index state for monitoring, including posting-list
    /// occupancy.
    pub fn statistics(&self) -> IndexStatistics {
        let mut stats = IndexStatistics {
            num_vectors: self.store.len(),
            capacity: self.store.capacity(),
            dimension: self.store.dim(),
            memory_bytes: self.get_memory_usage(),
            num_partitions: self.posting_lists.len(),
            n_probes: self.config.n_probes,
            ..IndexStatistics::default()
        };

        if !self.posting_lists.is_empty() {
            let sizes: Vec<usize> = self.posting_lists.iter().map(Vec::len).collect();
            let min = *sizes.iter().min().unwrap();
            let max = *sizes.iter().max().unwrap();
            let mean = sizes.iter().sum::<usize>() as f32 / sizes.len() as f32;
            let var = sizes
                .iter()
                .map(|&s| {
                    let d = s as f32 - mean;
                    d * d
                })
                .sum::<f32>()
                / sizes.len() as f32;
            stats.partition_size_min = min;
            stats.partition_size_max = max;
            stats.partition_size_mean = mean;
            stats.partition_size_std = var.sqrt();
        }

        stats
    }
}

impl AnnIndex for IvfIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        IvfIndex::search(self, query, k)
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

impl TrainableIndex for IvfIndex {
    fn train(&mut self, samples: &[f32]) -> Result<()> {
        IvfIndex::train(self, samples)
    }

    fn is_trained(&self) -> bool {
        IvfIndex::is_trained(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn build_index(n: usize, dim: usize, n_lists: usize, seed: u64) -> (IvfIndex, Vec<f32>) {
        let data = random_data(n, dim, seed);
        let config = IvfConfig {
            n_lists,
            ..IvfConfig::default()
        };
        let mut index = IvfIndex::with_config(dim, n, config).unwrap();
        index.train(&data).unwrap();
        for i in 0..n {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }
        (index, data)
    }

    #[test]
    fn test_add_before_train_fails() {
        let mut index = IvfIndex::new(16, 100).unwrap();
        let err = index.add(Label::new(0), &[0.0; 16]).unwrap_err();
        assert!(matches!(err, ForgeAnnError::NotTrained));
    }

    #[test]
    fn test_every_row_in_exactly_one_list() {
        let (index, _) = build_index(500, 16, 8, 31);
        let mut seen = vec![0usize; 500];
        for list in &index.posting_lists {
            for &i in list {
                seen[i as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_self_query_with_full_probing() {
        let (mut index, data) = build_index(300, 16, 8, 33);
        index.set_n_probes(8);

        for i in (0..300).step_by(41) {
            let query = &data[i * 16..(i + 1) * 16];
            let results = index.search(query, 1);
            assert_eq!(results[0].label, Label::new(i as i32));
            assert!(results[0].distance < 1e-5);
        }
    }

    #[test]
    fn test_results_sorted() {
        let (index, data) = build_index(400, 32, 10, 35);
        let results = index.search(&data[..32], 10);
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_n_probes_clamped() {
        let (mut index, _) = build_index(100, 8, 5, 37);
        index.set_n_probes(100);
        assert_eq!(index.config().n_probes, 5);
        index.set_n_probes(0);
        assert_eq!(index.config().n_probes, 1);
    }

    #[test]
    fn test_statistics_partitions() {
        let (index, _) = build_index(200, 8, 4, 39);
        let stats = index.statistics();
        assert_eq!(stats.num_vectors, 200);
        assert_eq!(stats.num_partitions, 4);
        assert!(stats.partition_size_min <= stats.partition_size_max);
        assert!((stats.partition_size_mean - 50.0).abs() < 1e-3);
    }
}
