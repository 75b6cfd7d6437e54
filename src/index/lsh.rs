//! Locality-sensitive hashing index with random hyperplane signatures.
//!
//! Each of `T` tables hashes a vector to a `K`-bit signature: one bit per
//! random hyperplane, set when the biased projection is positive. Vectors
//! sharing a signature land in the same bucket. A query unions the
//! matching buckets across tables and exactly re-ranks the candidates.

use crate::constants::lsh as defaults;
use crate::error::{ForgeAnnError, Result};
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult};
use crate::store::VectorStore;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Configuration for [`LshIndex`].
#[derive(Debug, Clone)]
pub struct LshConfig {
    /// Number of hash tables.
    pub num_hash_tables: usize,
    /// Number of hyperplane hashes (signature bits) per table.
    pub num_hash_functions: usize,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            num_hash_tables: defaults::DEFAULT_TABLES,
            num_hash_functions: defaults::DEFAULT_HASHES,
        }
    }
}

/// One hash table: its hyperplanes, biases, and signature buckets.
struct HashTable {
    /// `num_hash_functions` hyperplanes, row-major `[h][dim]`.
    hyperplanes: Vec<f32>,
    /// One bias per hyperplane.
    biases: Vec<f32>,
    /// Internal indices bucketed by signature.
    buckets: HashMap<u64, Vec<u32>>,
}

/// LSH index over random hyperplane signatures.
pub struct LshIndex {
    config: LshConfig,
    store: VectorStore,
    tables: Vec<HashTable>,
}

impl LshIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, LshConfig::default())
    }

    /// Create an index with an explicit configuration.
    ///
    /// Hyperplane weights draw from N(0,1) and biases from a 0.5-scaled
    /// N(0,1) at construction time.
    ///
    /// # Errors
    /// `InvalidParameter` for zero tables, zero hashes, or more than 64
    /// signature bits (signatures are packed into a `u64` bucket key).
    pub fn with_config(dimension: usize, capacity: usize, config: LshConfig) -> Result<Self> {
        if config.num_hash_tables == 0 {
            return Err(ForgeAnnError::invalid_parameter(
                "num_hash_tables must be positive",
            ));
        }
        if config.num_hash_functions == 0 || config.num_hash_functions > 64 {
            return Err(ForgeAnnError::invalid_parameter(
                "num_hash_functions must be in 1..=64",
            ));
        }

        let store = VectorStore::new(dimension, capacity)?;
        let mut rng = StdRng::from_entropy();

        let tables = (0..config.num_hash_tables)
            .map(|_| {
                let hyperplanes: Vec<f32> = (0..config.num_hash_functions * dimension)
                    .map(|_| rng.sample(StandardNormal))
                    .collect();
                let biases: Vec<f32> = (0..config.num_hash_functions)
                    .map(|_| {
                        let b: f32 = rng.sample(StandardNormal);
                        b * 0.5
                    })
                    .collect();
                HashTable {
                    hyperplanes,
                    biases,
                    buckets: HashMap::new(),
                }
            })
            .collect();

        Ok(Self {
            config,
            store,
            tables,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    /// Signature of `vector` in table `t`: one bit per hyperplane.
    fn signature(&self, vector: &[f32], t: usize) -> u64 {
        let dim = self.store.dim();
        let table = &self.tables[t];

        let mut sig = 0u64;
        for h in 0..self.config.num_hash_functions {
            let plane = &table.hyperplanes[h * dim..(h + 1) * dim];
            let dot = crate::distance::dot_product(vector, plane);
            sig <<= 1;
            if dot + table.biases[h] > 0.0 {
                sig |= 1;
            }
        }
        sig
    }

    /// Add a vector to its signature bucket in every table.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        let index = self.store.add(label, vector)?;
        for t in 0..self.tables.len() {
            let sig = self.signature(vector, t);
            self.tables[t]
                .buckets
                .entry(sig)
                .or_default()
                .push(index as u32);
        }
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

    /// Search the matching buckets for the `k` nearest neighbors.
    ///
    /// Only vectors whose signature collides with the query's in at least
    /// one table are candidates; each is exactly re-ranked.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        if self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<u32> = Vec::new();
        for t in 0..self.tables.len() {
            let sig = self.signature(query, t);
            if let Some(bucket) = self.tables[t].buckets.get(&sig) {
                candidates.extend_from_slice(bucket);
            }
        }

        candidates.sort_unstable();
        candidates.dedup();

        let mut scored: Vec<(f32, u32)> = candidates
            .into_iter()
            .filter_map(|i| {
                self.store.get(i as usize).map(|row| {
                    (
                        crate::distance::euclidean_distance_squared(query, row),
                        i,
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(d, i)| SearchResult::new(self.store.label(i as usize), d))
            .collect()
    }

    /// Estimated heap usage: store, hyperplanes, and bucket tables.
    pub fn get_memory_usage(&self) -> usize {
        let tables: usize = self
            .tables
            .iter()
            .map(|t| {
                t.hyperplanes.len() * std::mem::size_of::<f32>()
                    + t.biases.len() * std::mem::size_of::<f32>()
                    + t.buckets
                        .values()
                        .map(|b| b.capacity() * std::mem::size_of::<u32>())
                        .sum::<usize>()
            })
            .sum();
        self.store.memory_usage() + tables
    }
}

impl AnnIndex for LshIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        LshIndex::search(self, query, k)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(LshIndex::with_config(
            16,
            10,
            LshConfig {
                num_hash_tables: 0,
                num_hash_functions: 4
            }
        )
        .is_err());
        assert!(LshIndex::with_config(
            16,
            10,
            LshConfig {
                num_hash_tables: 2,
                num_hash_functions: 65
            }
        )
        .is_err());
    }

    #[test]
    fn test_empty_search() {
        let index = LshIndex::new(16, 10).unwrap();
        assert!(index.search(&[0.0; 16], 5).is_empty());
    }

    #[test]
    fn test_self_query_hits_own_bucket() {
        let dim = 32;
        let data = random_data(200, dim, 41);
        let mut index = LshIndex::new(dim, 200).unwrap();
        for i in 0..200 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        // A vector always collides with itself in every table, so a
        // self-query must return it first with distance zero.
        for i in (0..200).step_by(29) {
            let query = &data[i * dim..(i + 1) * dim];
            let results = index.search(query, 1);
            assert_eq!(results[0].label, Label::new(i as i32));
            assert!(results[0].distance < 1e-5);
        }
    }

    #[test]
    fn test_results_sorted_and_bounded() {
        let dim = 16;
        let data = random_data(300, dim, 43);
        let mut index = LshIndex::new(dim, 300).unwrap();
        for i in 0..300 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let query = random_data(1, dim, 44);
        let results = index.search(&query, 10);
        assert!(results.len() <= 10);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_capacity_enforced() {
        let mut index = LshIndex::new(8, 2).unwrap();
        index.add(Label::new(0), &[0.1; 8]).unwrap();
        index.add(Label::new(1), &[0.2; 8]).unwrap();
        assert!(index.add(Label::new(2), &[0.3; 8]).is_err());
    }
}
