//! Dataset utilities for generating and evaluating vector search.

use crate::index::brute_force::BruteForceIndex;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// A synthetic dataset with base vectors, queries, and ground truth.
pub struct Dataset {
    /// Base vectors, row-major.
    pub vectors: Vec<f32>,
    /// Query vectors, row-major.
    pub queries: Vec<f32>,
    /// Dimension of all rows.
    pub dim: usize,
    /// Brute-force nearest labels per query, filled by
    /// [`Self::compute_ground_truth`].
    pub ground_truth: Vec<Vec<i32>>,
}

impl Dataset {
    /// Generate a seeded uniform-random dataset in [-1, 1).
    ///
    /// Base vector `i` is labeled `i`; queries are fresh draws from the
    /// same distribution.
    pub fn generate(n_vectors: usize, n_queries: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vectors = (0..n_vectors * dim)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        let queries = (0..n_queries * dim)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();

        Self {
            vectors,
            queries,
            dim,
            ground_truth: Vec::new(),
        }
    }

    /// Number of base vectors.
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dim
    }

    /// True if the dataset holds no base vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Base row `i`.
    pub fn vector(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dim..(i + 1) * self.dim]
    }

    /// Query row `i`.
    pub fn query(&self, i: usize) -> &[f32] {
        &self.queries[i * self.dim..(i + 1) * self.dim]
    }

    /// Compute brute-force top-k labels for every query.
    pub fn compute_ground_truth(&mut self, k: usize) {
        let n = self.len();
        let mut oracle = BruteForceIndex::new(self.dim, n).expect("dataset dimensions are valid");
        for i in 0..n {
            oracle
                .add(Label::new(i as i32), self.vector(i))
                .expect("dataset fits its own capacity");
        }

        self.ground_truth = (0..self.queries.len() / self.dim)
            .map(|qi| {
                oracle
                    .search_parallel(self.query(qi), k)
                    .into_iter()
                    .map(|r| r.label.as_i32())
                    .collect()
            })
            .collect();
    }
}

/// Compute recall@k between predicted and ground-truth label lists.
///
/// Returns the fraction of the true top-k that was found, in [0, 1].
pub fn recall_at_k(predicted: &[i32], ground_truth: &[i32], k: usize) -> f32 {
    let pred_set: HashSet<i32> = predicted.iter().take(k).copied().collect();
    let truth_set: HashSet<i32> = ground_truth.iter().take(k).copied().collect();

    let intersection = pred_set.intersection(&truth_set).count();
    intersection as f32 / k as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_dataset() {
        let dataset = Dataset::generate(100, 10, 32, 1);
        assert_eq!(dataset.len(), 100);
        assert_eq!(dataset.vector(0).len(), 32);
        assert_eq!(dataset.query(9).len(), 32);
    }

    #[test]
    fn test_generation_is_seeded() {
        let a = Dataset::generate(50, 5, 16, 7);
        let b = Dataset::generate(50, 5, 16, 7);
        assert_eq!(a.vectors, b.vectors);
        assert_eq!(a.queries, b.queries);
    }

    #[test]
    fn test_ground_truth() {
        let mut dataset = Dataset::generate(200, 5, 16, 3);
        dataset.compute_ground_truth(10);
        assert_eq!(dataset.ground_truth.len(), 5);
        assert!(dataset.ground_truth.iter().all(|g| g.len() == 10));
    }

    #[test]
    fn test_recall_perfect() {
        let predicted = vec![1, 2, 3, 4, 5];
        let ground_truth = vec![1, 2, 3, 4, 5];
        assert_eq!(recall_at_k(&predicted, &ground_truth, 5), 1.0);
    }

    #[test]
    fn test_recall_partial() {
        let predicted = vec![1, 2, 6, 7, 8];
        let ground_truth = vec![1, 2, 3, 4, 5];
        assert_eq!(recall_at_k(&predicted, &ground_truth, 5), 0.4);
    }

    #[test]
    fn test_recall_none() {
        let predicted = vec![6, 7, 8, 9, 10];
        let ground_truth = vec![1, 2, 3, 4, 5];
        assert_eq!(recall_at_k(&predicted, &ground_truth, 5), 0.0);
    }
}
