//! K-means clustering over flat row-major buffers.
//!
//! Shared by the PQ codec (per-subspace codebooks) and the IVF coarse
//! quantizer. Uses k-means++ seeding followed by Lloyd iterations, all
//! driven by a caller-supplied seeded RNG so training is reproducible.
//!
//! Termination: when no assignment changed in an iteration, or when the
//! iteration cap is reached. Empty clusters retain their previous centroid.

use crate::distance::euclidean_distance_squared;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

/// K-means clustering with k-means++ initialization.
pub struct KMeans {
    /// Flat centroid matrix: centroid `c` spans `[c * dim, (c + 1) * dim)`.
    pub centroids: Vec<f32>,
    k: usize,
    dim: usize,
    max_iters: usize,
}

impl KMeans {
    /// Create a new K-Means instance.
    ///
    /// # Arguments
    /// * `k` - Number of clusters
    /// * `dim` - Dimension of the points to be clustered
    /// * `max_iters` - Iteration cap for Lloyd refinement
    pub fn new(k: usize, dim: usize, max_iters: usize) -> Self {
        Self {
            centroids: Vec::new(),
            k,
            dim,
            max_iters,
        }
    }

    /// Centroid `c` as a slice.
    #[inline]
    pub fn centroid(&self, c: usize) -> &[f32] {
        &self.centroids[c * self.dim..(c + 1) * self.dim]
    }

    /// Fit the model to `data` (row-major, `data.len() / dim` points).
    ///
    /// Seeding samples the first centroid uniformly and each subsequent one
    /// with probability proportional to the squared distance to its nearest
    /// already-chosen centroid. Lloyd iterations then refine until
    /// assignments stop changing or the cap is reached.
    pub fn fit(&mut self, data: &[f32], rng: &mut StdRng) {
        let n = data.len() / self.dim;
        if n == 0 {
            return;
        }

        self.init_plus_plus(data, n, rng);

        let mut assignments = vec![0usize; n];
        let mut cluster_sizes = vec![0usize; self.k];

        for _iter in 0..self.max_iters {
            // Assignment step
            let new_assignments: Vec<usize> = (0..n)
                .into_par_iter()
                .map(|i| self.assign(&data[i * self.dim..(i + 1) * self.dim]))
                .collect();

            let changed = new_assignments != assignments;
            assignments = new_assignments;
            if !changed {
                break;
            }

            // Update step: mean of each cluster, empty clusters untouched
            cluster_sizes.fill(0);
            let mut sums = vec![0.0f32; self.k * self.dim];
            for (i, &cluster) in assignments.iter().enumerate() {
                let point = &data[i * self.dim..(i + 1) * self.dim];
                let sum = &mut sums[cluster * self.dim..(cluster + 1) * self.dim];
                for (s, &p) in sum.iter_mut().zip(point.iter()) {
                    *s += p;
                }
                cluster_sizes[cluster] += 1;
            }

            for c in 0..self.k {
                if cluster_sizes[c] == 0 {
                    continue;
                }
                let inv = 1.0 / cluster_sizes[c] as f32;
                let centroid = &mut self.centroids[c * self.dim..(c + 1) * self.dim];
                let sum = &sums[c * self.dim..(c + 1) * self.dim];
                for (out, &s) in centroid.iter_mut().zip(sum.iter()) {
                    *out = s * inv;
                }
            }
        }
    }

    /// k-means++ seeding. The minimum distance to the chosen set is
    /// maintained incrementally against the latest centroid only, keeping
    /// initialization at O(k·n) distance computations.
    fn init_plus_plus(&mut self, data: &[f32], n: usize, rng: &mut StdRng) {
        self.centroids = vec![0.0; self.k * self.dim];

        let first = rng.gen_range(0..n);
        self.centroids[..self.dim].copy_from_slice(&data[first * self.dim..(first + 1) * self.dim]);

        let mut min_distances = vec![f32::MAX; n];

        for c in 1..self.k {
            let prev = self.centroid(c - 1).to_vec();

            let mut total = 0.0f32;
            for i in 0..n {
                let point = &data[i * self.dim..(i + 1) * self.dim];
                let d = euclidean_distance_squared(point, &prev);
                if d < min_distances[i] {
                    min_distances[i] = d;
                }
                total += min_distances[i];
            }

            let selected = if total > 0.0 {
                let target: f32 = rng.gen_range(0.0..total);
                let mut cumsum = 0.0f32;
                let mut chosen = 0;
                for (i, &d) in min_distances.iter().enumerate() {
                    cumsum += d;
                    if cumsum >= target {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                // All points coincide with chosen centroids
                rng.gen_range(0..n)
            };

            let dest = c * self.dim;
            self.centroids[dest..dest + self.dim]
                .copy_from_slice(&data[selected * self.dim..(selected + 1) * self.dim]);
        }
    }

    /// Index of the nearest centroid to `point`.
    #[inline]
    pub fn assign(&self, point: &[f32]) -> usize {
        let mut nearest = 0;
        let mut min_dist = f32::MAX;
        for c in 0..self.k {
            let d = euclidean_distance_squared(point, self.centroid(c));
            if d < min_dist {
                min_dist = d;
                nearest = c;
            }
        }
        nearest
    }

    /// The `count` nearest centroids to `query`, closest first, with their
    /// squared distances. Ties resolve to the lower centroid index.
    pub fn nearest_centroids(&self, query: &[f32], count: usize) -> Vec<(usize, f32)> {
        let mut distances: Vec<(usize, f32)> = (0..self.k)
            .map(|c| (c, euclidean_distance_squared(query, self.centroid(c))))
            .collect();

        distances.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        distances.truncate(count);
        distances
    }
}
