//! Random-projection tree index.
//!
//! Each of `T` trees recursively partitions a shuffled copy of the index
//! set: an internal node splits its points by a random unit-norm
//! hyperplane biased at the mean projection, and partitioning stops when a
//! node holds ten points or fewer. A query descends each tree visiting the
//! near child first and the far child while the candidate budget permits,
//! then the union of leaf candidates is deduplicated and exactly
//! re-ranked.

use crate::constants::rp_tree as defaults;
use crate::error::{ForgeAnnError, Result};
use crate::index::traits::{AnnIndex, BatchAddReport, BuildableIndex, SearchResult};
use crate::store::VectorStore;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::cmp::Ordering;

/// Configuration for [`RpTreeIndex`].
#[derive(Debug, Clone)]
pub struct RpTreeConfig {
    /// Number of independent trees.
    pub num_trees: usize,
}

impl Default for RpTreeConfig {
    fn default() -> Self {
        Self {
            num_trees: defaults::DEFAULT_TREES,
        }
    }
}

/// One tree node in the arena: either an internal split or a leaf.
struct TreeNode {
    /// Arena index of the below-bias child; `None` for leaves.
    left: Option<u32>,
    /// Arena index of the at-or-above-bias child; `None` for leaves.
    right: Option<u32>,
    /// Unit-norm split direction; empty for leaves.
    hyperplane: Vec<f32>,
    /// Mean projection of the points split at this node.
    bias: f32,
    /// Internal indices held by a leaf.
    indices: Vec<u32>,
}

/// Random-projection tree index.
pub struct RpTreeIndex {
    config: RpTreeConfig,
    store: VectorStore,
    /// One arena of nodes per tree; index 0 is the root.
    trees: Vec<Vec<TreeNode>>,
    built: bool,
    rng: StdRng,
}

impl RpTreeIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, RpTreeConfig::default())
    }

    /// Create an index with an explicit configuration.
    pub fn with_config(dimension: usize, capacity: usize, config: RpTreeConfig) -> Result<Self> {
        if config.num_trees == 0 {
            return Err(ForgeAnnError::invalid_parameter("num_trees must be positive"));
        }
        let store = VectorStore::new(dimension, capacity)?;
        Ok(Self {
            config,
            store,
            trees: Vec::new(),
            built: false,
            rng: StdRng::from_entropy(),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &RpTreeConfig {
        &self.config
    }

    /// Add a vector. The trees are built later in [`Self::build`];
    /// adding after a build invalidates it.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        let index = self.store.add(label, vector)?;
        self.built = false;
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

    /// Build all trees over the vectors added so far.
    ///
    /// # Errors
    /// `EmptyVectorSet` if nothing has been added.
    pub fn build(&mut self) -> Result<()> {
        let size = self.store.len();
        if size == 0 {
            return Err(ForgeAnnError::EmptyVectorSet);
        }

        self.trees.clear();
        for _ in 0..self.config.num_trees {
            let mut indices: Vec<u32> = (0..size as u32).collect();
            indices.shuffle(&mut self.rng);

            let mut arena = Vec::new();
            Self::build_subtree(&self.store, &mut arena, indices, &mut self.rng);
            self.trees.push(arena);
        }

        self.built = true;
        Ok(())
    }

    /// Recursively partition `indices`, returning the arena slot of the
    /// subtree root.
    fn build_subtree(
        store: &VectorStore,
        arena: &mut Vec<TreeNode>,
        indices: Vec<u32>,
        rng: &mut StdRng,
    ) -> u32 {
        let slot = arena.len() as u32;

        if indices.len() <= defaults::LEAF_SIZE {
            arena.push(TreeNode {
                left: None,
                right: None,
                hyperplane: Vec::new(),
                bias: 0.0,
                indices,
            });
            return slot;
        }

        let dim = store.dim();
        let mut hyperplane: Vec<f32> = (0..dim).map(|_| rng.sample::<f32, _>(StandardNormal)).collect();
        let norm: f32 = hyperplane.iter().map(|v| v * v).sum::<f32>().sqrt();
        for v in &mut hyperplane {
            *v /= norm;
        }

        let projections: Vec<f32> = indices
            .iter()
            .map(|&i| {
                store
                    .get(i as usize)
                    .map(|row| crate::distance::dot_product(row, &hyperplane))
                    .unwrap_or(0.0)
            })
            .collect();
        let bias = projections.iter().sum::<f32>() / projections.len() as f32;

        let mut left_indices = Vec::new();
        let mut right_indices = Vec::new();
        for (pos, &i) in indices.iter().enumerate() {
            if projections[pos] < bias {
                left_indices.push(i);
            } else {
                right_indices.push(i);
            }
        }

        // A degenerate split (all projections equal) cannot recurse; close
        // the node off as a leaf instead.
        if left_indices.is_empty() || right_indices.is_empty() {
            arena.push(TreeNode {
                left: None,
                right: None,
                hyperplane: Vec::new(),
                bias: 0.0,
                indices,
            });
            return slot;
        }

        arena.push(TreeNode {
            left: None,
            right: None,
            hyperplane,
            bias,
            indices: Vec::new(),
        });

        let left = Self::build_subtree(store, arena, left_indices, rng);
        arena[slot as usize].left = Some(left);
        let right = Self::build_subtree(store, arena, right_indices, rng);
        arena[slot as usize].right = Some(right);

        slot
    }

    /// Budgeted descent of one tree: near child first, far child while the
    /// candidate budget permits.
    fn search_tree(
        &self,
        tree: &[TreeNode],
        node: u32,
        query: &[f32],
        candidates: &mut Vec<u32>,
        max_candidates: usize,
    ) {
        if candidates.len() >= max_candidates {
            return;
        }
        let node = &tree[node as usize];

        if node.left.is_none() && node.right.is_none() {
            candidates.extend_from_slice(&node.indices);
            return;
        }

        let projection = crate::distance::dot_product(query, &node.hyperplane);
        let (near, far) = if projection < node.bias {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search_tree(tree, near, query, candidates, max_candidates);
        }
        if candidates.len() < max_candidates {
            if let Some(far) = far {
                self.search_tree(tree, far, query, candidates, max_candidates);
            }
        }
    }

    /// Search for the `k` nearest neighbors.
    ///
    /// Returns no results before [`Self::build`]. Candidates from all trees
    /// are deduplicated and exactly re-ranked; ties break by internal
    /// index.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        if !self.built || self.store.is_empty() || k == 0 {
            return Vec::new();
        }

        // One shared budget across all trees: later trees stop
        // contributing once earlier leaves have filled it.
        let max_candidates = k * self.config.num_trees * 2;
        let mut candidates = Vec::with_capacity(max_candidates);
        for tree in &self.trees {
            self.search_tree(tree, 0, query, &mut candidates, max_candidates);
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

    /// Estimated heap usage: store plus tree arenas.
    pub fn get_memory_usage(&self) -> usize {
        let trees: usize = self
            .trees
            .iter()
            .map(|arena| {
                arena
                    .iter()
                    .map(|n| {
                        n.hyperplane.capacity() * std::mem::size_of::<f32>()
                            + n.indices.capacity() * std::mem::size_of::<u32>()
                            + std::mem::size_of::<TreeNode>()
                    })
                    .sum::<usize>()
            })
            .sum();
        self.store.memory_usage() + trees
    }
}

impl AnnIndex for RpTreeIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        RpTreeIndex::search(self, query, k)
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

impl BuildableIndex for RpTreeIndex {
    fn build(&mut self) -> Result<()> {
        RpTreeIndex::build(self)
    }

    fn is_built(&self) -> bool {
        self.built
    }
}
