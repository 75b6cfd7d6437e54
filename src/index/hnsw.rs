//! HNSW (Hierarchical Navigable Small World) graph index.
//!
//! HNSW builds a multi-layer proximity graph: every node lives on level 0,
//! and each higher level keeps an exponentially thinner subset with
//! long-range links. Search greedily descends from the sparse top layers,
//! then runs a bounded beam search on level 0.
//!
//! # Parameters
//!
//! - `m`: max neighbors per node per level. Higher = better recall, more memory
//! - `ef_construction`: candidate pool during insert. Higher = better graph, slower build
//! - `ef_search`: floor for the search pool; the effective pool scales with k and index size
//!
//! # Concurrency
//!
//! The graph and its vector store sit behind a reader-writer lock: searches
//! run concurrently under the shared side, an insert holds the exclusive
//! side for the duration of its mutation. The entry point is an atomic so
//! readers never observe a torn update. Visited tracking is recycled
//! through a per-index pool instead of allocating per query.

use crate::constants::{hnsw as defaults, workers};
use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult};
use crate::index::visited::{VisitedPool, VisitedSet};
use crate::store::VectorStore;
use crate::types::Label;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as MemOrdering};

/// Node identifier within the graph (dense internal index).
pub(crate) type NodeId = u32;

/// A node with its computed distance, used for heap operations.
#[derive(Clone, Copy)]
pub(crate) struct ScoredNode {
    pub id: NodeId,
    pub distance: f32,
}

impl PartialEq for ScoredNode {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for ScoredNode {}

impl PartialOrd for ScoredNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Configuration for [`HnswIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max neighbors per node per level.
    pub m: usize,
    /// Candidate pool size during insertion.
    pub ef_construction: usize,
    /// Floor for the search-time candidate pool.
    pub ef_search: usize,
    /// Cap on node levels.
    pub max_level: usize,
    /// Exponential level decay; `1 / ln(m)` by default.
    pub level_multiplier: f64,
    /// Additive slack over `k` when scaling the search pool.
    pub ef_search_delta: usize,
    /// Abandon candidates beyond this distance (0 disables).
    pub distance_threshold: f32,
    /// Stop beam search after `ef * max_expansions_multiplier` expansions.
    pub use_early_termination: bool,
    /// Expansion budget multiplier for early termination.
    pub max_expansions_multiplier: usize,
    /// Diversify neighbor selection instead of taking the plain top-M.
    pub use_heuristic_selection: bool,
    /// Bounds adjacency scratch growth; lists are re-pruned to `m` well
    /// before reaching `m * prune_overflow_factor`.
    pub prune_overflow_factor: usize,
    /// Distance metric for all graph navigation and results.
    pub metric: DistanceMetric,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: defaults::DEFAULT_M,
            ef_construction: defaults::DEFAULT_EF_CONSTRUCTION,
            ef_search: defaults::DEFAULT_EF_SEARCH,
            max_level: defaults::DEFAULT_MAX_LEVEL,
            level_multiplier: 1.0 / (defaults::DEFAULT_M as f64).ln(),
            ef_search_delta: defaults::DEFAULT_EF_SEARCH_DELTA,
            distance_threshold: 0.0,
            use_early_termination: true,
            max_expansions_multiplier: defaults::DEFAULT_MAX_EXPANSIONS_MULTIPLIER,
            use_heuristic_selection: true,
            prune_overflow_factor: defaults::DEFAULT_PRUNE_OVERFLOW_FACTOR,
            metric: DistanceMetric::EuclideanSquared,
        }
    }
}

impl HnswConfig {
    /// Effective search pool size for a query of `k` on `data_size` rows.
    ///
    /// Grows logarithmically with the index size, enforces a k-scaled lower
    /// bound, honors `ef_search` as a floor, and caps the result.
    pub fn get_ef_search(&self, k: usize, data_size: usize) -> usize {
        let mut base_ef = k + self.ef_search_delta;
        if data_size > 100 {
            let scale = 1.0 + 0.2 * ((data_size as f32 / 100.0) + 1.0).log10();
            base_ef = (base_ef as f32 * scale) as usize;
        }

        let min_multiplier = if data_size > 20000 {
            8
        } else if data_size > 5000 {
            6
        } else if data_size > 1000 {
            5
        } else {
            4
        };
        let min_ef = k * min_multiplier;

        let result = base_ef.max(min_ef).max(self.ef_search);
        let max_ef = if data_size > 10000 { 400 } else { 300 };
        result.min(max_ef).max(k)
    }

    /// Beam-search expansion budget for a pool of `ef`.
    pub fn max_expansions(&self, ef: usize) -> usize {
        ef * self.max_expansions_multiplier
    }
}

/// One graph node: its level and an adjacency list per level `0..=level`.
#[derive(Debug)]
pub(crate) struct HnswNode {
    pub level: usize,
    pub neighbors: Vec<SmallVec<[NodeId; 32]>>,
}

impl HnswNode {
    fn new(level: usize) -> Self {
        Self {
            level,
            neighbors: vec![SmallVec::new(); level + 1],
        }
    }
}

/// Graph state guarded by the index's reader-writer lock.
#[derive(Debug)]
pub(crate) struct HnswGraph {
    pub store: VectorStore,
    pub nodes: Vec<HnswNode>,
}

impl HnswGraph {
    /// Distance from a query to the stored row `i`, with the bounds checks
    /// the greedy-descent cursor relies on: anything unresolvable is
    /// infinitely far.
    #[inline]
    pub fn distance_to(&self, query: &[f32], i: usize, distance: fn(&[f32], &[f32]) -> f32) -> f32 {
        match self.store.get(i) {
            Some(row) => distance(query, row),
            None => f32::MAX,
        }
    }
}

/// HNSW index over dense f32 vectors.
#[derive(Debug)]
pub struct HnswIndex {
    config: HnswConfig,
    graph: RwLock<HnswGraph>,
    /// Internal index of the top entry node; −1 while empty.
    entry_point: AtomicI64,
    /// Published element count; lags the store during an in-flight insert.
    size: AtomicUsize,
    num_threads: AtomicUsize,
    rng: Mutex<StdRng>,
    visited: VisitedPool,
    distance: fn(&[f32], &[f32]) -> f32,
}

impl HnswIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, HnswConfig::default())
    }

    /// Create an index with an explicit configuration.
    ///
    /// # Errors
    /// `InvalidParameter` for a zero dimension or capacity.
    pub fn with_config(dimension: usize, capacity: usize, config: HnswConfig) -> Result<Self> {
        let store = VectorStore::new(dimension, capacity)?;
        let distance = config.metric.kernel();
        Ok(Self {
            config,
            graph: RwLock::new(HnswGraph {
                store,
                nodes: Vec::with_capacity(capacity),
            }),
            entry_point: AtomicI64::new(-1),
            size: AtomicUsize::new(0),
            num_threads: AtomicUsize::new(workers::DEFAULT_NUM_THREADS),
            rng: Mutex::new(StdRng::from_entropy()),
            visited: VisitedPool::new(),
            distance,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Bound the fan-out of batch operations. Clamped to at least 1.
    pub fn set_num_threads(&self, n: usize) {
        self.num_threads.store(n.max(1), MemOrdering::Relaxed);
    }

    /// Current batch fan-out bound.
    pub fn num_threads(&self) -> usize {
        self.num_threads.load(MemOrdering::Relaxed)
    }

    /// Draw a level from the exponential distribution, capped at
    /// `max_level`.
    fn random_level(&self) -> usize {
        let r: f64 = self.rng.lock().gen();
        let level = (-r.ln() * self.config.level_multiplier) as usize;
        level.min(self.config.max_level)
    }

    /// Add a vector, returning its internal index.
    ///
    /// Holds the exclusive lock for the duration of the graph mutation.
    ///
    /// # Errors
    /// `DimensionMismatch` or `CapacityExceeded`; the index is unchanged on
    /// failure.
    pub fn add(&self, label: Label, vector: &[f32]) -> Result<usize> {
        let level = self.random_level();
        let mut graph = self.graph.write();

        let index = graph.store.add(label, vector)?;
        let mut node = HnswNode::new(level);

        if index == 0 {
            graph.nodes.push(node);
            self.entry_point.store(0, MemOrdering::Release);
            self.size.store(1, MemOrdering::Release);
            return Ok(0);
        }

        let mut curr_obj = self.entry_point.load(MemOrdering::Acquire) as usize;
        let mut curr_dist = graph.distance_to(vector, curr_obj, self.distance);

        // Greedy descent through the levels above the new node's level
        let mut curr_level = graph.nodes[curr_obj].level;
        while curr_level > level {
            let (obj, dist) =
                Self::greedy_step(&graph, vector, curr_obj, curr_dist, curr_level, self.distance);
            curr_obj = obj;
            curr_dist = dist;
            curr_level -= 1;
            if curr_obj < graph.nodes.len() {
                curr_level = curr_level.min(graph.nodes[curr_obj].level);
            }
        }

        let mut visited = self.visited.acquire(graph.nodes.len() + 1);
        let top = level.min(graph.nodes[curr_obj].level);
        for lc in (0..=top).rev() {
            let candidates = Self::search_level(
                &graph,
                vector,
                curr_obj,
                self.config.ef_construction,
                lc,
                &mut visited,
                &self.config,
                self.distance,
                Some(index),
            );

            let selected = if self.config.use_heuristic_selection
                && candidates.len() > self.config.m
            {
                Self::select_neighbors_heuristic(&graph, &candidates, self.config.m, self.distance)
            } else {
                Self::select_neighbors(&candidates, self.config.m)
            };

            node.neighbors[lc] = selected.iter().copied().collect();

            for &neighbor in &selected {
                Self::connect(&mut graph, neighbor, index as NodeId, lc, &self.config, self.distance);
            }

            if let Some(first) = candidates.first() {
                curr_obj = first.id as usize;
            }
        }
        self.visited.release(visited);

        graph.nodes.push(node);

        let current_entry = self.entry_point.load(MemOrdering::Acquire) as usize;
        if level > graph.nodes[current_entry].level {
            self.entry_point.store(index as i64, MemOrdering::Release);
        }

        self.size.fetch_add(1, MemOrdering::Release);
        Ok(index)
    }

    /// Insert a batch, collecting per-item failures instead of aborting.
    pub fn add_batch(&self, labels: &[Label], vectors: &[f32]) -> BatchAddReport {
        let dim = self.dimension();
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

    /// One plateau of greedy descent: follow strictly improving neighbors
    /// at `level` until no neighbor improves.
    fn greedy_step(
        graph: &HnswGraph,
        query: &[f32],
        mut curr_obj: usize,
        mut curr_dist: f32,
        level: usize,
        distance: fn(&[f32], &[f32]) -> f32,
    ) -> (usize, f32) {
        let mut changed = true;
        while changed {
            changed = false;
            if curr_obj >= graph.nodes.len() {
                break;
            }
            let node = &graph.nodes[curr_obj];
            if level > node.level {
                break;
            }
            for &neighbor in &node.neighbors[level] {
                let d = graph.distance_to(query, neighbor as usize, distance);
                if d < curr_dist {
                    curr_dist = d;
                    curr_obj = neighbor as usize;
                    changed = true;
                }
            }
        }
        (curr_obj, curr_dist)
    }

    /// Bounded beam search at one level.
    ///
    /// Keeps a min-heap of candidates and a max-heap of results capped at
    /// `ef`; terminates when the nearest candidate is worse than the worst
    /// retained result, when the expansion budget runs out, or when the
    /// distance threshold cuts off. `skip` excludes the in-flight node
    /// during its own insert (its row is stored and back-edges to it may
    /// already exist, but it must not select itself as a neighbor).
    /// Returns results sorted ascending.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search_level(
        graph: &HnswGraph,
        query: &[f32],
        entry: usize,
        ef: usize,
        level: usize,
        visited: &mut VisitedSet,
        config: &HnswConfig,
        distance: fn(&[f32], &[f32]) -> f32,
        skip: Option<usize>,
    ) -> Vec<ScoredNode> {
        visited.clear();
        if let Some(skip) = skip {
            visited.insert(skip);
        }

        let entry_dist = graph.distance_to(query, entry, distance);
        if entry_dist == f32::MAX {
            return Vec::new();
        }

        let mut candidates: BinaryHeap<Reverse<ScoredNode>> = BinaryHeap::with_capacity(ef);
        let mut results: BinaryHeap<ScoredNode> = BinaryHeap::with_capacity(ef + 1);

        candidates.push(Reverse(ScoredNode {
            id: entry as NodeId,
            distance: entry_dist,
        }));
        results.push(ScoredNode {
            id: entry as NodeId,
            distance: entry_dist,
        });
        visited.insert(entry);

        let mut lower_bound = entry_dist;
        let mut expansions = 0usize;
        let max_expansions = config.max_expansions(ef);

        while let Some(Reverse(current)) = candidates.pop() {
            expansions += 1;

            let curr_id = current.id as usize;
            if curr_id >= graph.nodes.len() {
                continue;
            }

            if current.distance > lower_bound && results.len() >= ef {
                break;
            }
            if config.use_early_termination && expansions > max_expansions {
                break;
            }
            if config.distance_threshold > 0.0 && current.distance > config.distance_threshold {
                break;
            }

            let node = &graph.nodes[curr_id];
            if level >= node.neighbors.len() {
                continue;
            }
            let neighbors = &node.neighbors[level];

            // Hide memory latency: hint the first batch, then stay 8 ahead
            for &n in neighbors.iter().take(8) {
                graph.store.prefetch(n as usize);
            }

            for (ni, &neighbor) in neighbors.iter().enumerate() {
                if ni + 8 < neighbors.len() {
                    graph.store.prefetch(neighbors[ni + 8] as usize);
                }

                let neighbor = neighbor as usize;
                if !visited.insert(neighbor) {
                    continue;
                }

                let d = graph.distance_to(query, neighbor, distance);
                if config.distance_threshold > 0.0 && d > config.distance_threshold {
                    continue;
                }

                if results.len() < ef || d < lower_bound {
                    candidates.push(Reverse(ScoredNode {
                        id: neighbor as NodeId,
                        distance: d,
                    }));
                    results.push(ScoredNode {
                        id: neighbor as NodeId,
                        distance: d,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                    if let Some(worst) = results.peek() {
                        lower_bound = worst.distance;
                    }
                }
            }
        }

        let mut sorted = results.into_vec();
        sorted.sort();
        sorted
    }

    /// Plain top-M selection from ascending-sorted candidates.
    fn select_neighbors(candidates: &[ScoredNode], m: usize) -> Vec<NodeId> {
        candidates.iter().take(m).map(|c| c.id).collect()
    }

    /// Diversity-aware neighbor selection.
    ///
    /// Iteratively picks the candidate maximizing a score that rewards
    /// proximity to the new node and distance to the already-selected set,
    /// so mutually-close cliques do not crowd out navigable long links.
    fn select_neighbors_heuristic(
        graph: &HnswGraph,
        candidates: &[ScoredNode],
        m: usize,
        distance: fn(&[f32], &[f32]) -> f32,
    ) -> Vec<NodeId> {
        if candidates.len() <= m {
            return candidates.iter().map(|c| c.id).collect();
        }

        let max_candidates = (m * 6).min(candidates.len());
        for c in candidates.iter().take(max_candidates) {
            graph.store.prefetch(c.id as usize);
        }

        let mut selected = vec![false; max_candidates];
        let mut min_dist_to_selected = vec![f32::MAX; max_candidates];
        let mut result = Vec::with_capacity(m);

        for round in 0..m.min(max_candidates) {
            let mut best_idx: Option<usize> = None;
            let mut best_score = -1.0f32;

            for j in 0..max_candidates {
                if selected[j] {
                    continue;
                }
                let mut score = 1.0 / (1.0 + candidates[j].distance);
                if round > 0 {
                    score += 0.3 * min_dist_to_selected[j].min(10.0) / 10.0;
                }
                if score > best_score {
                    best_score = score;
                    best_idx = Some(j);
                }
            }

            let Some(best) = best_idx else { break };
            selected[best] = true;
            result.push(candidates[best].id);

            let Some(chosen_row) = graph.store.get(candidates[best].id as usize) else {
                continue;
            };
            for j in 0..max_candidates {
                if selected[j] {
                    continue;
                }
                if let Some(row) = graph.store.get(candidates[j].id as usize) {
                    let d = distance(chosen_row, row);
                    if d < min_dist_to_selected[j] {
                        min_dist_to_selected[j] = d;
                    }
                }
            }
        }

        result
    }

    /// Append a back-edge `neighbor -> new_id` at `level`, re-pruning the
    /// neighbor's list to the `m` closest whenever it overflows.
    fn connect(
        graph: &mut HnswGraph,
        neighbor: NodeId,
        new_id: NodeId,
        level: usize,
        config: &HnswConfig,
        distance: fn(&[f32], &[f32]) -> f32,
    ) {
        let neighbor = neighbor as usize;
        if neighbor >= graph.nodes.len() {
            return;
        }
        {
            let node = &mut graph.nodes[neighbor];
            if level >= node.neighbors.len() || node.neighbors[level].contains(&new_id) {
                return;
            }
            node.neighbors[level].push(new_id);
            if node.neighbors[level].len() <= config.m {
                return;
            }
        }
        Self::prune(graph, neighbor, level, config.m, distance);
    }

    /// Re-prune one adjacency list to the `m` closest by exact distance.
    fn prune(
        graph: &mut HnswGraph,
        node_id: usize,
        level: usize,
        m: usize,
        distance: fn(&[f32], &[f32]) -> f32,
    ) {
        let Some(node_row) = graph.store.get(node_id) else {
            return;
        };

        let mut scored: Vec<ScoredNode> = graph.nodes[node_id].neighbors[level]
            .iter()
            .map(|&n| ScoredNode {
                id: n,
                distance: graph.distance_to(node_row, n as usize, distance),
            })
            .collect();
        scored.sort();
        scored.truncate(m);

        graph.nodes[node_id].neighbors[level] = scored.into_iter().map(|s| s.id).collect();
    }

    /// Search for the `k` nearest neighbors of `query`.
    ///
    /// Returns at most `min(k, len)` results, closest first. An empty index
    /// returns no results.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let data_size = self.size.load(MemOrdering::Acquire);
        if data_size == 0 || k == 0 {
            return Vec::new();
        }

        let graph = self.graph.read();
        let entry = self.entry_point.load(MemOrdering::Acquire);
        if entry < 0 {
            return Vec::new();
        }

        let mut curr_obj = entry as usize;
        let mut curr_dist = graph.distance_to(query, curr_obj, self.distance);

        let mut curr_level = graph.nodes[curr_obj].level;
        while curr_level > 0 {
            let (obj, dist) =
                Self::greedy_step(&graph, query, curr_obj, curr_dist, curr_level, self.distance);
            curr_obj = obj;
            curr_dist = dist;
            curr_level -= 1;
            if curr_obj < graph.nodes.len() {
                curr_level = curr_level.min(graph.nodes[curr_obj].level);
            }
        }

        let ef = self.config.get_ef_search(k, data_size);
        let mut visited = self.visited.acquire(graph.nodes.len());
        let pool = Self::search_level(
            &graph,
            query,
            curr_obj,
            ef,
            0,
            &mut visited,
            &self.config,
            self.distance,
            None,
        );
        self.visited.release(visited);

        pool.into_iter()
            .take(k)
            .map(|s| SearchResult::new(graph.store.label(s.id as usize), s.distance))
            .collect()
    }

    /// Search many queries, partitioned across the worker pool.
    ///
    /// `queries` is row-major with `queries.len() / dimension` rows. Each
    /// query dispatches an independent `search`.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Vec<Vec<SearchResult>> {
        let dim = self.dimension();
        let n_queries = queries.len() / dim;
        if n_queries == 0 {
            return Vec::new();
        }

        let chunk = n_queries.div_ceil(self.num_threads());
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

    pub(crate) fn graph(&self) -> &RwLock<HnswGraph> {
        &self.graph
    }

    pub(crate) fn entry_point_raw(&self) -> i64 {
        self.entry_point.load(MemOrdering::Acquire)
    }

    pub(crate) fn restore(
        config: HnswConfig,
        graph: HnswGraph,
        entry_point: i64,
        size: usize,
    ) -> Self {
        let distance = config.metric.kernel();
        Self {
            config,
            graph: RwLock::new(graph),
            entry_point: AtomicI64::new(entry_point),
            size: AtomicUsize::new(size),
            num_threads: AtomicUsize::new(workers::DEFAULT_NUM_THREADS),
            rng: Mutex::new(StdRng::from_entropy()),
            visited: VisitedPool::new(),
            distance,
        }
    }
}

impl AnnIndex for HnswIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        HnswIndex::search(self, query, k)
    }

    fn len(&self) -> usize {
        self.size.load(MemOrdering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.graph.read().store.dim()
    }

    fn capacity(&self) -> usize {
        self.graph.read().store.capacity()
    }

    fn memory_usage(&self) -> usize {
        let graph = self.graph.read();
        let edges: usize = graph
            .nodes
            .iter()
            .map(|n| {
                n.neighbors
                    .iter()
                    .map(|l| l.capacity() * std::mem::size_of::<NodeId>())
                    .sum::<usize>()
            })
            .sum();
        graph.store.memory_usage() + edges + graph.nodes.len() * std::mem::size_of::<HnswNode>()
    }
}
