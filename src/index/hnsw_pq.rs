//! HNSW + Product Quantization hybrid index.
//!
//! Same graph skeleton as [`super::hnsw`], augmented with a PQ codec:
//! every stored vector is also encoded to `pqM` byte codes, and search
//! navigates the sparse upper layers with cheap asymmetric (ADC) distances
//! from a precomputed query table. Level 0 scores candidates with exact
//! distances over an enlarged pool, and a final exact re-rank of the top
//! `20·k` candidates produces the returned ordering.
//!
//! Inserts always use exact distances (the raw vector is still stored), so
//! graph quality does not degrade with quantization error.
//!
//! # Concurrency
//!
//! Inserts are phased: a short exclusive hold reserves the row, encodes it,
//! and publishes an unlinked node; the neighbor search runs under the
//! shared lock; the final linking phase mutates adjacency lists through
//! per-node locks, acquiring multi-node lock sets in ascending id order
//! after sorting and deduplicating, and re-validates the entry point
//! before publishing.

use crate::constants::workers;
use crate::distance::kernels;
use crate::error::{ForgeAnnError, Result};
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult, TrainableIndex};
use crate::index::visited::{VisitedPool, VisitedSet};
use crate::metrics::IndexStatistics;
use crate::pq::ProductQuantizer;
use crate::store::VectorStore;
use crate::types::{Dimension, Label};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as MemOrdering};

use super::hnsw::ScoredNode;

/// Configuration for [`HnswPqIndex`]: the HNSW graph parameters plus the
/// PQ codec parameters.
#[derive(Debug, Clone)]
pub struct HnswPqConfig {
    /// Max neighbors per node per level.
    pub m: usize,
    /// Candidate pool size during insertion.
    pub ef_construction: usize,
    /// Base search pool size (level 0 enlarges it; see `level0_ef`).
    pub ef_search: usize,
    /// Cap on node levels.
    pub max_level: usize,
    /// Exponential level decay.
    pub level_multiplier: f64,
    /// Diversify neighbor selection instead of taking the plain top-M.
    pub use_heuristic_selection: bool,
    /// Number of PQ subspaces; must divide the dimension.
    pub pq_subvectors: usize,
    /// PQ code width in bits (256 centroids at 8).
    pub pq_bits: usize,
    /// k-means iteration cap for codebook training.
    pub pq_iterations: usize,
}

impl Default for HnswPqConfig {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 64,
            ef_search: 64,
            max_level: 16,
            level_multiplier: 1.0 / 32f64.ln(),
            use_heuristic_selection: true,
            pq_subvectors: 8,
            pq_bits: 8,
            pq_iterations: 25,
        }
    }
}

impl HnswPqConfig {
    /// Level-0 pool size: enlarged to recover the recall lost to ADC
    /// navigation at the upper layers.
    pub fn level0_ef(&self, k: usize, data_size: usize) -> usize {
        (50 * k).max((data_size / 10).min(2000)).max(self.ef_search)
    }

    /// How many candidates the final exact re-rank considers.
    pub fn rerank_depth(&self, k: usize) -> usize {
        20 * k
    }
}

/// One adjacency list in the pooled layout: a contiguous buffer growing by
/// powers of two from a small initial capacity.
#[derive(Default, Clone)]
pub(crate) struct NeighborList {
    data: Vec<u32>,
}

impl NeighborList {
    #[inline]
    fn push(&mut self, id: u32) {
        if self.data.len() == self.data.capacity() {
            let grow = if self.data.capacity() == 0 {
                4
            } else {
                self.data.capacity()
            };
            self.data.reserve_exact(grow);
        }
        self.data.push(id);
    }

    #[inline]
    fn as_slice(&self) -> &[u32] {
        &self.data
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn replace(&mut self, ids: impl Iterator<Item = u32>) {
        self.data.clear();
        self.data.extend(ids);
    }

    fn capacity_bytes(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<u32>()
    }
}

/// Adjacency lists for one node, one list per level `0..=level`.
pub(crate) struct NodeLinks {
    levels: Vec<NeighborList>,
}

/// A graph node; the links carry their own lock so connected nodes can be
/// updated under the shared graph lock.
pub(crate) struct PqNode {
    level: usize,
    links: RwLock<NodeLinks>,
}

struct PqCore {
    store: VectorStore,
    /// PQ codes, `pq_subvectors` bytes per row, parallel to the store.
    codes: Vec<u8>,
    nodes: Vec<PqNode>,
}

impl PqCore {
    #[inline]
    fn exact_distance(&self, query: &[f32], i: usize, distance: fn(&[f32], &[f32]) -> f32) -> f32 {
        match self.store.get(i) {
            Some(row) => distance(query, row),
            None => f32::MAX,
        }
    }

    #[inline]
    fn code_row(&self, i: usize, m: usize) -> &[u8] {
        &self.codes[i * m..(i + 1) * m]
    }
}

/// HNSW graph with PQ-compressed navigation distances.
pub struct HnswPqIndex {
    config: HnswPqConfig,
    dim: usize,
    core: RwLock<PqCore>,
    quantizer: RwLock<Option<ProductQuantizer>>,
    entry_point: AtomicI64,
    size: AtomicUsize,
    num_threads: AtomicUsize,
    rng: Mutex<StdRng>,
    visited: VisitedPool,
    distance: fn(&[f32], &[f32]) -> f32,
}

impl HnswPqIndex {
    /// Create an index with default configuration.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_config(dimension, capacity, HnswPqConfig::default())
    }

    /// Create an index with an explicit configuration.
    ///
    /// # Errors
    /// `InvalidParameter` for zero dimension/capacity or a dimension not
    /// divisible by `pq_subvectors`.
    pub fn with_config(dimension: usize, capacity: usize, config: HnswPqConfig) -> Result<Self> {
        if !Dimension::new(dimension).is_divisible_by(config.pq_subvectors) {
            return Err(ForgeAnnError::invalid_parameter(format!(
                "dimension {} must be divisible by pq_subvectors {}",
                dimension, config.pq_subvectors
            )));
        }
        let store = VectorStore::new(dimension, capacity)?;
        Ok(Self {
            dim: dimension,
            core: RwLock::new(PqCore {
                store,
                codes: Vec::new(),
                nodes: Vec::with_capacity(capacity),
            }),
            quantizer: RwLock::new(None),
            entry_point: AtomicI64::new(-1),
            size: AtomicUsize::new(0),
            num_threads: AtomicUsize::new(workers::DEFAULT_NUM_THREADS),
            rng: Mutex::new(StdRng::from_entropy()),
            visited: VisitedPool::new(),
            distance: kernels().euclidean_sq,
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &HnswPqConfig {
        &self.config
    }

    /// Bound the fan-out of batch operations. Clamped to at least 1.
    pub fn set_num_threads(&self, n: usize) {
        self.num_threads.store(n.max(1), MemOrdering::Relaxed);
    }

    fn random_level(&self) -> usize {
        let r: f64 = self.rng.lock().gen();
        let level = (-r.ln() * self.config.level_multiplier) as usize;
        level.min(self.config.max_level)
    }

    /// Train the PQ codebooks on `samples` (row-major).
    ///
    /// # Errors
    /// `EmptyVectorSet` without samples; codec parameter errors otherwise.
    pub fn train(&self, samples: &[f32]) -> Result<()> {
        let pq = ProductQuantizer::train(
            samples,
            self.dim,
            self.config.pq_subvectors,
            self.config.pq_bits,
            self.config.pq_iterations,
        )?;
        *self.quantizer.write() = Some(pq);
        Ok(())
    }

    /// True once `train` has completed.
    pub fn is_trained(&self) -> bool {
        self.quantizer.read().is_some()
    }

    /// Add a vector, returning its internal index.
    ///
    /// # Errors
    /// `NotTrained` before `train`; store errors propagate unchanged.
    pub fn add(&self, label: Label, vector: &[f32]) -> Result<usize> {
        let level = self.random_level();

        // Reservation phase: row, codes, and an unlinked node go in under
        // a short exclusive hold.
        let index = {
            let quantizer = self.quantizer.read();
            let Some(pq) = quantizer.as_ref() else {
                return Err(ForgeAnnError::NotTrained);
            };

            let mut core = self.core.write();
            let index = core.store.add(label, vector)?;

            let mut codes = vec![0u8; self.config.pq_subvectors];
            pq.encode_into(vector, &mut codes);
            core.codes.extend_from_slice(&codes);

            core.nodes.push(PqNode {
                level,
                links: RwLock::new(NodeLinks {
                    levels: vec![NeighborList::default(); level + 1],
                }),
            });

            if index == 0 {
                self.entry_point.store(0, MemOrdering::Release);
                self.size.store(1, MemOrdering::Release);
                return Ok(0);
            }
            index
        };

        // Search phase: read-only graph navigation with exact distances.
        let core = self.core.read();

        let mut curr_obj = self.entry_point.load(MemOrdering::Acquire) as usize;
        let mut curr_dist = core.exact_distance(vector, curr_obj, self.distance);

        let mut curr_level = core.nodes[curr_obj].level;
        while curr_level > level {
            let (obj, dist) =
                self.greedy_step(&core, vector, curr_obj, curr_dist, curr_level, Some(index));
            curr_obj = obj;
            curr_dist = dist;
            curr_level -= 1;
            if curr_obj < core.nodes.len() {
                curr_level = curr_level.min(core.nodes[curr_obj].level);
            }
        }

        let top = level.min(core.nodes[curr_obj].level);
        let mut neighbors_per_level: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        let mut visited = self.visited.acquire(core.nodes.len());

        for lc in (0..=top).rev() {
            let candidates = self.search_level_exact(
                &core,
                vector,
                curr_obj,
                self.config.ef_construction,
                lc,
                &mut visited,
                Some(index),
            );

            let selected = if self.config.use_heuristic_selection
                && candidates.len() > self.config.m
            {
                self.select_neighbors_heuristic(&core, &candidates)
            } else {
                candidates.iter().take(self.config.m).map(|c| c.id).collect()
            };

            neighbors_per_level[lc] = selected;

            if let Some(first) = candidates.first() {
                curr_obj = first.id as usize;
            }
        }
        self.visited.release(visited);

        // Write phase: publish the new node's links, then back-link its
        // neighbors through their own locks, lowest id first.
        {
            let mut own = core.nodes[index].links.write();
            for (lc, selected) in neighbors_per_level.iter().enumerate() {
                own.levels[lc].replace(selected.iter().copied());
            }
        }

        for (lc, selected) in neighbors_per_level.iter().enumerate() {
            let guards = Self::lock_links_ordered(&core, selected);
            for (neighbor, mut guard) in guards {
                Self::connect_locked(
                    &core,
                    neighbor,
                    &mut guard,
                    index as u32,
                    lc,
                    self.config.m,
                    self.distance,
                );
            }
        }

        // Re-validate the entry point: another insert may have published a
        // taller node since the search phase began.
        loop {
            let current = self.entry_point.load(MemOrdering::Acquire);
            let current_level = core.nodes[current as usize].level;
            if level <= current_level {
                break;
            }
            if self
                .entry_point
                .compare_exchange(
                    current,
                    index as i64,
                    MemOrdering::AcqRel,
                    MemOrdering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }

        self.size.fetch_add(1, MemOrdering::Release);
        Ok(index)
    }

    /// Insert a batch, collecting per-item failures instead of aborting.
    pub fn add_batch(&self, labels: &[Label], vectors: &[f32]) -> BatchAddReport {
        let mut report = BatchAddReport::default();
        for (i, label) in labels.iter().enumerate() {
            let row = &vectors[i * self.dim..(i + 1) * self.dim];
            match self.add(*label, row) {
                Ok(_) => report.added += 1,
                Err(_) => report.failed.push(i),
            }
        }
        report
    }

    /// Acquire the link locks for a set of nodes in ascending id order
    /// (sorted and deduplicated) so concurrent writers cannot deadlock.
    fn lock_links_ordered<'a>(
        core: &'a PqCore,
        ids: &[u32],
    ) -> Vec<(usize, RwLockWriteGuard<'a, NodeLinks>)> {
        let mut sorted: Vec<u32> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        sorted
            .into_iter()
            .filter(|&id| (id as usize) < core.nodes.len())
            .map(|id| (id as usize, core.nodes[id as usize].links.write()))
            .collect()
    }

    /// Append a back-edge under an already-held link lock, re-pruning to
    /// the `m` exact-nearest when the list overflows.
    fn connect_locked(
        core: &PqCore,
        neighbor: usize,
        links: &mut NodeLinks,
        new_id: u32,
        level: usize,
        m: usize,
        distance: fn(&[f32], &[f32]) -> f32,
    ) {
        if level >= links.levels.len() || links.levels[level].as_slice().contains(&new_id) {
            return;
        }
        links.levels[level].push(new_id);
        if links.levels[level].len() <= m {
            return;
        }

        let Some(node_row) = core.store.get(neighbor) else {
            return;
        };
        let mut scored: Vec<ScoredNode> = links.levels[level]
            .as_slice()
            .iter()
            .map(|&n| ScoredNode {
                id: n,
                distance: core.exact_distance(node_row, n as usize, distance),
            })
            .collect();
        scored.sort();
        links.levels[level].replace(scored.into_iter().take(m).map(|s| s.id));
    }

    /// Greedy descent step with exact distances. `skip` excludes the
    /// in-flight node during its own insert.
    fn greedy_step(
        &self,
        core: &PqCore,
        query: &[f32],
        mut curr_obj: usize,
        mut curr_dist: f32,
        level: usize,
        skip: Option<usize>,
    ) -> (usize, f32) {
        let mut changed = true;
        while changed {
            changed = false;
            if curr_obj >= core.nodes.len() {
                break;
            }
            let node = &core.nodes[curr_obj];
            if level > node.level {
                break;
            }
            let links = node.links.read();
            for &neighbor in links.levels[level].as_slice() {
                if Some(neighbor as usize) == skip {
                    continue;
                }
                let d = core.exact_distance(query, neighbor as usize, self.distance);
                if d < curr_dist {
                    curr_dist = d;
                    curr_obj = neighbor as usize;
                    changed = true;
                }
            }
        }
        (curr_obj, curr_dist)
    }

    /// Greedy descent step with ADC distances from a precomputed table.
    fn greedy_step_adc(
        &self,
        core: &PqCore,
        table: &[f32],
        pq: &ProductQuantizer,
        mut curr_obj: usize,
        mut curr_dist: f32,
        level: usize,
    ) -> (usize, f32) {
        let m = self.config.pq_subvectors;
        let mut changed = true;
        while changed {
            changed = false;
            if curr_obj >= core.nodes.len() {
                break;
            }
            let node = &core.nodes[curr_obj];
            if level > node.level {
                break;
            }
            let links = node.links.read();
            for &neighbor in links.levels[level].as_slice() {
                let d = pq.adc_distance(table, core.code_row(neighbor as usize, m));
                if d < curr_dist {
                    curr_dist = d;
                    curr_obj = neighbor as usize;
                    changed = true;
                }
            }
        }
        (curr_obj, curr_dist)
    }

    /// Beam search at one level with exact distances.
    ///
    /// `skip` excludes the in-flight node during its own insert.
    #[allow(clippy::too_many_arguments)]
    fn search_level_exact(
        &self,
        core: &PqCore,
        query: &[f32],
        entry: usize,
        ef: usize,
        level: usize,
        visited: &mut VisitedSet,
        skip: Option<usize>,
    ) -> Vec<ScoredNode> {
        visited.clear();
        visited.ensure_capacity(core.nodes.len());

        let entry_dist = core.exact_distance(query, entry, self.distance);
        if entry_dist == f32::MAX {
            return Vec::new();
        }

        let mut candidates: BinaryHeap<Reverse<ScoredNode>> = BinaryHeap::with_capacity(ef);
        let mut results: BinaryHeap<ScoredNode> = BinaryHeap::with_capacity(ef + 1);

        candidates.push(Reverse(ScoredNode {
            id: entry as u32,
            distance: entry_dist,
        }));
        results.push(ScoredNode {
            id: entry as u32,
            distance: entry_dist,
        });
        visited.insert(entry);
        if let Some(skip) = skip {
            visited.insert(skip);
        }

        let mut lower_bound = entry_dist;

        while let Some(Reverse(current)) = candidates.pop() {
            if current.distance > lower_bound && results.len() >= ef {
                break;
            }
            let curr_id = current.id as usize;
            if curr_id >= core.nodes.len() {
                continue;
            }
            let node = &core.nodes[curr_id];
            if level >= node.level + 1 {
                continue;
            }

            let links = node.links.read();
            let neighbors = links.levels[level].as_slice();
            for &n in neighbors.iter().take(8) {
                core.store.prefetch(n as usize);
            }

            for (ni, &neighbor) in neighbors.iter().enumerate() {
                if ni + 8 < neighbors.len() {
                    core.store.prefetch(neighbors[ni + 8] as usize);
                }

                let neighbor = neighbor as usize;
                if !visited.insert(neighbor) {
                    continue;
                }

                let d = core.exact_distance(query, neighbor, self.distance);
                if results.len() < ef || d < lower_bound {
                    candidates.push(Reverse(ScoredNode {
                        id: neighbor as u32,
                        distance: d,
                    }));
                    results.push(ScoredNode {
                        id: neighbor as u32,
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

    /// Diversity-aware neighbor selection with exact distances.
    fn select_neighbors_heuristic(&self, core: &PqCore, candidates: &[ScoredNode]) -> Vec<u32> {
        let m = self.config.m;
        if candidates.len() <= m {
            return candidates.iter().map(|c| c.id).collect();
        }

        let max_candidates = (m * 6).min(candidates.len());
        for c in candidates.iter().take(max_candidates) {
            core.store.prefetch(c.id as usize);
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

            let Some(chosen_row) = core.store.get(candidates[best].id as usize) else {
                continue;
            };
            for j in 0..max_candidates {
                if selected[j] {
                    continue;
                }
                let d = core.exact_distance(chosen_row, candidates[j].id as usize, self.distance);
                if d < min_dist_to_selected[j] {
                    min_dist_to_selected[j] = d;
                }
            }
        }

        result
    }

    /// Search for the `k` nearest neighbors of `query`.
    ///
    /// Upper layers navigate with ADC distances from a precomputed query
    /// table; level 0 uses exact distances over an enlarged pool, and the
    /// top `20·k` candidates are exactly re-ranked before truncation.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let data_size = self.size.load(MemOrdering::Acquire);
        if data_size == 0 || k == 0 {
            return Vec::new();
        }
        let quantizer = self.quantizer.read();
        let Some(pq) = quantizer.as_ref() else {
            return Vec::new();
        };

        let core = self.core.read();
        let entry = self.entry_point.load(MemOrdering::Acquire);
        if entry < 0 {
            return Vec::new();
        }

        let table = pq.build_distance_table(query);

        let mut curr_obj = entry as usize;
        let mut curr_dist = pq.adc_distance(
            &table,
            core.code_row(curr_obj, self.config.pq_subvectors),
        );

        let mut curr_level = core.nodes[curr_obj].level;
        while curr_level > 0 {
            let (obj, dist) = self.greedy_step_adc(&core, &table, pq, curr_obj, curr_dist, curr_level);
            curr_obj = obj;
            curr_dist = dist;
            curr_level -= 1;
            if curr_obj < core.nodes.len() {
                curr_level = curr_level.min(core.nodes[curr_obj].level);
            }
        }

        let ef = self.config.level0_ef(k, data_size);
        let mut visited = self.visited.acquire(core.nodes.len());
        let pool = self.search_level_exact(&core, query, curr_obj, ef, 0, &mut visited, None);
        self.visited.release(visited);

        // Exact re-rank of the head of the pool restores full precision
        let depth = self.config.rerank_depth(k).min(pool.len());
        let mut refined: Vec<ScoredNode> = pool[..depth]
            .iter()
            .map(|s| ScoredNode {
                id: s.id,
                distance: core.exact_distance(query, s.id as usize, self.distance),
            })
            .collect();
        refined.sort();

        refined
            .into_iter()
            .take(k)
            .map(|s| SearchResult::new(core.store.label(s.id as usize), s.distance))
            .collect()
    }

    /// Search many queries, partitioned across the worker pool.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Vec<Vec<SearchResult>> {
        let n_queries = queries.len() / self.dim;
        if n_queries == 0 {
            return Vec::new();
        }

        let chunk = n_queries.div_ceil(self.num_threads.load(MemOrdering::Relaxed));
        queries
            .par_chunks(chunk * self.dim)
            .flat_map_iter(|block| {
                block
                    .chunks_exact(self.dim)
                    .map(|q| self.search(q, k))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Compression ratio of the codes versus raw f32 rows.
    pub fn get_compression_ratio(&self) -> f32 {
        (self.dim * std::mem::size_of::<f32>()) as f32 / self.config.pq_subvectors as f32
    }

    /// Estimated heap usage: store, codes, codebooks, and adjacency pools.
    pub fn get_memory_usage(&self) -> usize {
        let core = self.core.read();
        let links: usize = core
            .nodes
            .iter()
            .map(|n| {
                n.links
                    .read()
                    .levels
                    .iter()
                    .map(NeighborList::capacity_bytes)
                    .sum::<usize>()
            })
            .sum();
        let codebooks = self
            .quantizer
            .read()
            .as_ref()
            .map(|pq| pq.memory_usage())
            .unwrap_or(0);
        core.store.memory_usage() + core.codes.len() + codebooks + links
    }

    /// Snapshot of the index state for monitoring.
    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            num_vectors: self.size.load(MemOrdering::Acquire),
            capacity: self.capacity(),
            dimension: self.dim,
            memory_bytes: self.get_memory_usage(),
            compression_ratio: self.get_compression_ratio(),
            num_subvectors: self.config.pq_subvectors,
            ..IndexStatistics::default()
        }
    }
}

impl AnnIndex for HnswPqIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        HnswPqIndex::search(self, query, k)
    }

    fn len(&self) -> usize {
        self.size.load(MemOrdering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn capacity(&self) -> usize {
        self.core.read().store.capacity()
    }

    fn memory_usage(&self) -> usize {
        self.get_memory_usage()
    }
}

impl TrainableIndex for HnswPqIndex {
    fn train(&mut self, samples: &[f32]) -> Result<()> {
        HnswPqIndex::train(self, samples)
    }

    fn is_trained(&self) -> bool {
        HnswPqIndex::is_trained(self)
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
    fn test_add_before_train_fails() {
        let index = HnswPqIndex::new(32, 100).unwrap();
        let err = index.add(Label::new(0), &[0.0; 32]).unwrap_err();
        assert!(matches!(err, ForgeAnnError::NotTrained));
    }

    #[test]
    fn test_search_before_train_is_empty() {
        let index = HnswPqIndex::new(32, 100).unwrap();
        assert!(index.search(&[0.0; 32], 5).is_empty());
    }

    #[test]
    fn test_dimension_must_divide() {
        assert!(HnswPqIndex::new(30, 100).is_err());
    }

    #[test]
    fn test_train_add_search() {
        let dim = 32;
        let data = random_data(300, dim, 11);
        let index = HnswPqIndex::new(dim, 400).unwrap();
        index.train(&data).unwrap();

        for i in 0..300 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }
        assert_eq!(index.len(), 300);

        // Self-queries come back first with near-zero exact distance
        for i in (0..300).step_by(37) {
            let query = &data[i * dim..(i + 1) * dim];
            let results = index.search(query, 3);
            assert!(!results.is_empty());
            assert_eq!(results[0].label, Label::new(i as i32));
            assert!(results[0].distance < 1e-5);
        }
    }

    #[test]
    fn test_results_sorted_and_bounded() {
        let dim = 16;
        let data = random_data(200, dim, 13);
        let index = HnswPqIndex::new(dim, 200).unwrap();
        index.train(&data).unwrap();
        for i in 0..200 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let query = random_data(1, dim, 99);
        let results = index.search(&query, 10);
        assert!(results.len() <= 10);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_compression_ratio() {
        let index = HnswPqIndex::new(128, 10).unwrap();
        assert!((index.get_compression_ratio() - 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_add_collects_failures() {
        let dim = 16;
        let data = random_data(8, dim, 15);
        let index = HnswPqIndex::new(dim, 4).unwrap();
        index.train(&data).unwrap();

        let labels: Vec<Label> = (0..8).map(Label::new).collect();
        let report = index.add_batch(&labels, &data);
        assert_eq!(report.added, 4);
        assert_eq!(report.failed, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_neighbor_lists_bounded() {
        let dim = 16;
        let config = HnswPqConfig {
            m: 6,
            ef_construction: 24,
            ..HnswPqConfig::default()
        };
        let data = random_data(250, dim, 17);
        let index = HnswPqIndex::with_config(dim, 250, config).unwrap();
        index.train(&data).unwrap();
        for i in 0..250 {
            index
                .add(Label::new(i as i32), &data[i * dim..(i + 1) * dim])
                .unwrap();
        }

        let core = index.core.read();
        for node in &core.nodes {
            let links = node.links.read();
            for level in &links.levels {
                assert!(level.len() <= 6);
            }
        }
    }
}
