//! Brute force index for exact nearest neighbor search.
//!
//! Computes distances to every stored vector and returns the k closest.
//! Serves as the ground-truth baseline the approximate indexes are
//! measured against.

use crate::constants::cache::{BRUTE_FORCE_CHUNK_SIZE, PREFETCH_DISTANCE};
use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::index::traits::{AnnIndex, BatchAddReport, SearchResult};
use crate::store::VectorStore;
use crate::types::Label;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored candidate for heap-based top-k selection.
#[derive(Clone, Copy)]
struct ScoredVector {
    index: u32,
    distance: f32,
}

impl PartialEq for ScoredVector {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for ScoredVector {}

impl PartialOrd for ScoredVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Exact linear-scan index.
pub struct BruteForceIndex {
    store: VectorStore,
    metric: DistanceMetric,
}

impl BruteForceIndex {
    /// Create an index with the default (squared Euclidean) metric.
    pub fn new(dimension: usize, capacity: usize) -> Result<Self> {
        Self::with_metric(dimension, capacity, DistanceMetric::EuclideanSquared)
    }

    /// Create an index with an explicit distance metric.
    pub fn with_metric(dimension: usize, capacity: usize, metric: DistanceMetric) -> Result<Self> {
        Ok(Self {
            store: VectorStore::new(dimension, capacity)?,
            metric,
        })
    }

    /// Add a vector.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        self.store.add(label, vector)
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

    /// Exact top-k by sequential scan with prefetching.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let size = self.store.len();
        if size == 0 || k == 0 {
            return Vec::new();
        }

        let kernel = self.metric.kernel();
        let mut heap: BinaryHeap<ScoredVector> = BinaryHeap::with_capacity(k + 1);

        for i in 0..size {
            if i + PREFETCH_DISTANCE < size {
                self.store.prefetch(i + PREFETCH_DISTANCE);
            }
            let Some(row) = self.store.get(i) else { continue };
            let distance = kernel(query, row);
            push_top_k(&mut heap, ScoredVector { index: i as u32, distance }, k);
        }

        self.finish(heap)
    }

    /// Exact top-k with rayon-parallel chunked scanning.
    pub fn search_parallel(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        let size = self.store.len();
        if size == 0 || k == 0 {
            return Vec::new();
        }

        let kernel = self.metric.kernel();
        let chunks: Vec<usize> = (0..size).collect();
        let heap = chunks
            .par_chunks(BRUTE_FORCE_CHUNK_SIZE)
            .map(|chunk| {
                let mut local: BinaryHeap<ScoredVector> = BinaryHeap::with_capacity(k + 1);
                for &i in chunk {
                    let Some(row) = self.store.get(i) else { continue };
                    let distance = kernel(query, row);
                    push_top_k(&mut local, ScoredVector { index: i as u32, distance }, k);
                }
                local
            })
            .reduce(
                || BinaryHeap::with_capacity(k + 1),
                |mut a, b| {
                    for item in b {
                        push_top_k(&mut a, item, k);
                    }
                    a
                },
            );

        self.finish(heap)
    }

    /// Batch search: each query dispatched independently in parallel.
    pub fn search_batch(&self, queries: &[f32], k: usize) -> Vec<Vec<SearchResult>> {
        let dim = self.store.dim();
        queries
            .par_chunks_exact(dim)
            .map(|q| self.search(q, k))
            .collect()
    }

    fn finish(&self, heap: BinaryHeap<ScoredVector>) -> Vec<SearchResult> {
        let mut results: Vec<ScoredVector> = heap.into_vec();
        results.sort();
        results
            .into_iter()
            .map(|sv| SearchResult::new(self.store.label(sv.index as usize), sv.distance))
            .collect()
    }
}

#[inline]
fn push_top_k(heap: &mut BinaryHeap<ScoredVector>, item: ScoredVector, k: usize) {
    if heap.len() < k {
        heap.push(item);
    } else if let Some(worst) = heap.peek() {
        if item.distance < worst.distance {
            heap.pop();
            heap.push(item);
        }
    }
}

impl AnnIndex for BruteForceIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        BruteForceIndex::search(self, query, k)
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
        self.store.memory_usage()
    }
}
