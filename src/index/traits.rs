//! Common traits for index implementations.
//!
//! These traits provide a unified surface over the index kinds, so generic
//! code (oracles, evaluation harnesses, the handle registry) can work with
//! any of them.

use crate::error::Result;
use crate::types::Label;

/// A search result: an external label and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// The label supplied when the matched vector was added.
    pub label: Label,
    /// The distance from the query vector under the index's metric.
    pub distance: f32,
}

impl SearchResult {
    /// Create a new SearchResult.
    #[inline]
    pub fn new(label: impl Into<Label>, distance: f32) -> Self {
        Self {
            label: label.into(),
            distance,
        }
    }

    /// Convert to a raw (i32, f32) tuple.
    #[inline]
    pub fn to_tuple(self) -> (i32, f32) {
        (self.label.0, self.distance)
    }
}

impl From<(i32, f32)> for SearchResult {
    fn from(tuple: (i32, f32)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<SearchResult> for (i32, f32) {
    fn from(result: SearchResult) -> Self {
        result.to_tuple()
    }
}

/// Outcome of a batch insertion.
///
/// Batch adds collect per-item failures and keep going rather than
/// aborting: `failed` holds the zero-based positions (within the batch) of
/// the items that could not be inserted.
#[derive(Debug, Clone, Default)]
pub struct BatchAddReport {
    /// Number of vectors successfully added.
    pub added: usize,
    /// Zero-based batch positions of failed inserts.
    pub failed: Vec<usize>,
}

impl BatchAddReport {
    /// True if every item in the batch was inserted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Common interface for vector indexes.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`. Search takes `&self` and is safe
/// to call from multiple threads; mutation surfaces take `&mut self`.
pub trait AnnIndex: Send + Sync {
    /// Search for the k nearest neighbors of `query`.
    ///
    /// Returns at most `min(k, len)` results in ascending distance order.
    /// An index that cannot answer (empty, untrained, unbuilt) returns an
    /// empty vector rather than failing.
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult>;

    /// Number of vectors in the index.
    fn len(&self) -> usize;

    /// True if the index contains no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality bound at construction.
    fn dimension(&self) -> usize;

    /// Maximum number of vectors this index can hold.
    fn capacity(&self) -> usize;

    /// Estimated heap memory held by the index, in bytes.
    fn memory_usage(&self) -> usize;
}

/// Extension trait for indexes that require training before insertion.
///
/// Codec-based indexes (PQ, IVF, HNSW+PQ) learn their quantizers from a
/// training sample; `add` before `train` fails with `NotTrained`.
pub trait TrainableIndex: AnnIndex {
    /// Train on `samples` (row-major, `samples.len() / dimension` rows).
    ///
    /// # Errors
    /// `EmptyVectorSet` when no samples are provided; parameter validation
    /// errors per index kind.
    fn train(&mut self, samples: &[f32]) -> Result<()>;

    /// True once training has completed.
    fn is_trained(&self) -> bool;
}

/// Extension trait for indexes built in a separate pass after insertion.
///
/// Tree-based indexes accumulate vectors first and construct their search
/// structure in `build()`; searching before that returns no results.
pub trait BuildableIndex: AnnIndex {
    /// Construct the search structure over the vectors added so far.
    fn build(&mut self) -> Result<()>;

    /// True once `build()` has completed.
    fn is_built(&self) -> bool;
}
