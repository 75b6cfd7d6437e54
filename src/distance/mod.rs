//! Distance computation module providing scalar and SIMD implementations.
//!
//! The public API dispatches through a table of function pointers resolved
//! once per process from CPU feature detection ([`simd::kernels`]).

pub mod batch;
pub mod scalar;
pub mod simd;

// Re-export the auto-dispatching functions as the primary API
pub use simd::{cosine_distance, dot_product, euclidean_distance_squared, isa_name, kernels};

use serde::{Deserialize, Serialize};

/// Supported distance metrics for similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance: sum((a[i] - b[i])^2).
    /// The square root is skipped since only relative ordering matters.
    #[default]
    EuclideanSquared,
    /// Cosine distance: 1 - dot(a, b).
    /// Assumes unit-normalized inputs; with non-unit inputs it degrades to
    /// "one minus dot product" and the caller is responsible for
    /// normalization.
    Cosine,
}

impl DistanceMetric {
    /// Compute the distance between two vectors using this metric.
    ///
    /// # Panics
    /// Panics if the vectors have different dimensions.
    #[inline]
    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::EuclideanSquared => euclidean_distance_squared(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }

    /// The raw kernel behind this metric, for hot loops that want to avoid
    /// re-matching per call.
    #[inline]
    pub fn kernel(&self) -> fn(&[f32], &[f32]) -> f32 {
        let table = kernels();
        match self {
            DistanceMetric::EuclideanSquared => table.euclidean_sq,
            DistanceMetric::Cosine => table.cosine,
        }
    }
}
