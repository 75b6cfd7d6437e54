//! Index statistics for monitoring and capacity planning.
//!
//! Codec-based indexes expose a `statistics()` snapshot describing their
//! current occupancy, memory footprint, and compression; IVF-family
//! indexes additionally report posting-list balance.

/// Statistics about the current state of an index.
#[derive(Clone, Debug, Default)]
pub struct IndexStatistics {
    /// Number of indexed vectors.
    pub num_vectors: usize,
    /// Fixed capacity declared at construction.
    pub capacity: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Estimated memory usage in bytes.
    pub memory_bytes: usize,
    /// Compression ratio (raw size / compressed size); 0 when the index
    /// stores raw vectors only.
    pub compression_ratio: f32,
    /// Number of PQ subvectors; 0 without a codec.
    pub num_subvectors: usize,
    /// Number of IVF posting lists; 0 without coarse partitioning.
    pub num_partitions: usize,
    /// Smallest posting list.
    pub partition_size_min: usize,
    /// Largest posting list.
    pub partition_size_max: usize,
    /// Mean posting-list size.
    pub partition_size_mean: f32,
    /// Standard deviation of posting-list sizes.
    pub partition_size_std: f32,
    /// Probes per query for IVF-family indexes.
    pub n_probes: usize,
}

impl IndexStatistics {
    /// Create a human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "IndexStatistics:\n  \
             Vectors: {} / {} (dim {})\n  \
             Memory: {:.2} MB",
            self.num_vectors,
            self.capacity,
            self.dimension,
            self.memory_bytes as f64 / (1024.0 * 1024.0),
        );
        if self.compression_ratio > 0.0 {
            out.push_str(&format!(
                "\n  Compression: {:.1}x ({} subvectors)",
                self.compression_ratio, self.num_subvectors
            ));
        }
        if self.num_partitions > 0 {
            out.push_str(&format!(
                "\n  Partitions: {} (min={}, max={}, mean={:.1}, std={:.1}), nprobe={}",
                self.num_partitions,
                self.partition_size_min,
                self.partition_size_max,
                self.partition_size_mean,
                self.partition_size_std,
                self.n_probes
            ));
        }
        out
    }
}
