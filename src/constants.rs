//! Named constants for configuration values.
//!
//! This module centralizes magic numbers and default values used throughout
//! the codebase, making them easier to find, document, and tune.

/// Constants for Product Quantization (PQ).
pub mod pq {
    /// Default number of subvectors.
    pub const DEFAULT_SUBVECTORS: usize = 8;

    /// Default code width in bits (256 centroids per subspace).
    pub const DEFAULT_BITS: usize = 8;

    /// Default number of k-means iterations for codebook training.
    pub const DEFAULT_ITERATIONS: usize = 25;

    /// Base RNG seed for codebook training.
    /// Subspace `m` trains with seed `TRAIN_SEED_BASE + m` so codebooks are
    /// reproducible and decorrelated across subspaces.
    pub const TRAIN_SEED_BASE: u64 = 42;
}

/// Constants for IVF coarse quantization.
pub mod ivf {
    /// Default number of posting lists.
    pub const DEFAULT_LISTS: usize = 100;

    /// Default number of lists probed per query.
    pub const DEFAULT_PROBES: usize = 10;

    /// Default number of k-means iterations for the coarse quantizer.
    pub const DEFAULT_ITERATIONS: usize = 25;

    /// RNG seed for coarse quantizer training.
    pub const TRAIN_SEED: u64 = 42;
}

/// Constants for HNSW graph indexes.
pub mod hnsw {
    /// Default max connections per node per level.
    pub const DEFAULT_M: usize = 32;

    /// Default candidate pool size during construction.
    pub const DEFAULT_EF_CONSTRUCTION: usize = 64;

    /// Default candidate pool size during search.
    pub const DEFAULT_EF_SEARCH: usize = 64;

    /// Default cap on node levels.
    pub const DEFAULT_MAX_LEVEL: usize = 16;

    /// Additive slack applied to `k` when scaling the search pool.
    pub const DEFAULT_EF_SEARCH_DELTA: usize = 32;

    /// Default multiplier bounding beam-search expansions (`ef * this`).
    pub const DEFAULT_MAX_EXPANSIONS_MULTIPLIER: usize = 4;

    /// Default overflow factor bounding adjacency-list scratch growth.
    pub const DEFAULT_PRUNE_OVERFLOW_FACTOR: usize = 2;

    /// Minimum number of recycled visited sets kept per index.
    pub const MIN_VISITED_POOL: usize = 4;
}

/// Constants for LSH indexes.
pub mod lsh {
    /// Default number of hash tables.
    pub const DEFAULT_TABLES: usize = 10;

    /// Default number of hyperplane hashes per table (signature bits).
    pub const DEFAULT_HASHES: usize = 20;
}

/// Constants for random-projection tree indexes.
pub mod rp_tree {
    /// Default number of trees.
    pub const DEFAULT_TREES: usize = 10;

    /// Partitioning stops once a node holds this many points or fewer.
    pub const LEAF_SIZE: usize = 10;
}

/// Constants for cache optimization.
pub mod cache {
    /// Number of f32 lanes covered by one prefetch hint (a cache line).
    pub const PREFETCH_STRIDE: usize = 16;

    /// How many vectors ahead sequential scans prefetch.
    pub const PREFETCH_DISTANCE: usize = 3;

    /// Chunk size for parallel brute force search.
    pub const BRUTE_FORCE_CHUNK_SIZE: usize = 1000;
}

/// Constants for batch APIs.
pub mod workers {
    /// Default worker count for batch search partitioning.
    pub const DEFAULT_NUM_THREADS: usize = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pq_constants() {
        assert_eq!(1usize << pq::DEFAULT_BITS, 256);
        assert_eq!(pq::DEFAULT_SUBVECTORS, 8);
    }

    #[test]
    fn test_prefetch_stride_covers_cache_line() {
        assert_eq!(cache::PREFETCH_STRIDE * std::mem::size_of::<f32>(), 64);
    }
}
