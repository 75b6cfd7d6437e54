//! forge-ann: in-process approximate nearest-neighbor search in Rust.
//!
//! This crate indexes dense, fixed-dimension f32 vectors under opaque
//! integer labels and answers top-k nearest queries under a squared
//! Euclidean or cosine metric. It provides SIMD-optimized distance
//! kernels, a shared append-only vector store, and a family of index
//! structures with different speed/recall/memory tradeoffs.
//!
//! # Features
//!
//! - **SIMD distance kernels**: AVX2/NEON with runtime dispatch cached in
//!   a process-wide function-pointer table
//! - **HNSW**: layered proximity graph with concurrent insert/search
//! - **Product Quantization**: 16-64x compression with asymmetric
//!   distance computation
//! - **HNSW+PQ hybrid**: compressed navigation with exact re-ranking
//! - **IVF**: coarse partitioning with tunable probe counts
//! - **LSH and random-projection trees**: hashing and tree-based siblings
//! - **Persistence**: versioned, checksummed save/load for HNSW and PQ
//!
//! # Quick Start
//!
//! ```
//! use forge_ann::{HnswIndex, Label};
//!
//! let index = HnswIndex::new(128, 1_000).unwrap();
//! index.add(Label::new(7), &[0.5; 128]).unwrap();
//!
//! let results = index.search(&[0.5; 128], 5);
//! assert_eq!(results[0].label, Label::new(7));
//! ```
//!
//! # Choosing an Index
//!
//! | Index         | Best For                            | Memory | Recall |
//! |---------------|-------------------------------------|--------|--------|
//! | `HnswIndex`   | Low latency, high recall            | High   | Best   |
//! | `HnswPqIndex` | Large scale with bounded memory     | Low    | Good   |
//! | `IvfIndex`    | Medium scale, simple tuning         | Medium | Good   |
//! | `PqIndex`     | Maximum compression                 | Lowest | Fair   |
//! | `LshIndex` / `RpTreeIndex` | Cheap builds, modest recall | Medium | Fair |
//! | `BruteForceIndex` | Small sets, ground truth        | High   | 100%   |
//!
//! Codec-based indexes (`PqIndex`, `IvfIndex`, `HnswPqIndex`) must be
//! trained on a sample before vectors can be added. Tree-based indexes
//! require `build()` after insertion.
//!
//! # Modules
//!
//! - [`index`]: index implementations and shared traits
//! - [`distance`]: scalar and SIMD distance kernels
//! - [`pq`]: the product-quantization codec
//! - [`store`]: the append-only vector store
//! - [`registry`]: process-wide handle registry for binding layers
//! - [`persistence`]: versioned save/load
//! - [`dataset`]: synthetic data and recall evaluation

pub mod constants;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod kmeans;
pub mod metrics;
pub mod persistence;
pub mod pq;
pub mod registry;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use dataset::{recall_at_k, Dataset};
pub use distance::DistanceMetric;
pub use error::{ForgeAnnError, Result};
pub use index::{
    AnnIndex, BatchAddReport, BruteForceIndex, BuildableIndex, HnswConfig, HnswIndex,
    HnswPqConfig, HnswPqIndex, IvfConfig, IvfIndex, LshConfig, LshIndex, PqConfig, PqIndex,
    RpTreeConfig, RpTreeIndex, SearchResult, TrainableIndex,
};
pub use kmeans::KMeans;
pub use metrics::IndexStatistics;
pub use persistence::Persistable;
pub use pq::ProductQuantizer;
pub use registry::AnyIndex;
pub use store::VectorStore;
pub use types::{Dimension, Label};
