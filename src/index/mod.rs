//! Index implementations for vector search.

pub mod brute_force;
pub mod hnsw;
pub mod hnsw_pq;
pub mod ivf;
pub mod lsh;
pub mod pq;
pub mod rp_tree;
pub mod traits;
pub mod visited;

pub use brute_force::BruteForceIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use hnsw_pq::{HnswPqConfig, HnswPqIndex};
pub use ivf::{IvfConfig, IvfIndex};
pub use lsh::{LshConfig, LshIndex};
pub use pq::{PqConfig, PqIndex};
pub use rp_tree::{RpTreeConfig, RpTreeIndex};
pub use traits::{AnnIndex, BatchAddReport, BuildableIndex, SearchResult, TrainableIndex};
