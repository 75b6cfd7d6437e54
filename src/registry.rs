//! Process-wide handle registry for index instances.
//!
//! Host-language binding layers deal in opaque integer handles rather than
//! Rust references. The registry maps a handle to a shared, lock-guarded
//! index: `register` hands out the next handle, `get` clones the shared
//! pointer (extending the index's lifetime to the call), `unregister`
//! removes ownership. Construction is lazy on first use and teardown is a
//! matter of dropping the last clone.

use crate::error::Result;
use crate::index::{
    AnnIndex, BruteForceIndex, HnswIndex, HnswPqIndex, IvfIndex, LshIndex, PqIndex, RpTreeIndex,
    SearchResult,
};
use crate::types::Label;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Tagged union over the index kinds, for runtime dispatch at the handle
/// boundary.
pub enum AnyIndex {
    /// HNSW graph index.
    Hnsw(HnswIndex),
    /// HNSW + PQ hybrid index.
    HnswPq(HnswPqIndex),
    /// Flat PQ index.
    Pq(PqIndex),
    /// Inverted-file index.
    Ivf(IvfIndex),
    /// Locality-sensitive hashing index.
    Lsh(LshIndex),
    /// Random-projection tree index.
    RpTree(RpTreeIndex),
    /// Exact linear-scan index.
    BruteForce(BruteForceIndex),
}

impl AnyIndex {
    /// Add a vector.
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        match self {
            AnyIndex::Hnsw(i) => i.add(label, vector),
            AnyIndex::HnswPq(i) => i.add(label, vector),
            AnyIndex::Pq(i) => i.add(label, vector),
            AnyIndex::Ivf(i) => i.add(label, vector),
            AnyIndex::Lsh(i) => i.add(label, vector),
            AnyIndex::RpTree(i) => i.add(label, vector),
            AnyIndex::BruteForce(i) => i.add(label, vector),
        }
    }

    /// Train, where the kind supports it.
    ///
    /// # Errors
    /// `NotSupported` for kinds without a training step.
    pub fn train(&mut self, samples: &[f32]) -> Result<()> {
        match self {
            AnyIndex::HnswPq(i) => i.train(samples),
            AnyIndex::Pq(i) => i.train(samples),
            AnyIndex::Ivf(i) => i.train(samples),
            _ => Err(crate::error::ForgeAnnError::not_supported(
                "this index kind has no training step",
            )),
        }
    }

    /// Build, where the kind supports it.
    ///
    /// # Errors
    /// `NotSupported` for kinds without a build step.
    pub fn build(&mut self) -> Result<()> {
        match self {
            AnyIndex::RpTree(i) => i.build(),
            _ => Err(crate::error::ForgeAnnError::not_supported(
                "this index kind has no build step",
            )),
        }
    }

    /// Search for the k nearest neighbors.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        self.as_ann().search(query, k)
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.as_ann().len()
    }

    /// True if no vectors are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension bound at construction.
    pub fn dimension(&self) -> usize {
        self.as_ann().dimension()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.as_ann().capacity()
    }

    /// Estimated heap usage.
    pub fn memory_usage(&self) -> usize {
        self.as_ann().memory_usage()
    }

    fn as_ann(&self) -> &dyn AnnIndex {
        match self {
            AnyIndex::Hnsw(i) => i,
            AnyIndex::HnswPq(i) => i,
            AnyIndex::Pq(i) => i,
            AnyIndex::Ivf(i) => i,
            AnyIndex::Lsh(i) => i,
            AnyIndex::RpTree(i) => i,
            AnyIndex::BruteForce(i) => i,
        }
    }
}

/// A shared, lock-guarded registry entry.
pub type SharedIndex = Arc<RwLock<AnyIndex>>;

static REGISTRY: OnceLock<Mutex<HashMap<u64, SharedIndex>>> = OnceLock::new();
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<u64, SharedIndex>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register an index, returning its opaque handle.
pub fn register(index: AnyIndex) -> u64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    registry()
        .lock()
        .insert(handle, Arc::new(RwLock::new(index)));
    handle
}

/// Look up a handle, cloning the shared pointer.
///
/// The clone keeps the index alive even if the handle is unregistered
/// while the caller still works with it.
pub fn get(handle: u64) -> Option<SharedIndex> {
    registry().lock().get(&handle).cloned()
}

/// Remove a handle, returning its entry if it existed.
///
/// Outstanding clones from [`get`] keep the index alive until dropped.
pub fn unregister(handle: u64) -> Option<SharedIndex> {
    registry().lock().remove(&handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_get_unregister() {
        let index = AnyIndex::Hnsw(HnswIndex::new(8, 10).unwrap());
        let handle = register(index);

        let shared = get(handle).expect("handle resolves");
        shared.write().add(Label::new(1), &[0.5; 8]).unwrap();
        assert_eq!(shared.read().len(), 1);

        assert!(unregister(handle).is_some());
        assert!(get(handle).is_none());
        assert!(unregister(handle).is_none());

        // The clone taken before unregister still works.
        assert_eq!(shared.read().len(), 1);
    }

    #[test]
    fn test_handles_are_unique() {
        let a = register(AnyIndex::Pq(PqIndex::new(16, 10).unwrap()));
        let b = register(AnyIndex::Pq(PqIndex::new(16, 10).unwrap()));
        assert_ne!(a, b);
        unregister(a);
        unregister(b);
    }

    #[test]
    fn test_dispatch_over_kinds() {
        let mut any = AnyIndex::RpTree(RpTreeIndex::new(8, 10).unwrap());
        assert_eq!(any.dimension(), 8);
        assert_eq!(any.capacity(), 10);
        any.add(Label::new(0), &[0.1; 8]).unwrap();
        any.build().unwrap();
        assert_eq!(any.search(&[0.1; 8], 1).len(), 1);
        assert!(any.train(&[0.0; 8]).is_err());

        let mut lsh = AnyIndex::Lsh(LshIndex::new(8, 10).unwrap());
        assert!(lsh.build().is_err());
    }
}
