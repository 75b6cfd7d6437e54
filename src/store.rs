//! Contiguous vector storage shared by all index types.
//!
//! [`VectorStore`] keeps three parallel arrays in a structure-of-arrays
//! layout: the float rows, the external labels, and a precomputed squared
//! L2 norm per row. All buffers are allocated up front at the declared
//! capacity and rows never move, so a `&[f32]` row slice handed out for
//! index `i` stays valid for the lifetime of the store.
//!
//! The element count is an atomic published with release semantics after
//! the row has been fully written. Readers that observe a count `s` via an
//! acquire load may safely read any row below `s`. Writers are serialized
//! through `&mut self`; concurrent index implementations wrap the store in
//! their own lock and keep searches on the shared side.

use crate::constants::cache::PREFETCH_STRIDE;
use crate::error::{ForgeAnnError, Result};
use crate::types::Label;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Append-only, capacity-bounded vector storage in SoA layout.
#[derive(Debug)]
pub struct VectorStore {
    dim: usize,
    capacity: usize,
    size: AtomicUsize,
    /// Row-major float payloads: row `i` spans `[i * dim, (i + 1) * dim)`.
    vectors: Vec<f32>,
    /// External labels, parallel to rows.
    labels: Vec<i32>,
    /// Squared L2 norm per row, parallel to rows.
    norms: Vec<f32>,
}

impl VectorStore {
    /// Create a store for `capacity` vectors of dimension `dim`.
    ///
    /// All memory is allocated here; `add` never reallocates.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if `dim` or `capacity` is zero.
    pub fn new(dim: usize, capacity: usize) -> Result<Self> {
        if dim == 0 {
            return Err(ForgeAnnError::invalid_parameter("dimension must be positive"));
        }
        if capacity == 0 {
            return Err(ForgeAnnError::invalid_parameter("capacity must be positive"));
        }

        Ok(Self {
            dim,
            capacity,
            size: AtomicUsize::new(0),
            vectors: vec![0.0; capacity * dim],
            labels: vec![-1; capacity],
            norms: vec![0.0; capacity],
        })
    }

    /// Append a vector, returning its internal index.
    ///
    /// The row, label, and norm are written before the size counter is
    /// published, so a concurrent reader that sees the new size sees a
    /// complete row.
    ///
    /// # Errors
    /// `DimensionMismatch` if `vector.len() != dim`; `CapacityExceeded`
    /// once the store is full (the store is left unchanged).
    pub fn add(&mut self, label: Label, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dim {
            return Err(ForgeAnnError::dimension_mismatch(self.dim, vector.len()));
        }

        let index = self.size.load(Ordering::Relaxed);
        if index >= self.capacity {
            return Err(ForgeAnnError::capacity_exceeded(self.capacity));
        }

        let start = index * self.dim;
        self.vectors[start..start + self.dim].copy_from_slice(vector);
        self.norms[index] = squared_norm(vector);
        self.labels[index] = label.as_i32();

        self.size.store(index + 1, Ordering::Release);
        Ok(index)
    }

    /// Append a batch of vectors, returning the internal index of the first.
    ///
    /// The whole batch is reserved up front: if it does not fit, nothing is
    /// written and `CapacityExceeded` is returned.
    ///
    /// # Errors
    /// `InvalidParameter` on label/vector length disagreement,
    /// `DimensionMismatch` if the flat buffer is not a whole number of rows,
    /// `CapacityExceeded` if the batch does not fit.
    pub fn add_batch(&mut self, labels: &[Label], vectors: &[f32]) -> Result<usize> {
        if vectors.len() != labels.len() * self.dim {
            return Err(ForgeAnnError::dimension_mismatch(
                labels.len() * self.dim,
                vectors.len(),
            ));
        }
        let count = labels.len();
        if count == 0 {
            return Err(ForgeAnnError::EmptyVectorSet);
        }

        let start_index = self.size.load(Ordering::Relaxed);
        if start_index + count > self.capacity {
            return Err(ForgeAnnError::capacity_exceeded(self.capacity));
        }

        for (i, label) in labels.iter().enumerate() {
            let index = start_index + i;
            let row = &vectors[i * self.dim..(i + 1) * self.dim];
            let dest = index * self.dim;
            self.vectors[dest..dest + self.dim].copy_from_slice(row);
            self.norms[index] = squared_norm(row);
            self.labels[index] = label.as_i32();
        }

        self.size.store(start_index + count, Ordering::Release);
        Ok(start_index)
    }

    /// Get the row for internal index `i`, or `None` if out of range.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&[f32]> {
        if i >= self.size.load(Ordering::Acquire) {
            return None;
        }
        let start = i * self.dim;
        Some(&self.vectors[start..start + self.dim])
    }

    /// Get the label for internal index `i`.
    ///
    /// Out-of-range indices report label −1, matching unwritten slots.
    #[inline]
    pub fn label(&self, i: usize) -> Label {
        if i >= self.size.load(Ordering::Acquire) {
            return Label::new(-1);
        }
        Label::new(self.labels[i])
    }

    /// Get the precomputed squared norm for internal index `i`.
    ///
    /// Out-of-range indices report 0.
    #[inline]
    pub fn norm(&self, i: usize) -> f32 {
        if i >= self.size.load(Ordering::Acquire) {
            return 0.0;
        }
        self.norms[i]
    }

    /// All squared norms for the currently valid prefix.
    #[inline]
    pub fn norms(&self) -> &[f32] {
        &self.norms[..self.size.load(Ordering::Acquire)]
    }

    /// Issue cache prefetch hints for row `i`.
    ///
    /// Advisory only; a no-op on platforms without a prefetch primitive.
    #[inline]
    pub fn prefetch(&self, i: usize) {
        #[cfg(target_arch = "x86_64")]
        {
            if i >= self.size.load(Ordering::Acquire) {
                return;
            }
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let start = i * self.dim;
            let mut offset = 0;
            while offset < self.dim {
                // SAFETY: _mm_prefetch is a hint and never dereferences;
                // the address lies within the vectors buffer.
                unsafe {
                    _mm_prefetch(
                        self.vectors.as_ptr().add(start + offset) as *const i8,
                        _MM_HINT_T0,
                    );
                }
                offset += PREFETCH_STRIDE;
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = i;
    }

    /// Number of valid rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// True if no rows have been added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Maximum number of rows.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reset the store to empty, zeroing all buffers.
    pub fn clear(&mut self) {
        self.size.store(0, Ordering::Release);
        self.vectors.fill(0.0);
        self.labels.fill(-1);
        self.norms.fill(0.0);
    }

    /// Heap memory held by the store's buffers, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>()
            + self.labels.len() * std::mem::size_of::<i32>()
            + self.norms.len() * std::mem::size_of::<f32>()
    }
}

/// Sum of squares of a row. Stored per vector so batch kernels can use the
/// norm-expansion identity without recomputation.
#[inline]
fn squared_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_construction() {
        assert!(VectorStore::new(0, 10).is_err());
        assert!(VectorStore::new(8, 0).is_err());
    }

    #[test]
    fn test_add_and_get() {
        let mut store = VectorStore::new(4, 10).unwrap();
        let index = store.add(Label::new(7), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(index, 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.get(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.label(0), Label::new(7));
        assert!((store.norm(0) - 30.0).abs() < 1e-6);
        assert_eq!(store.norms(), &[30.0]);

        assert!(store.get(1).is_none());
        assert_eq!(store.label(1), Label::new(-1));
        assert_eq!(store.norm(1), 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = VectorStore::new(4, 10).unwrap();
        let err = store.add(Label::new(0), &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ForgeAnnError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut store = VectorStore::new(2, 3).unwrap();
        for i in 0..3 {
            store.add(Label::new(i), &[i as f32, 0.0]).unwrap();
        }
        let err = store.add(Label::new(3), &[3.0, 0.0]).unwrap_err();
        assert!(matches!(err, ForgeAnnError::CapacityExceeded { capacity: 3 }));
        // A failed add leaves the store usable and unchanged.
        assert_eq!(store.len(), 3);
        assert_eq!(store.label(2), Label::new(2));
    }

    #[test]
    fn test_add_batch() {
        let mut store = VectorStore::new(2, 5).unwrap();
        store.add(Label::new(0), &[0.0, 0.0]).unwrap();

        let labels: Vec<Label> = (1..4).map(Label::new).collect();
        let vectors = vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0];
        let start = store.add_batch(&labels, &vectors).unwrap();

        assert_eq!(start, 1);
        assert_eq!(store.len(), 4);
        assert_eq!(store.get(3).unwrap(), &[3.0, 0.0]);
        assert_eq!(store.label(2), Label::new(2));
    }

    #[test]
    fn test_add_batch_does_not_partially_commit() {
        let mut store = VectorStore::new(2, 3).unwrap();
        store.add(Label::new(0), &[0.0, 0.0]).unwrap();

        let labels: Vec<Label> = (1..5).map(Label::new).collect();
        let vectors = vec![0.0; 8];
        assert!(store.add_batch(&labels, &vectors).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = VectorStore::new(2, 4).unwrap();
        store.add(Label::new(5), &[1.0, 1.0]).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert!(store.get(0).is_none());
        assert_eq!(store.label(0), Label::new(-1));
    }

    #[test]
    fn test_prefetch_is_harmless() {
        let mut store = VectorStore::new(16, 4).unwrap();
        store.add(Label::new(0), &[0.5; 16]).unwrap();
        store.prefetch(0);
        store.prefetch(100); // out of range: no-op
    }
}
