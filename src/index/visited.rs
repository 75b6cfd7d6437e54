//! Recycled visited-set tracking for graph traversal.
//!
//! Beam search marks nodes visited once per query. A fresh `HashSet` per
//! call allocates in the hot path, so searches instead borrow a
//! generation-counter array from a small pool: `clear()` bumps the
//! generation instead of zeroing, and a full memset happens only when the
//! u16 counter wraps.

use crate::constants::hnsw::MIN_VISITED_POOL;
use parking_lot::Mutex;

/// Generation-based visited set with O(1) amortized clear.
#[derive(Debug, Default)]
pub struct VisitedSet {
    data: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    /// Create a set covering ids below `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Reset the set. A full memset only happens on generation wrap.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.data.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grow to cover at least `cap` ids.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.data.len() {
            self.data.resize(cap, 0);
        }
    }

    /// Mark `id` visited. Returns `true` if it was not previously visited.
    #[inline]
    pub fn insert(&mut self, id: usize) -> bool {
        if self.data[id] == self.generation {
            false
        } else {
            self.data[id] = self.generation;
            true
        }
    }

    /// True if `id` has been visited since the last clear.
    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        self.data[id] == self.generation
    }
}

/// A pool of visited sets recycled across searches.
///
/// The pool holds up to `max(4, available_parallelism)` sets so concurrent
/// searches do not contend on a shared set and do not allocate per query.
#[derive(Debug)]
pub struct VisitedPool {
    sets: Mutex<Vec<VisitedSet>>,
    max_pooled: usize,
}

impl VisitedPool {
    /// Create an empty pool sized to the machine's parallelism.
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            sets: Mutex::new(Vec::new()),
            max_pooled: MIN_VISITED_POOL.max(workers),
        }
    }

    /// Borrow a cleared set sized for at least `capacity` ids.
    pub fn acquire(&self, capacity: usize) -> VisitedSet {
        let mut set = self.sets.lock().pop().unwrap_or_default();
        set.ensure_capacity(capacity);
        set.clear();
        set
    }

    /// Return a set to the pool for reuse.
    pub fn release(&self, set: VisitedSet) {
        let mut pool = self.sets.lock();
        if pool.len() < self.max_pooled {
            pool.push(set);
        }
    }
}

impl Default for VisitedPool {
    fn default() -> Self {
        Self::new()
    }
}
