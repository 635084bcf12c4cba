//! Cell pool
//!
//! Recycles the allocations behind [`TxCell`]s. Containers that discard a
//! cell donate it; later creations acquire a donated cell before allocating.
//!
//! A cell is pooled only when the donor holds the last reference to it.
//! Pending writes, read-sets and user handles all keep a reference, so a
//! cell any transaction or caller can still observe is never recycled.
//! Recycled cells get a fresh [`CellId`](strand_core::CellId) and value.
//!
//! Pooling is an optimization only: a pool with capacity 0 allocates every
//! cell and behaves identically otherwise.

use crate::cell::{CellCore, TxCell};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::config::PoolConfig;

/// Pool activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Cells created by allocation
    pub allocated: u64,
    /// Cells created by recycling a donated cell
    pub reused: u64,
    /// Donations accepted into the pool
    pub donated: u64,
    /// Donations refused (still shared, or pool full or disabled)
    pub rejected: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from the pool (0.0 - 1.0)
    pub fn reuse_rate(&self) -> f64 {
        let total = self.allocated + self.reused;
        if total == 0 {
            0.0
        } else {
            self.reused as f64 / total as f64
        }
    }
}

/// Bounded, lock-free pool of recyclable cells
pub struct CellPool<T> {
    idle: Option<ArrayQueue<Arc<CellCore<T>>>>,
    allocated: AtomicU64,
    reused: AtomicU64,
    donated: AtomicU64,
    rejected: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CellPool<T> {
    /// Create a pool keeping at most `capacity` idle cells
    pub fn new(capacity: usize) -> Self {
        Self {
            // ArrayQueue rejects a zero capacity
            idle: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            donated: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Create a pool from configuration
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.capacity)
    }

    /// A pool that never retains cells
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Obtain a cell holding `value`
    ///
    /// Prefers a donated cell, otherwise allocates. Either way the cell has
    /// a fresh identity, holds `value` as its committed state and is not
    /// referenced by any transaction.
    pub fn acquire(&self, value: T) -> TxCell<T> {
        if let Some(mut core) = self.idle.as_ref().and_then(ArrayQueue::pop) {
            if let Some(cell) = Arc::get_mut(&mut core) {
                cell.reset(value);
                self.reused.fetch_add(1, Ordering::Relaxed);
                return TxCell::from_core(core);
            }
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        TxCell::new(value)
    }

    /// Offer a cell for reuse
    ///
    /// Returns `true` if the cell was pooled. A cell that is still referenced
    /// elsewhere, or that does not fit, is simply released.
    pub fn donate(&self, cell: TxCell<T>) -> bool {
        let mut core = cell.into_core();
        let pooled = match &self.idle {
            Some(idle) if Arc::get_mut(&mut core).is_some() => idle.push(core).is_ok(),
            _ => false,
        };
        let counter = if pooled {
            &self.donated
        } else {
            &self.rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
        pooled
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            donated: self.donated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Number of idle cells
    pub fn len(&self) -> usize {
        self.idle.as_ref().map_or(0, ArrayQueue::len)
    }

    /// Check if no idle cell is available
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of idle cells
    pub fn capacity(&self) -> usize {
        self.idle.as_ref().map_or(0, ArrayQueue::capacity)
    }
}

impl<T: Clone + Send + Sync + 'static> Default for CellPool<T> {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl<T> std::fmt::Debug for CellPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellPool")
            .field("idle", &self.idle.as_ref().map_or(0, ArrayQueue::len))
            .field("capacity", &self.idle.as_ref().map_or(0, ArrayQueue::capacity))
            .finish()
    }
}
