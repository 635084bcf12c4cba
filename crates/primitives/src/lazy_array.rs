//! LazyCellArray: indexed transactional cells created on first use
//!
//! ## Design
//!
//! A fixed-capacity [`SlotArray`] of [`TxCell`]s plus a factory mapping an
//! index to its initial value. A slot stays empty until the index is first
//! touched; the cell is then created from the pool and installed with a
//! single CAS.
//!
//! ## Single binding per index
//!
//! When two threads race to populate the same empty index, both build a
//! candidate cell but only one CAS wins. The loser's candidate was never
//! visible to anyone, so it is donated back to the [`CellPool`] and the
//! loser adopts the winner's cell. Callers never observe two different
//! cells bound to one index.
//!
//! ## Donation
//!
//! Every path that drops a cell out of the array (overwritten, removed,
//! race loser, rejected update candidate) offers it to the pool. The pool
//! only keeps cells no one else references, so a cell still held by a
//! caller or a transaction is simply released.
//!
//! ## Values
//!
//! Value-level operations ([`get`](LazyCellArray::get),
//! [`take`](LazyCellArray::take), [`exchange`](LazyCellArray::exchange),
//! [`update`](LazyCellArray::update)) read cells through the ambient
//! transaction, the same way [`TxCell::read`] does.

use std::sync::Arc;
use strand_concurrency::{CellPool, PoolStats, TxCell};
use strand_core::config::{ArrayConfig, PoolConfig};
use strand_core::error::Result;
use strand_storage::SlotArray;
use tracing::trace;

type Factory<T> = Box<dyn Fn(usize) -> T + Send + Sync>;

/// Fixed-capacity array of lazily created transactional cells
///
/// # Example
///
/// ```
/// use strand_primitives::LazyCellArray;
/// use strand_concurrency::atomically;
///
/// let squares = LazyCellArray::new(8, |i| i * i);
/// assert_eq!(squares.count(), 0);
/// assert_eq!(squares.get(3).unwrap(), 9);
/// assert_eq!(squares.count(), 1);
///
/// let cell = squares.get_cell(3).unwrap();
/// atomically(|| cell.write(10)).unwrap();
/// assert_eq!(squares.get(3).unwrap(), 10);
/// ```
pub struct LazyCellArray<T> {
    slots: SlotArray<TxCell<T>>,
    pool: CellPool<T>,
    factory: Factory<T>,
}

impl<T: Clone + Send + Sync + 'static> LazyCellArray<T> {
    /// Create an array of `capacity` unpopulated indices
    ///
    /// `factory(index)` produces the initial value the first time `index`
    /// is touched. It may run more than once for one index when threads
    /// race, and only one result is kept.
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        Self::from_parts(capacity, &PoolConfig::default(), Box::new(factory))
    }

    /// Create an array from configuration
    pub fn from_config<F>(config: &ArrayConfig, factory: F) -> Self
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        Self::from_parts(config.capacity, &config.pool, Box::new(factory))
    }

    /// Start building an array
    pub fn builder() -> LazyCellArrayBuilder<T> {
        LazyCellArrayBuilder::new()
    }

    fn from_parts(capacity: usize, pool: &PoolConfig, factory: Factory<T>) -> Self {
        Self {
            slots: SlotArray::new(capacity),
            pool: CellPool::from_config(pool),
            factory,
        }
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// Cell bound to `index`, creating it if the index is unpopulated
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn get_cell(&self, index: usize) -> Result<TxCell<T>> {
        loop {
            if let Some(existing) = self.slots.get(index)? {
                return Ok(TxCell::clone(&existing));
            }
            let candidate = Arc::new(self.pool.acquire((self.factory)(index)));
            if self
                .slots
                .compare_exchange(index, None, Some(Arc::clone(&candidate)))?
            {
                return Ok(TxCell::clone(&candidate));
            }
            trace!(index, "lost cell initialization race");
            self.discard(candidate);
        }
    }

    /// Cell bound to `index`, without creating one
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn try_get_cell(&self, index: usize) -> Result<Option<TxCell<T>>> {
        Ok(self.slots.get(index)?.map(|cell| TxCell::clone(&cell)))
    }

    /// Value at `index`, read through the ambient transaction
    ///
    /// Populates the index from the factory on first use.
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn get(&self, index: usize) -> Result<T> {
        Ok(self.get_cell(index)?.read())
    }

    // ========================================================================
    // Slot mutations
    // ========================================================================

    /// Bind a new cell holding `value`, only if `index` is unpopulated
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn insert(&self, index: usize, value: T) -> Result<bool> {
        if self.slots.get(index)?.is_some() {
            return Ok(false);
        }
        let candidate = Arc::new(self.pool.acquire(value));
        let inserted = self
            .slots
            .compare_exchange(index, None, Some(Arc::clone(&candidate)))?;
        if !inserted {
            self.discard(candidate);
        }
        Ok(inserted)
    }

    /// Bind a new cell holding `value`, returning the previous cell's value
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn exchange(&self, index: usize, value: T) -> Result<Option<T>> {
        // Range check before a cell is taken from the pool
        self.slots.get(index)?;
        let cell = self.pool.acquire(value);
        let previous = self.slots.exchange(index, cell)?;
        Ok(previous.map(|cell| self.retire(cell)))
    }

    /// Unbind the cell at `index`
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn remove(&self, index: usize) -> Result<bool> {
        let removed = self.slots.take(index)?;
        let found = removed.is_some();
        if let Some(cell) = removed {
            self.discard(cell);
        }
        Ok(found)
    }

    /// Unbind the cell at `index`, returning its value
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn take(&self, index: usize) -> Result<Option<T>> {
        Ok(self.slots.take(index)?.map(|cell| self.retire(cell)))
    }

    /// Rebind `index` to a new cell holding `updater(current)` while
    /// `predicate(current)` holds
    ///
    /// `current` is the value of the bound cell as read through the ambient
    /// transaction. The swap is a single CAS against the observed cell; if
    /// another thread rebinds the index first, the attempt is repeated. Both
    /// closures may run several times.
    ///
    /// Returns `Ok(false)` if the index is unpopulated or the predicate
    /// rejects the current value.
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`](strand_core::StmError::IndexOutOfRange)
    /// if `index >= capacity`.
    pub fn update<U, P>(&self, index: usize, updater: U, predicate: P) -> Result<bool>
    where
        U: Fn(&T) -> T,
        P: Fn(&T) -> bool,
    {
        loop {
            let Some(current) = self.slots.get(index)? else {
                return Ok(false);
            };
            let value = current.read();
            if !predicate(&value) {
                return Ok(false);
            }
            let candidate = Arc::new(self.pool.acquire(updater(&value)));
            if self
                .slots
                .compare_exchange(index, Some(&current), Some(Arc::clone(&candidate)))?
            {
                self.discard(current);
                return Ok(true);
            }
            trace!(index, "lost cell update race, retrying");
            self.discard(candidate);
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of indices
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of populated indices
    pub fn count(&self) -> usize {
        self.slots.count()
    }

    /// Check if no index is populated
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Populated indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.indices()
    }

    /// Populated indices with their cells
    pub fn iter(&self) -> impl Iterator<Item = (usize, TxCell<T>)> + '_ {
        self.slots
            .iter()
            .map(|(index, cell)| (index, TxCell::clone(&cell)))
    }

    /// Activity of the backing cell pool
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ========================================================================
    // Donation
    // ========================================================================

    /// Read a cell that left the array, then donate it
    fn retire(&self, cell: Arc<TxCell<T>>) -> T {
        let value = cell.read();
        self.discard(cell);
        value
    }

    /// Donate a cell that left the array
    ///
    /// Outstanding handles (ours or a caller's) keep the cell out of the pool.
    fn discard(&self, cell: Arc<TxCell<T>>) {
        if let Ok(cell) = Arc::try_unwrap(cell) {
            self.pool.donate(cell);
        }
    }
}

impl<T> std::fmt::Debug for LazyCellArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCellArray")
            .field("slots", &self.slots)
            .field("pool", &self.pool)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`LazyCellArray`]
///
/// # Example
///
/// ```
/// use strand_primitives::LazyCellArray;
///
/// let names = LazyCellArray::builder()
///     .capacity(4)
///     .pool_capacity(0)
///     .build(|i| format!("slot-{}", i));
///
/// assert_eq!(names.capacity(), 4);
/// assert_eq!(names.get(2).unwrap(), "slot-2");
/// ```
pub struct LazyCellArrayBuilder<T> {
    config: ArrayConfig,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Clone + Send + Sync + 'static> LazyCellArrayBuilder<T> {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ArrayConfig::default(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the number of indices
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set how many donated cells the pool keeps (0 disables pooling)
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool.capacity = capacity;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ArrayConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the array with `factory` producing initial values
    pub fn build<F>(self, factory: F) -> LazyCellArray<T>
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        LazyCellArray::from_config(&self.config, factory)
    }
}

impl<T: Clone + Send + Sync + 'static> Default for LazyCellArrayBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
