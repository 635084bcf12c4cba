//! Transactional cells
//!
//! A [`TxCell`] is a versioned holder of one value. The committed value
//! lives in the cell; pending values live in the write-sets of the
//! transactions that wrote them, keyed by the cell's [`CellId`].
//!
//! ## Version word
//!
//! Each cell carries one `AtomicU64`:
//!
//! ```text
//! bit 0      commit lock (held only while a root commit publishes)
//! bits 1..   version, bumped by one per published write
//! ```
//!
//! Committed reads follow the seqlock pattern: wait while the lock bit is
//! set, load the value, and accept it only if the word did not move.

use crate::context::TxContext;
use arc_swap::ArcSwap;
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::error::Result;
use strand_core::types::CellId;

const LOCK_BIT: u64 = 1;

/// Version word with an embedded commit lock
pub(crate) struct VersionLock(AtomicU64);

impl VersionLock {
    fn new() -> Self {
        VersionLock(AtomicU64::new(0))
    }

    /// Raw word (version << 1 | lock bit)
    #[inline]
    pub(crate) fn word(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn is_locked(word: u64) -> bool {
        word & LOCK_BIT != 0
    }

    #[inline]
    pub(crate) fn version_of(word: u64) -> u64 {
        word >> 1
    }

    /// Take the commit lock without waiting
    ///
    /// Returns the version under the lock, or `None` if another committer
    /// holds it.
    pub(crate) fn try_lock(&self) -> Option<u64> {
        let word = self.word();
        if Self::is_locked(word) {
            return None;
        }
        self.0
            .compare_exchange(word, word | LOCK_BIT, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(Self::version_of)
    }

    /// Release the commit lock, publishing `version`
    #[inline]
    pub(crate) fn unlock(&self, version: u64) {
        self.0.store(version << 1, Ordering::SeqCst);
    }

    fn clear(&mut self) {
        *self.0.get_mut() &= !LOCK_BIT;
    }
}

/// Type-erased view of a cell used by read-sets and the commit protocol
pub(crate) trait VersionedCell: Send + Sync {
    fn version_lock(&self) -> &VersionLock;
}

/// Shared state behind every [`TxCell`] handle
pub(crate) struct CellCore<T> {
    id: CellId,
    lock: VersionLock,
    value: ArcSwap<T>,
}

impl<T> CellCore<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            id: CellId::next(),
            lock: VersionLock::new(),
            value: ArcSwap::from_pointee(value),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> CellId {
        self.id
    }

    /// Consistent `(value, version)` pair of the committed state
    pub(crate) fn load(&self) -> (Arc<T>, u64) {
        let backoff = Backoff::new();
        loop {
            let before = self.lock.word();
            if VersionLock::is_locked(before) {
                backoff.snooze();
                continue;
            }
            let value = self.value.load_full();
            if self.lock.word() == before {
                return (value, VersionLock::version_of(before));
            }
            backoff.spin();
        }
    }

    /// Store a committed value and return the one it replaces
    ///
    /// The caller holds the commit lock and drops the returned value only
    /// after releasing it, so a destructor never runs against a locked cell.
    pub(crate) fn store(&self, value: T) -> Arc<T> {
        self.value.swap(Arc::new(value))
    }

    /// Prepare a recycled cell for a new tenant
    ///
    /// Assigns a fresh identity so nothing keyed by the previous id can
    /// match. The version keeps counting up.
    pub(crate) fn reset(&mut self, value: T) {
        self.id = CellId::next();
        self.lock.clear();
        self.value = ArcSwap::from_pointee(value);
    }
}

impl<T: Send + Sync> VersionedCell for CellCore<T> {
    fn version_lock(&self) -> &VersionLock {
        &self.lock
    }
}

/// A transactional memory cell
///
/// Reads and writes are mediated by the ambient transaction of the calling
/// thread (see [`Transaction`](crate::Transaction)):
///
/// - [`read`](Self::read) returns the innermost pending write of the current
///   transaction chain, falling back to the committed value
/// - [`write`](Self::write) buffers the value in the innermost transaction
///
/// Cloning a `TxCell` clones the handle; both handles name the same cell.
///
/// # Example
///
/// ```
/// use strand_concurrency::{Transaction, TxCell};
///
/// let balance = TxCell::new(5);
///
/// let tx = Transaction::begin();
/// balance.write(7).unwrap();
/// assert_eq!(balance.read(), 7);
/// drop(tx); // scope exit without commit
///
/// assert_eq!(balance.read(), 5);
/// ```
pub struct TxCell<T> {
    core: Arc<CellCore<T>>,
}

impl<T> Clone for TxCell<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> TxCell<T> {
    pub(crate) fn from_core(core: Arc<CellCore<T>>) -> Self {
        Self { core }
    }

    pub(crate) fn into_core(self) -> Arc<CellCore<T>> {
        self.core
    }

    /// Identity of this cell
    #[inline]
    pub fn id(&self) -> CellId {
        self.core.id()
    }

    /// Check whether two handles name the same cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Number of writes published to this cell so far
    pub fn version(&self) -> u64 {
        self.core.load().1
    }
}

impl<T: Clone + Send + Sync + 'static> TxCell<T> {
    /// Create a cell holding `value` as its committed state
    pub fn new(value: T) -> Self {
        Self::from_core(Arc::new(CellCore::new(value)))
    }

    /// Read through the calling thread's ambient transaction
    pub fn read(&self) -> T {
        TxContext::with(|ctx| self.read_in(ctx))
    }

    /// Read through an explicit context
    ///
    /// Walks the innermost transaction and its ancestors for a pending
    /// write. Otherwise reads the committed value and, if a transaction is
    /// open, records the observed version in its read-set.
    pub fn read_in(&self, ctx: &TxContext) -> T {
        ctx.read(&self.core)
    }

    /// Buffer a write in the calling thread's innermost transaction
    ///
    /// # Errors
    /// [`StmError::NoAmbientTransaction`](strand_core::StmError::NoAmbientTransaction)
    /// if no transaction is open on this thread.
    pub fn write(&self, value: T) -> Result<()> {
        TxContext::with(|ctx| self.write_in(ctx, value))
    }

    /// Buffer a write through an explicit context
    ///
    /// # Errors
    /// [`StmError::NoAmbientTransaction`](strand_core::StmError::NoAmbientTransaction)
    /// if `ctx` has no open transaction.
    pub fn write_in(&self, ctx: &TxContext, value: T) -> Result<()> {
        ctx.write(&self.core, value)
    }

    /// Read, transform and write back in the ambient transaction
    pub fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(T) -> T,
    {
        TxContext::with(|ctx| {
            let next = f(self.read_in(ctx));
            self.write_in(ctx, next)
        })
    }

    /// Last committed value, ignoring any ambient transaction
    pub fn load_committed(&self) -> T {
        T::clone(&self.core.load().0)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for TxCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (value, version) = self.core.load();
        f.debug_struct("TxCell")
            .field("id", &self.core.id())
            .field("version", &version)
            .field("value", &value)
            .finish()
    }
}
