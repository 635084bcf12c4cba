//! Ambient transaction context
//!
//! Every thread owns one [`TxContext`]: an arena of transaction records
//! stacked in nesting order. Slot `i` holds the record at depth `i`, and each
//! record names its parent slot explicitly. Handles refer to records by
//! `(slot, TxId)` and are checked on every use, so a stale handle can never
//! reach a record that now occupies its old slot.
//!
//! The context is resolved from thread-local storage by [`TxContext::with`];
//! cells also accept it explicitly through `read_in` / `write_in`.
//!
//! ## Read path
//!
//! 1. Walk the innermost record, then its ancestors, for a pending write
//! 2. Otherwise load the committed value and record `(cell, version)` in the
//!    innermost record's read-set (first read only)

use crate::cell::{CellCore, VersionedCell};
use crate::manager::{self, Conflict};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use strand_core::error::{Result, StmError};
use strand_core::types::{CellId, TxId};

thread_local! {
    static CONTEXT: TxContext = TxContext::new();
}

/// Version observed by a transaction's first committed read of a cell
pub(crate) struct ReadEntry {
    pub(crate) cell: Arc<dyn VersionedCell>,
    pub(crate) version: u64,
}

/// Committed value displaced by a publish, kept alive until unlock
pub(crate) type Retired = Box<dyn Any + Send>;

/// A buffered write, type-erased so one write-set can hold cells of any `T`
pub(crate) trait PendingWrite {
    fn cell(&self) -> &dyn VersionedCell;

    /// Store the value as committed; the caller holds the cell's commit lock
    ///
    /// Returns the cell and the value it replaced. The replaced value must be
    /// dropped after the lock is released.
    fn publish(self: Box<Self>) -> (Arc<dyn VersionedCell>, Retired);

    fn as_any(&self) -> &dyn Any;
}

struct Pending<T> {
    core: Arc<CellCore<T>>,
    value: T,
}

impl<T: Send + Sync + 'static> PendingWrite for Pending<T> {
    fn cell(&self) -> &dyn VersionedCell {
        &*self.core
    }

    fn publish(self: Box<Self>) -> (Arc<dyn VersionedCell>, Retired) {
        let Pending { core, value } = *self;
        let previous = core.store(value);
        (core, Box::new(previous))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) type ReadSet = FxHashMap<CellId, ReadEntry>;
pub(crate) type WriteSet = FxHashMap<CellId, Box<dyn PendingWrite>>;

/// One open transaction
pub(crate) struct TxRecord {
    pub(crate) id: TxId,
    pub(crate) parent: Option<usize>,
    pub(crate) read_set: ReadSet,
    pub(crate) write_set: WriteSet,
}

/// Per-thread arena of open transactions
///
/// # Example
///
/// ```
/// use strand_concurrency::{Transaction, TxContext};
///
/// assert!(!TxContext::with(|ctx| ctx.is_active()));
/// let tx = Transaction::begin();
/// assert_eq!(TxContext::with(|ctx| ctx.depth()), 1);
/// drop(tx);
/// assert_eq!(TxContext::with(|ctx| ctx.depth()), 0);
/// ```
pub struct TxContext {
    records: RefCell<Vec<TxRecord>>,
}

impl TxContext {
    fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
        }
    }

    /// Run `f` with the calling thread's context
    pub fn with<R>(f: impl FnOnce(&TxContext) -> R) -> R {
        CONTEXT.with(f)
    }

    /// Like [`with`](Self::with), but `None` once thread-local storage has
    /// been torn down
    pub(crate) fn try_with<R>(f: impl FnOnce(&TxContext) -> R) -> Option<R> {
        CONTEXT.try_with(f).ok()
    }

    /// Number of open transactions (nesting depth)
    pub fn depth(&self) -> usize {
        self.records.borrow().len()
    }

    /// Check if a transaction is ambient
    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    /// Id of the ambient (innermost) transaction
    pub fn current(&self) -> Option<TxId> {
        self.records.borrow().last().map(|record| record.id)
    }

    // ========================================================================
    // Arena management
    // ========================================================================

    /// Push a new innermost record, returning its slot
    pub(crate) fn push(&self, id: TxId) -> usize {
        let mut records = self.records.borrow_mut();
        let slot = records.len();
        records.push(TxRecord {
            id,
            parent: slot.checked_sub(1),
            read_set: ReadSet::default(),
            write_set: WriteSet::default(),
        });
        slot
    }

    fn check_handle(records: &[TxRecord], slot: usize, id: TxId) -> Result<()> {
        match records.get(slot) {
            Some(record) if record.id == id => {}
            _ => {
                return Err(StmError::InvalidNesting(format!(
                    "{} is not open on this thread",
                    id
                )))
            }
        }
        if slot + 1 != records.len() {
            return Err(StmError::InvalidNesting(format!(
                "{} has {} open nested transaction(s)",
                id,
                records.len() - slot - 1
            )));
        }
        Ok(())
    }

    /// Remove the innermost record, which must be `(slot, id)`
    fn pop(&self, slot: usize, id: TxId) -> Result<TxRecord> {
        let mut records = self.records.borrow_mut();
        Self::check_handle(&records, slot, id)?;
        records
            .pop()
            .ok_or_else(|| StmError::InvalidNesting(format!("{} is not open", id)))
    }

    /// Discard `(slot, id)` and everything nested above it
    ///
    /// Returns the discarded records (innermost last) so they are dropped
    /// after the arena borrow ends. Unknown handles discard nothing.
    pub(crate) fn truncate(&self, slot: usize, id: TxId) -> Vec<TxRecord> {
        let mut records = self.records.borrow_mut();
        match records.get(slot) {
            Some(record) if record.id == id => records.split_off(slot),
            _ => Vec::new(),
        }
    }

    /// Number of buffered writes of `(slot, id)`
    pub(crate) fn pending_writes(&self, slot: usize, id: TxId) -> usize {
        let records = self.records.borrow();
        match records.get(slot) {
            Some(record) if record.id == id => record.write_set.len(),
            _ => 0,
        }
    }

    // ========================================================================
    // Cell access
    // ========================================================================

    pub(crate) fn read<T>(&self, core: &Arc<CellCore<T>>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        let cell_id = core.id();
        {
            let records = self.records.borrow();
            let mut cursor = records.len().checked_sub(1);
            while let Some(slot) = cursor {
                let record = &records[slot];
                if let Some(pending) = record.write_set.get(&cell_id) {
                    if let Some(pending) = pending.as_any().downcast_ref::<Pending<T>>() {
                        return pending.value.clone();
                    }
                }
                cursor = record.parent;
            }
        }

        let (value, version) = core.load();
        if let Some(top) = self.records.borrow_mut().last_mut() {
            top.read_set.entry(cell_id).or_insert_with(|| ReadEntry {
                cell: Arc::clone(core) as Arc<dyn VersionedCell>,
                version,
            });
        }
        T::clone(&value)
    }

    pub(crate) fn write<T>(&self, core: &Arc<CellCore<T>>, value: T) -> Result<()>
    where
        T: Send + Sync + 'static,
    {
        let pending: Box<dyn PendingWrite> = Box::new(Pending {
            core: Arc::clone(core),
            value,
        });
        let displaced = {
            let mut records = self.records.borrow_mut();
            let top = records.last_mut().ok_or(StmError::NoAmbientTransaction)?;
            top.write_set.insert(core.id(), pending)
        };
        drop(displaced);
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Validate and publish (root) or merge (nested) the innermost record
    ///
    /// The inner result carries the conflict that rejected the record; the
    /// record is discarded either way.
    ///
    /// # Errors
    /// [`StmError::InvalidNesting`] if `(slot, id)` is not the innermost
    /// open transaction.
    pub(crate) fn commit(
        &self,
        slot: usize,
        id: TxId,
    ) -> Result<std::result::Result<(), Conflict>> {
        let record = self.pop(slot, id)?;
        let Some(parent) = record.parent else {
            return Ok(manager::commit_root(record));
        };
        let outcome = {
            let mut records = self.records.borrow_mut();
            let parent = records.get_mut(parent).ok_or_else(|| {
                StmError::InvalidNesting(format!("parent of {} is gone", id))
            })?;
            manager::commit_nested(record, parent)
        };
        // Displaced parent writes and rejected records drop here, outside
        // the arena borrow.
        Ok(outcome.map(drop).map_err(|(conflict, rejected)| {
            drop(rejected);
            conflict
        }))
    }

    /// Discard the innermost record
    ///
    /// # Errors
    /// [`StmError::InvalidNesting`] if `(slot, id)` is not the innermost
    /// open transaction.
    pub(crate) fn rollback(&self, slot: usize, id: TxId) -> Result<()> {
        let record = self.pop(slot, id)?;
        drop(record);
        Ok(())
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("depth", &self.depth())
            .field("current", &self.current())
            .finish()
    }
}
