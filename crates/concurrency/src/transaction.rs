//! Transaction guard and retry helpers
//!
//! A [`Transaction`] is an RAII guard over one record of the thread's
//! [`TxContext`]. While it is open it is the ambient transaction: cell reads
//! and writes on this thread go through it. Beginning a transaction while
//! another is open nests the new one under it.
//!
//! ## Lifecycle
//!
//! ```text
//! begin()  -> Created -> Running   (record pushed, now ambient)
//! commit() -> Committed            (validated, published or merged)
//!          -> RolledBack           (conflict, returns false)
//! rollback() / drop -> RolledBack
//! ```
//!
//! Dropping a running guard rolls it back, which also covers panics that
//! unwind through a transaction body. Guards are `!Send`: a transaction
//! begun on one thread is never ambient on another.

use crate::context::TxContext;
use crate::manager;
use crossbeam_utils::Backoff;
use std::marker::PhantomData;
use strand_core::config::RetryPolicy;
use strand_core::error::{Result, StmError};
use strand_core::types::{TxId, TxStatus};
use tracing::{debug, trace, warn};

/// An open optimistic transaction
///
/// # Example
///
/// ```
/// use strand_concurrency::{Transaction, TxCell};
///
/// let a = TxCell::new(5);
///
/// let mut outer = Transaction::begin();
/// a.write(9).unwrap();
/// {
///     let mut inner = Transaction::begin();
///     a.write(13).unwrap();
///     assert!(inner.commit().unwrap());
/// }
/// assert_eq!(a.read(), 13);
/// outer.rollback().unwrap();
///
/// assert_eq!(a.read(), 5);
/// ```
pub struct Transaction {
    id: TxId,
    slot: usize,
    status: TxStatus,
    _not_send: PhantomData<*const ()>,
}

impl Transaction {
    /// Begin a transaction on the calling thread
    ///
    /// The new transaction becomes ambient and nests under the transaction
    /// that was ambient before, if any.
    pub fn begin() -> Self {
        TxContext::with(Self::begin_in)
    }

    /// Begin a transaction in an explicit context
    pub fn begin_in(ctx: &TxContext) -> Self {
        let id = TxId::next();
        let mut status = TxStatus::Created;
        let slot = ctx.push(id);
        let entered = status.transition(TxStatus::Running);
        debug_assert!(entered.is_ok(), "a new transaction enters Running");
        trace!(tx = %id, depth = slot + 1, "Transaction begun");
        Self {
            id,
            slot,
            status,
            _not_send: PhantomData,
        }
    }

    /// Validate and commit
    ///
    /// A root transaction publishes its writes to the committed state; a
    /// nested one merges them into its parent.
    ///
    /// Returns `true` on success and `false` if validation failed, in which
    /// case the transaction is rolled back and nothing is published. Calling
    /// `commit` again after the transaction has finished returns `false`
    /// and changes nothing.
    ///
    /// # Errors
    /// [`StmError::InvalidNesting`] if a transaction nested inside this one
    /// is still open.
    pub fn commit(&mut self) -> Result<bool> {
        TxContext::with(|ctx| self.commit_in(ctx))
    }

    /// [`commit`](Self::commit) through an explicit context
    pub fn commit_in(&mut self, ctx: &TxContext) -> Result<bool> {
        if self.status.is_terminal() {
            return Ok(false);
        }
        match ctx.commit(self.slot, self.id)? {
            Ok(()) => {
                self.status.transition(TxStatus::Committed)?;
                manager::record_commit();
                trace!(tx = %self.id, root = self.is_root(), "Transaction committed");
                Ok(true)
            }
            Err(conflict) => {
                self.status.transition(TxStatus::RolledBack)?;
                manager::record_conflict();
                debug!(tx = %self.id, ?conflict, "Commit rejected");
                Ok(false)
            }
        }
    }

    /// Discard all pending writes
    ///
    /// The parent's pending writes are untouched. A no-op once the
    /// transaction has finished.
    ///
    /// # Errors
    /// [`StmError::InvalidNesting`] if a transaction nested inside this one
    /// is still open.
    pub fn rollback(&mut self) -> Result<()> {
        TxContext::with(|ctx| self.rollback_in(ctx))
    }

    /// [`rollback`](Self::rollback) through an explicit context
    pub fn rollback_in(&mut self, ctx: &TxContext) -> Result<()> {
        if self.status.is_terminal() {
            return Ok(());
        }
        ctx.rollback(self.slot, self.id)?;
        self.status.transition(TxStatus::RolledBack)?;
        manager::record_rollback();
        debug!(tx = %self.id, "Transaction rolled back");
        Ok(())
    }

    /// Current status
    pub fn status(&self) -> TxStatus {
        self.status
    }

    /// Transaction identity
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Nesting depth (1 for a root transaction)
    pub fn depth(&self) -> usize {
        self.slot + 1
    }

    /// Check if this transaction has no parent
    pub fn is_root(&self) -> bool {
        self.slot == 0
    }

    /// Number of buffered writes (0 once finished)
    pub fn pending_writes(&self) -> usize {
        TxContext::with(|ctx| ctx.pending_writes(self.slot, self.id))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        // None when the thread is exiting and its context is already gone
        if let Some(discarded) = TxContext::try_with(|ctx| ctx.truncate(self.slot, self.id)) {
            if discarded.len() > 1 {
                warn!(
                    tx = %self.id,
                    descendants = discarded.len() - 1,
                    "Transaction dropped with open nested transactions"
                );
            }
            drop(discarded);
        }
        self.status = TxStatus::RolledBack;
        manager::record_rollback();
        debug!(tx = %self.id, "Transaction rolled back on drop");
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("depth", &self.depth())
            .field("status", &self.status)
            .finish()
    }
}

// ============================================================================
// Retry helpers
// ============================================================================

/// Run `f` in a transaction, retrying until it commits
///
/// Equivalent to [`atomically_with`] with [`RetryPolicy::unbounded`].
///
/// # Example
///
/// ```
/// use strand_concurrency::{atomically, TxCell};
///
/// let counter = TxCell::new(0);
/// let seen = atomically(|| {
///     let n = counter.read();
///     counter.write(n + 1)?;
///     Ok(n)
/// })
/// .unwrap();
///
/// assert_eq!(seen, 0);
/// assert_eq!(counter.read(), 1);
/// ```
pub fn atomically<R, F>(f: F) -> Result<R>
where
    F: FnMut() -> Result<R>,
{
    atomically_with(&RetryPolicy::unbounded(), f)
}

/// Run `f` in a transaction, retrying on conflict as `policy` allows
///
/// Each attempt begins a fresh transaction (nested if one is already
/// ambient), runs `f` and commits. An error from `f` rolls the attempt back
/// and is returned as is.
///
/// # Errors
/// - Any error returned by `f`
/// - [`StmError::CommitConflict`] once `policy.max_attempts` commits have
///   failed
pub fn atomically_with<R, F>(policy: &RetryPolicy, mut f: F) -> Result<R>
where
    F: FnMut() -> Result<R>,
{
    let backoff = Backoff::new();
    let mut attempts: u32 = 0;
    loop {
        let mut tx = Transaction::begin();
        let value = f()?;
        attempts += 1;
        if tx.commit()? {
            return Ok(value);
        }
        if !policy.allows(attempts) {
            debug!(attempts, "Retry budget exhausted");
            return Err(StmError::CommitConflict { attempts });
        }
        trace!(attempts, "Retrying transaction");
        backoff.snooze();
    }
}
