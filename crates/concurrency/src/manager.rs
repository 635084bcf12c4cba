//! Commit protocol for optimistic transactions
//!
//! Provides atomic commit by orchestrating:
//! 1. Locking (root only): per-cell commit locks on the write-set
//! 2. Validation (first-committer-wins): every read version is unchanged
//! 3. Publication: values stored, then versions bumped as locks release
//!
//! ## Root Commit Sequence
//!
//! ```text
//! 1. Sort write-set by CellId
//! 2. try_lock() each written cell        - held by another committer: conflict
//! 3. validate_read_set()                 - any version moved: conflict
//! 4. IF conflict: unlock() with the unchanged versions, return Conflict
//! 5. publish() every pending value       - cells still locked, readers wait
//! 6. unlock() every cell at version + 1  - writes become visible together
//! 7. drop the replaced values            - destructors run with no lock held
//! ```
//!
//! There is no global commit lock: two commits serialize only on the cells
//! they share, and locks are never waited for, so a commit finishes in one
//! pass.
//!
//! ## Nested Commit
//!
//! A nested transaction validates its read-set against the committed state
//! and, on success, hands its writes and its read-set to the parent. The
//! parent later validates the merged read-set when it commits in turn.

use crate::cell::{VersionLock, VersionedCell};
use crate::context::{PendingWrite, ReadSet, Retired, TxRecord};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::types::CellId;

/// Why a commit was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conflict {
    /// A read cell was committed to after the transaction read it
    VersionChanged {
        /// Cell whose version moved
        cell: CellId,
        /// Version the transaction observed
        read: u64,
        /// Version found at commit
        current: u64,
    },
    /// A cell is being published by another committer
    Locked {
        /// Contended cell
        cell: CellId,
    },
}

// ============================================================================
// Metrics
// ============================================================================

static COMMITTED: AtomicU64 = AtomicU64::new(0);
static ROLLED_BACK: AtomicU64 = AtomicU64::new(0);
static CONFLICTS: AtomicU64 = AtomicU64::new(0);

/// Process-wide transaction counters
///
/// `rolled_back` includes transactions rolled back because of a conflict,
/// which are also counted in `conflicts`. Counters only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxMetrics {
    /// Successful commits (root and nested)
    pub committed: u64,
    /// Explicit, implicit and conflict rollbacks
    pub rolled_back: u64,
    /// Commits rejected by validation or lock contention
    pub conflicts: u64,
}

impl TxMetrics {
    /// Commit success rate (0.0 - 1.0); 1.0 when nothing finished yet
    pub fn commit_rate(&self) -> f64 {
        let finished = self.committed + self.rolled_back;
        if finished == 0 {
            1.0
        } else {
            self.committed as f64 / finished as f64
        }
    }
}

/// Snapshot of the process-wide transaction counters
pub fn metrics() -> TxMetrics {
    TxMetrics {
        committed: COMMITTED.load(Ordering::Relaxed),
        rolled_back: ROLLED_BACK.load(Ordering::Relaxed),
        conflicts: CONFLICTS.load(Ordering::Relaxed),
    }
}

pub(crate) fn record_commit() {
    COMMITTED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_rollback() {
    ROLLED_BACK.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_conflict() {
    CONFLICTS.fetch_add(1, Ordering::Relaxed);
    ROLLED_BACK.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// Validation
// ============================================================================

/// Check every read-set entry against the committed state
///
/// `held` lists the cells this commit has locked itself, sorted by id, with
/// the version found under the lock. Any other locked cell is a conflict,
/// since its value is about to change.
fn validate_read_set(read_set: &ReadSet, held: &[(CellId, u64)]) -> Result<(), Conflict> {
    for (&cell, entry) in read_set {
        let current = match held.binary_search_by_key(&cell, |&(id, _)| id) {
            Ok(pos) => held[pos].1,
            Err(_) => {
                let word = entry.cell.version_lock().word();
                if VersionLock::is_locked(word) {
                    return Err(Conflict::Locked { cell });
                }
                VersionLock::version_of(word)
            }
        };
        if current != entry.version {
            return Err(Conflict::VersionChanged {
                cell,
                read: entry.version,
                current,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Commit
// ============================================================================

/// Validate and publish a root transaction
pub(crate) fn commit_root(record: TxRecord) -> Result<(), Conflict> {
    let TxRecord {
        read_set,
        write_set,
        ..
    } = record;

    if write_set.is_empty() {
        return validate_read_set(&read_set, &[]);
    }

    let mut writes: SmallVec<[(CellId, Box<dyn PendingWrite>); 8]> =
        write_set.into_iter().collect();
    writes.sort_unstable_by_key(|(id, _)| *id);

    // Step 1: lock the write-set in id order
    let mut held: SmallVec<[(CellId, u64); 8]> = SmallVec::with_capacity(writes.len());
    for (id, write) in &writes {
        match write.cell().version_lock().try_lock() {
            Some(version) => held.push((*id, version)),
            None => {
                release(&writes, &held);
                return Err(Conflict::Locked { cell: *id });
            }
        }
    }

    // Step 2: validate reads against the locked state
    if let Err(conflict) = validate_read_set(&read_set, &held) {
        release(&writes, &held);
        return Err(conflict);
    }

    // Step 3: publish all values before any lock is released
    let (published, retired): (SmallVec<[Arc<dyn VersionedCell>; 8]>, SmallVec<[Retired; 8]>) =
        writes.into_iter().map(|(_, write)| write.publish()).unzip();

    // Step 4: release with bumped versions
    for (cell, (_, version)) in published.iter().zip(held.iter()) {
        cell.version_lock().unlock(version + 1);
    }

    // Replaced values drop only once every lock is released
    drop(published);
    drop(retired);
    Ok(())
}

/// Unlock the first `held.len()` writes without changing their versions
fn release(writes: &[(CellId, Box<dyn PendingWrite>)], held: &[(CellId, u64)]) {
    for ((_, write), (_, version)) in writes.iter().zip(held.iter()) {
        write.cell().version_lock().unlock(*version);
    }
}

/// Validate a nested transaction and merge it into its parent
///
/// On success returns the parent writes the child overwrote; on conflict
/// returns the rejected child. Both are handed back so the caller drops them
/// outside its arena borrow.
#[allow(clippy::type_complexity)]
pub(crate) fn commit_nested(
    child: TxRecord,
    parent: &mut TxRecord,
) -> Result<Vec<Box<dyn PendingWrite>>, (Conflict, TxRecord)> {
    if let Err(conflict) = validate_read_set(&child.read_set, &[]) {
        return Err((conflict, child));
    }

    let TxRecord {
        read_set,
        write_set,
        ..
    } = child;
    let displaced = write_set
        .into_iter()
        .filter_map(|(id, write)| parent.write_set.insert(id, write))
        .collect();
    for (id, entry) in read_set {
        parent.read_set.entry(id).or_insert(entry);
    }
    Ok(displaced)
}
