//! Core types for transactional memory
//!
//! This module defines the fundamental identities used throughout the system:
//! - [`CellId`]: Identity of a transactional cell
//! - [`TxId`]: Identity of one transaction attempt
//! - [`TxStatus`]: Lifecycle state of a transaction

use crate::error::{Result, StmError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transactional cell
///
/// CellId is used to key:
/// - write-sets (pending values)
/// - read-sets (observed versions)
/// - the lock ordering at commit
///
/// A recycled cell receives a fresh CellId, so nothing keyed by the previous
/// tenant's id can ever match it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(u64);

impl CellId {
    /// Allocate the next process-wide unique CellId
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::types::CellId;
    ///
    /// let id1 = CellId::next();
    /// let id2 = CellId::next();
    /// assert_ne!(id1, id2);
    /// ```
    pub fn next() -> Self {
        CellId(NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Unique identifier for a transaction attempt
///
/// Every `begin` allocates a new TxId, so a stale handle can be told apart
/// from the record that now occupies its arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(u64);

impl TxId {
    /// Allocate the next process-wide unique TxId
    pub fn next() -> Self {
        TxId(NEXT_TX_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Created` → `Running` (entered, becomes ambient)
/// - `Running` → `Committed` (validation passed, writes published or merged)
/// - `Running` → `RolledBack` (explicit rollback, failed validation, or
///   scope exit without commit)
/// - `Created` → `RolledBack` (abandoned before entering)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `RolledBack`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Allocated, not yet ambient; `Transaction::begin` leaves it before returning
    Created,
    /// Ambient or nested under an ambient transaction; can read/write
    Running,
    /// Writes published (root) or merged into the parent (nested)
    Committed,
    /// Writes discarded
    RolledBack,
}

impl TxStatus {
    /// Check if no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::RolledBack)
    }

    /// Validate and perform a transition
    ///
    /// # Errors
    /// Returns [`StmError::InvalidState`] for any transition not listed on
    /// [`TxStatus`].
    pub fn transition(&mut self, to: TxStatus) -> Result<()> {
        let allowed = matches!(
            (*self, to),
            (TxStatus::Created, TxStatus::Running)
                | (TxStatus::Created, TxStatus::RolledBack)
                | (TxStatus::Running, TxStatus::Committed)
                | (TxStatus::Running, TxStatus::RolledBack)
        );
        if !allowed {
            return Err(StmError::InvalidState { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxStatus::Created => "Created",
            TxStatus::Running => "Running",
            TxStatus::Committed => "Committed",
            TxStatus::RolledBack => "RolledBack",
        };
        f.write_str(name)
    }
}
