//! Error types for Strand.
//!
//! Structural misuse (bad index, nesting violations, writes outside a
//! transaction) is reported immediately and is never retried. A commit
//! conflict is an expected outcome of racing transactions: plain commits
//! report it as `Ok(false)`, and only the retry helpers surface it as
//! [`StmError::CommitConflict`] once their attempt budget is spent.

use crate::types::TxStatus;
use thiserror::Error;

/// All Strand errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StmError {
    /// Index outside `[0, capacity)`
    #[error("index {index} out of range for capacity {capacity}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Capacity of the container
        capacity: usize,
    },

    /// Commit or rollback on a transaction that is not the innermost one
    /// on its thread, or on a handle whose record no longer exists
    #[error("invalid nesting: {0}")]
    InvalidNesting(String),

    /// Write attempted with no open transaction on this thread
    #[error("no ambient transaction on this thread")]
    NoAmbientTransaction,

    /// Retry budget exhausted without a successful commit
    #[error("commit conflict after {attempts} attempt(s)")]
    CommitConflict {
        /// Number of commit attempts made
        attempts: u32,
    },

    /// Illegal transaction status transition
    #[error("invalid transition from {from} to {to}")]
    InvalidState {
        /// Status before the attempted transition
        from: TxStatus,
        /// Requested status
        to: TxStatus,
    },
}

/// Result type for Strand operations.
pub type Result<T> = std::result::Result<T, StmError>;

impl StmError {
    /// Check if this error is retryable.
    ///
    /// Only conflicts may succeed on retry with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StmError::CommitConflict { .. })
    }

    /// Check if this error reports API misuse rather than contention.
    pub fn is_misuse(&self) -> bool {
        !self.is_retryable()
    }

    /// Build an [`StmError::IndexOutOfRange`] when `index >= capacity`.
    #[inline]
    pub fn check_index(index: usize, capacity: usize) -> Result<()> {
        if index < capacity {
            Ok(())
        } else {
            Err(StmError::IndexOutOfRange { index, capacity })
        }
    }
}
