//! Concurrency layer for Strand
//!
//! This crate implements optimistic software transactional memory with:
//! - TxCell: versioned cells read and written through the ambient transaction
//! - Transaction: RAII guard with nesting, commit and rollback
//! - Conflict detection at commit time (per-cell version locks, no global lock)
//! - CellPool: recycling of discarded cells

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod context;
mod manager;
pub mod pool;
pub mod transaction;

pub use cell::TxCell;
pub use context::TxContext;
pub use manager::{metrics, TxMetrics};
pub use pool::{CellPool, PoolStats};
pub use transaction::{atomically, atomically_with, Transaction};

// Re-export the core vocabulary for convenience
pub use strand_core::{CellId, PoolConfig, Result, RetryPolicy, StmError, TxId, TxStatus};
