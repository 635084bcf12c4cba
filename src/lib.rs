//! # Strand
//!
//! Software transactional memory over lock-free slots.
//!
//! Strand lets any number of threads read and write shared cells inside
//! transactions that either commit atomically (all writes become visible
//! together) or roll back (no write is ever observed), without a global lock.
//!
//! ## Quick Start
//!
//! ```
//! use strand::prelude::*;
//!
//! let checking = TxCell::new(100);
//! let savings = TxCell::new(0);
//!
//! atomically(|| {
//!     let amount = 40;
//!     checking.write(checking.read() - amount)?;
//!     savings.write(savings.read() + amount)
//! })?;
//!
//! assert_eq!(checking.read() + savings.read(), 100);
//! # Ok::<(), StmError>(())
//! ```
//!
//! ## Layers
//!
//! - [`SlotArray`] - fixed-capacity array of independently CAS-able slots
//! - [`TxCell`] - versioned cell read and written through the ambient
//!   transaction
//! - [`Transaction`] - RAII guard: nesting, commit, rollback on drop
//! - [`CellPool`] - recycling of discarded cells
//! - [`LazyCellArray`] - indexed cells created on first access
//!
//! ## Explicit transactions
//!
//! ```
//! use strand::prelude::*;
//!
//! let a = TxCell::new(5);
//! {
//!     let _tx = Transaction::begin();
//!     a.write(7)?;
//!     assert_eq!(a.read(), 7);
//! } // dropped without commit
//! assert_eq!(a.read(), 5);
//! # Ok::<(), StmError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod prelude;

// Re-export the layers
pub use strand_concurrency::{
    atomically, atomically_with, metrics, CellPool, PoolStats, Transaction, TxCell, TxContext,
    TxMetrics,
};
pub use strand_primitives::{LazyCellArray, LazyCellArrayBuilder};
pub use strand_storage::SlotArray;

// Re-export core types
pub use strand_core::{
    ArrayConfig, CellId, PoolConfig, Result, RetryPolicy, StmError, TxId, TxStatus,
};
