//! Convenient imports for Strand.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```
//! use strand::prelude::*;
//!
//! let cell = TxCell::new(1);
//! atomically(|| cell.modify(|n| n + 1)).unwrap();
//! assert_eq!(cell.read(), 2);
//! ```

// Transactions
pub use crate::{atomically, atomically_with, Transaction, TxCell};

// Containers
pub use crate::{CellPool, LazyCellArray, SlotArray};

// Error handling
pub use crate::{Result, StmError};

// Configuration
pub use crate::{ArrayConfig, PoolConfig, RetryPolicy};
