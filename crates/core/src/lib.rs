//! Core types for Strand
//!
//! This crate defines the vocabulary shared by every layer:
//! - [`StmError`] / [`Result`]: the error taxonomy
//! - [`CellId`], [`TxId`]: identities for cells and transactions
//! - [`TxStatus`]: the transaction state machine
//! - [`config`]: pool, retry and array configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ArrayConfig, PoolConfig, RetryPolicy};
pub use error::{Result, StmError};
pub use types::{CellId, TxId, TxStatus};
