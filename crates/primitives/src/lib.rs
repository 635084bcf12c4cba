//! Primitives layer for Strand
//!
//! Containers built from the storage and concurrency layers:
//! - LazyCellArray: indexed transactional cells, created on first access,
//!   recycled through a cell pool

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lazy_array;

pub use lazy_array::{LazyCellArray, LazyCellArrayBuilder};
