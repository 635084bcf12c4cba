//! Storage layer for Strand
//!
//! This crate implements the lock-free substrate the transactional layer is
//! built on:
//! - SlotArray: fixed-capacity array of independently CAS-able slots

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod slot_array;

pub use slot_array::SlotArray;
