//! mdindex keyed store - redb-backed storage primitives
//!
//! This crate provides the keyed store the metadata index is built on:
//! strings, hashes, sets and score-ordered sets with per-key absolute
//! expiry, and atomic execution of command batches.

pub mod batch;
pub mod store;
pub mod tables;

// Re-exports
pub use batch::{Batch, Command};
pub use store::{KvError, KvResult, KvStore};
