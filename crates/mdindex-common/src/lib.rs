//! mdindex Common - Shared types and utilities
//!
//! This crate provides the error type, configuration, digest family and
//! clock used across all mdindex components.

pub mod config;
pub mod digest;
pub mod error;

pub use config::Config;
pub use digest::DigestAlgorithm;
pub use error::{Error, Result};

/// Current time as Unix epoch seconds
#[must_use]
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
