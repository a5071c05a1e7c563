//! Configuration types for mdindex
//!
//! This module defines configuration structures used across components.
//! Every field has a default so a partial (or missing) config file is valid.

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for mdindex
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store configuration
    pub store: StoreConfig,
    /// Index behavior
    pub index: IndexConfig,
    /// Periodic maintenance
    pub maintenance: MaintenanceConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl Config {
    /// Load a TOML config file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }
}

/// Backing store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb database file
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mdindex.redb"),
        }
    }
}

/// Index configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Lifetime of a record when nothing else bounds it (seconds)
    pub default_ttl_secs: i64,
    /// Derive collection expiry from `validUntil` / `cacheDuration`
    pub respect_validity: bool,
    /// How long a computed composite-key intersection is reused (seconds).
    /// Throttles repeated identical intersections; results may lag
    /// membership changes by up to this window.
    pub composite_cache_ttl_secs: i64,
    /// Digests registered as aliases for every entity
    pub alias_digests: Vec<DigestAlgorithm>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 4 * 24 * 60 * 60, // 4 days
            respect_validity: true,
            composite_cache_ttl_secs: 30,
            alias_digests: DigestAlgorithm::ALL.to_vec(),
        }
    }
}

/// Periodic maintenance configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between reaper runs (seconds)
    pub reap_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
