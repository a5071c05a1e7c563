//! Expiry computation from a document's validity hints.

use chrono::{DateTime, Utc};
use mdindex_common::config::IndexConfig;
use mdindex_metadata::{Document, parse_duration, parse_instant};
use tracing::debug;

/// Absolute expiry (epoch seconds) for `doc` ingested at `now`.
///
/// Starts from `now + default_ttl`. With `respect_validity`, a parseable
/// `validUntil` replaces it, then a parseable `cacheDuration` replaces that,
/// so the duration wins when both are present. Malformed hints are skipped.
#[must_use]
pub fn expiration(doc: &Document, now: DateTime<Utc>, config: &IndexConfig) -> i64 {
    let mut expires = now.timestamp() + config.default_ttl_secs;
    if !config.respect_validity {
        return expires;
    }

    if let Some(raw) = doc.valid_until() {
        match parse_instant(raw) {
            Some(at) => expires = at.timestamp(),
            None => debug!(valid_until = raw, "Ignoring unparseable validUntil"),
        }
    }

    if let Some(raw) = doc.cache_duration() {
        match parse_duration(raw).and_then(|d| d.after(now)) {
            Some(at) => expires = at.timestamp(),
            None => debug!(cache_duration = raw, "Ignoring unparseable cacheDuration"),
        }
    }

    expires
}
