//! Key layout in the keyed store.

/// Set of known collection names
pub const COLLECTIONS: &str = "#collections";
/// Set of known categorical attribute names
pub const ATTRIBUTES: &str = "#attributes";
/// Group holding every entity ingested through a collection
pub const ENTITIES: &str = "entities";
/// Joins group names in a composite (intersection) key
pub const COMPOSITE_DELIMITER: char = '+';
/// Record field holding the record's expiry
pub const EXPIRES_FIELD: &str = "expires";

/// Serialized document of `id`
#[must_use]
pub fn metadata(id: &str) -> String {
    format!("{id}#metadata")
}

/// Sorted membership set of `group`
#[must_use]
pub fn members(group: &str) -> String {
    format!("{group}#members")
}

/// Sorted index of the values seen for attribute `name`
#[must_use]
pub fn values(name: &str) -> String {
    format!("{name}#values")
}

/// Alias entry for lookup key `key`
#[must_use]
pub fn alias(key: &str) -> String {
    format!("{key}#alias")
}

/// Group name for one attribute value, qualified by the attribute name so
/// equal values of different attributes never share a group
#[must_use]
pub fn attribute_group(name: &str, value: &str) -> String {
    format!("{{{name}}}{value}")
}

/// Membership score for an expiry; no expiry never leaves the freshness range
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score(expiry: Option<i64>) -> f64 {
    expiry.map_or(f64::INFINITY, |ts| ts as f64)
}
