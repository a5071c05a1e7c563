//! Group membership indexing.
//!
//! A member's score is its expiry, so freshness is a score range query.
//! Membership is a relation: dropping a member from a group never touches
//! the member's record.

use crate::keys;
use mdindex_kv::Batch;

/// Registry a group is recorded in when a member is added
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registry {
    /// Record the group in the collection registry
    Collection,
    /// The group is tracked elsewhere (attribute groups, the global registry)
    Unregistered,
}

/// Stage `member` into `group`, scored by `expiry`
pub fn add_member(
    batch: &mut Batch,
    group: &str,
    member: &str,
    expiry: Option<i64>,
    registry: Registry,
) {
    batch.zadd(keys::members(group), member, keys::score(expiry));
    if registry == Registry::Collection {
        batch.sadd(keys::COLLECTIONS, group);
    }
}

/// Stage `member` into the group of attribute `name` = `value`, record the
/// value in the attribute's value index and register the attribute name.
///
/// A value's score in the index is recomputed from its group when the batch
/// applies: the latest expiry of any member holding it. Re-indexing a member
/// with a shorter expiry therefore lowers the value, while another live
/// holder keeps it listed.
pub fn add_attribute_value(
    batch: &mut Batch,
    name: &str,
    value: &str,
    member: &str,
    expiry: Option<i64>,
) {
    let group = keys::attribute_group(name, value);
    add_member(batch, &group, member, expiry, Registry::Unregistered);
    batch.zadd_max_of(keys::values(name), value, keys::members(&group));
    batch.sadd(keys::ATTRIBUTES, name);
}
