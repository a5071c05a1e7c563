//! Redb table definitions for the keyed store.
//!
//! Set and sorted-set members live under a composite key
//! `"<key>\0<member>"`, so all members of one key form a contiguous range.

use redb::TableDefinition;

// Plain values
pub const STRINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("strings");
// Key: hash name, Value: bincode-encoded BTreeMap<String, String>
pub const HASHES: TableDefinition<&str, &[u8]> = TableDefinition::new("hashes");

// Key: "set\0member"
pub const SET_MEMBERS: TableDefinition<&str, ()> = TableDefinition::new("set_members");
// Key: "zset\0member", Value: score
pub const ZSET_MEMBERS: TableDefinition<&str, f64> = TableDefinition::new("zset_members");

// Key: any logical key, Value: absolute expiry (epoch seconds)
pub const EXPIRY: TableDefinition<&str, i64> = TableDefinition::new("expiry");

/// Separator between a key and a member in composite keys
pub const MEMBER_SEPARATOR: char = '\0';

/// Prefix shared by every member row of `key`
#[must_use]
pub fn member_prefix(key: &str) -> String {
    format!("{key}{MEMBER_SEPARATOR}")
}

/// Composite row key for `member` of `key`
#[must_use]
pub fn member_key(key: &str, member: &str) -> String {
    format!("{key}{MEMBER_SEPARATOR}{member}")
}
