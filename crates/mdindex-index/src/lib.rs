//! mdindex Index - time-indexed metadata store
//!
//! This crate is the core of mdindex: it computes document expiry, persists
//! documents with their flat records, maintains expiry-scored membership
//! groups and digest aliases, resolves lookups and reaps stale entries.

pub mod alias;
pub mod expiration;
pub mod keys;
pub mod lookup;
pub mod membership;
pub mod persist;
pub mod reaper;
pub mod store;

pub use expiration::expiration;
pub use lookup::Lookup;
pub use reaper::ReapStats;
pub use store::IndexStore;
