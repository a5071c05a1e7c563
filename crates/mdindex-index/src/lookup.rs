//! Lookup resolution: composite, alias, direct document, then membership.

use crate::keys;
use mdindex_common::{DigestAlgorithm, Result};
use mdindex_kv::{Batch, KvStore};
use mdindex_metadata::Document;
use tracing::{debug, warn};

/// Aliases and groups resolve through at most this many hops
const MAX_DEPTH: usize = 8;

/// Result of a lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Nothing matched the key
    Empty,
    /// The key named a stored document (directly or through an alias)
    Document(Document),
    /// The key named a group; its fresh members
    Documents(Vec<Document>),
}

impl Lookup {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Document(_) => false,
            Self::Documents(docs) => docs.is_empty(),
        }
    }

    /// Flatten into a list of documents
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Empty => Vec::new(),
            Self::Document(doc) => vec![doc],
            Self::Documents(docs) => docs,
        }
    }
}

/// Resolves keys against the store as of one instant
pub(crate) struct Resolver<'a> {
    kv: &'a KvStore,
    composite_ttl: i64,
    now: i64,
}

impl<'a> Resolver<'a> {
    pub(crate) const fn new(kv: &'a KvStore, composite_ttl: i64, now: i64) -> Self {
        Self {
            kv,
            composite_ttl,
            now,
        }
    }

    pub(crate) fn lookup(&self, key: &str) -> Result<Lookup> {
        if key.contains(keys::COMPOSITE_DELIMITER) {
            let derived = self.intersect(key)?;
            return self.resolve(&derived, 0);
        }
        self.resolve(key, 0)
    }

    /// Fresh members of `group`, each resolved and flattened
    pub(crate) fn members(&self, group: &str) -> Result<Vec<Document>> {
        self.fresh_members(group, 0)
    }

    /// Materialize the intersection of the named groups under a derived key
    /// unless a cached one is still live; returns the derived group name.
    fn intersect(&self, key: &str) -> Result<String> {
        let derived = DigestAlgorithm::Sha1.hex_digest(key);
        let dest = keys::members(&derived);
        if self.kv.exists(&dest)? {
            debug!(key, derived = %derived, "Composite lookup cache hit");
            return Ok(derived);
        }

        let sources: Vec<String> = key
            .split(keys::COMPOSITE_DELIMITER)
            .filter(|part| !part.is_empty())
            .map(keys::members)
            .collect();
        let mut batch = Batch::new();
        batch
            .zinterstore(dest.as_str(), sources)
            .expire_at(dest, self.now + self.composite_ttl);
        self.kv.execute(&batch)?;
        debug!(key, derived = %derived, "Computed composite intersection");
        Ok(derived)
    }

    fn resolve(&self, key: &str, depth: usize) -> Result<Lookup> {
        if depth > MAX_DEPTH {
            warn!(key, "Lookup exceeded maximum resolution depth");
            return Ok(Lookup::Empty);
        }

        if let Some(target) = self.kv.get_string(&keys::alias(key))? {
            return self.resolve(&target, depth + 1);
        }

        if let Some(bytes) = self.kv.get(&keys::metadata(key))? {
            return Ok(Lookup::Document(Document::parse(&bytes)?));
        }

        let docs = self.fresh_members(key, depth)?;
        if docs.is_empty() {
            Ok(Lookup::Empty)
        } else {
            Ok(Lookup::Documents(docs))
        }
    }

    fn fresh_members(&self, group: &str, depth: usize) -> Result<Vec<Document>> {
        #[allow(clippy::cast_precision_loss)]
        let ids = self
            .kv
            .zrange_by_score(&keys::members(group), self.now as f64, f64::INFINITY)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            docs.extend(self.resolve(&id, depth + 1)?.into_documents());
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_result_shapes() {
        let doc = Document::parse(br#"<EntityDescriptor entityID="x"/>"#).unwrap();
        assert!(Lookup::Empty.is_empty());
        assert!(Lookup::Documents(Vec::new()).is_empty());
        assert!(!Lookup::Document(doc.clone()).is_empty());
        assert_eq!(Lookup::Document(doc.clone()).into_documents(), vec![doc]);
        assert!(Lookup::Empty.into_documents().is_empty());
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let kv = KvStore::in_memory().unwrap();
        let resolver = Resolver::new(&kv, 30, mdindex_common::now());
        assert_eq!(resolver.lookup("nope").unwrap(), Lookup::Empty);
        assert_eq!(resolver.lookup("a+b").unwrap(), Lookup::Empty);
        assert!(resolver.members("nope").unwrap().is_empty());
    }

    #[test]
    fn test_alias_cycle_is_bounded() {
        let kv = KvStore::in_memory().unwrap();
        kv.set(&keys::alias("a"), b"b").unwrap();
        kv.set(&keys::alias("b"), b"a").unwrap();
        let resolver = Resolver::new(&kv, 30, mdindex_common::now());
        assert_eq!(resolver.lookup("a").unwrap(), Lookup::Empty);
    }

    #[test]
    fn test_composite_result_is_cached_with_ttl() {
        let kv = KvStore::in_memory().unwrap();
        let now = mdindex_common::now();
        kv.zadd("A#members", "y", f64::INFINITY).unwrap();
        kv.zadd("B#members", "y", f64::INFINITY).unwrap();

        let resolver = Resolver::new(&kv, 30, now);
        resolver.lookup("A+B").unwrap();

        let dest = keys::members(&DigestAlgorithm::Sha1.hex_digest("A+B"));
        assert_eq!(kv.zrange_by_score(&dest, 0.0, f64::INFINITY).unwrap(), vec!["y"]);
        assert_eq!(kv.expires_at(&dest).unwrap(), Some(now + 30));
    }
}
