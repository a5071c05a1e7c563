//! Metadata index store
//!
//! Ties the expiration calculator, persister, membership indexer and alias
//! resolver together behind `update`, and exposes the query surface.
//! Every `update` stages all derived writes, including those of a
//! collection's children, into one batch that commits atomically.

use crate::alias::register_aliases;
use crate::expiration::expiration;
use crate::keys;
use crate::lookup::{Lookup, Resolver};
use crate::membership::{Registry, add_attribute_value, add_member};
use crate::persist::persist;
use crate::reaper::{self, ReapStats};
use chrono::{DateTime, Utc};
use mdindex_common::config::IndexConfig;
use mdindex_common::{Config, Error, Result};
use mdindex_kv::{Batch, KvStore};
use mdindex_metadata::{Document, DocumentKind};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Time-indexed store of metadata documents and their derived indexes
pub struct IndexStore {
    kv: KvStore,
    config: IndexConfig,
}

impl IndexStore {
    pub const fn new(kv: KvStore, config: IndexConfig) -> Self {
        Self { kv, config }
    }

    /// Open the file-backed store named by the configuration
    pub fn open(config: &Config) -> Result<Self> {
        let kv = KvStore::open(&config.store.path)?;
        Ok(Self::new(kv, config.index.clone()))
    }

    /// Underlying keyed store
    #[must_use]
    pub const fn kv(&self) -> &KvStore {
        &self.kv
    }

    #[must_use]
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Index `doc`; returns the number of entities written.
    ///
    /// An entity is stored under `id` (or its `entityID`) and expires at
    /// `expiry` (or after the default TTL); its validity hints are not
    /// consulted. A collection is stored under `id` (or its `Name`) and
    /// always derives its expiry from its own validity hints; every entity
    /// below it, at any depth, is indexed with that expiry and joins the
    /// collection and the global entity registry.
    pub fn update(&self, doc: &Document, id: Option<&str>, expiry: Option<i64>) -> Result<usize> {
        let now = Utc::now();
        let mut batch = Batch::new();
        let count = self.stage(&mut batch, doc, id, expiry, now)?;
        self.kv.execute(&batch)?;
        debug!(commands = batch.len(), entities = count, "Committed update");
        Ok(count)
    }

    fn stage(
        &self,
        batch: &mut Batch,
        doc: &Document,
        id: Option<&str>,
        expiry: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let kind = doc.kind()?;
        let id = id
            .or_else(|| doc.identifier())
            .ok_or(Error::MissingIdentifier)?;

        match kind {
            DocumentKind::Entity => {
                let expires = expiry.unwrap_or(now.timestamp() + self.config.default_ttl_secs);
                persist(batch, id, doc.to_bytes()?, doc.attributes(), Some(expires));
                for (name, values) in doc.categorical_attributes() {
                    for value in &values {
                        add_attribute_value(batch, &name, value, id, Some(expires));
                    }
                }
                register_aliases(batch, id, Some(expires), &self.config.alias_digests);
                debug!(id, expires, "Staged entity");
                Ok(1)
            }
            DocumentKind::EntityCollection => {
                if expiry.is_some() {
                    debug!(id, "Ignoring explicit expiry for collection");
                }
                let expires = expiration(doc, now, &self.config);
                persist(batch, id, doc.to_bytes()?, doc.attributes(), Some(expires));

                let mut count = 0;
                for child in doc.entities() {
                    let Some(child_id) = child.identifier().map(str::to_string) else {
                        warn!(collection = id, "Skipping entity without entityID");
                        continue;
                    };
                    count += self.stage(batch, &child, Some(&child_id), Some(expires), now)?;
                    add_member(batch, id, &child_id, Some(expires), Registry::Collection);
                    add_member(batch, keys::ENTITIES, &child_id, Some(expires), Registry::Unregistered);
                }
                info!(collection = id, entities = count, expires, "Staged collection");
                Ok(count)
            }
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(
            &self.kv,
            self.config.composite_cache_ttl_secs,
            mdindex_common::now(),
        )
    }

    /// Resolve `key` as a composite, alias, document id or group name
    pub fn lookup(&self, key: &str) -> Result<Lookup> {
        self.resolver().lookup(key)
    }

    /// Documents of the fresh members of `group`
    pub fn members(&self, group: &str) -> Result<Vec<Document>> {
        self.resolver().members(group)
    }

    /// Known categorical attribute names
    pub fn attributes(&self) -> Result<BTreeSet<String>> {
        Ok(self.kv.smembers(keys::ATTRIBUTES)?)
    }

    /// Values of attribute `name` held by at least one fresh entity
    #[allow(clippy::cast_precision_loss)]
    pub fn attribute_values(&self, name: &str) -> Result<Vec<String>> {
        let now = mdindex_common::now() as f64;
        Ok(self
            .kv
            .zrange_by_score(&keys::values(name), now, f64::INFINITY)?)
    }

    /// Known collection names
    pub fn collections(&self) -> Result<BTreeSet<String>> {
        Ok(self.kv.smembers(keys::COLLECTIONS)?)
    }

    /// Number of fresh entities in the global registry
    #[allow(clippy::cast_precision_loss)]
    pub fn size(&self) -> Result<usize> {
        let now = mdindex_common::now() as f64;
        Ok(self
            .kv
            .zcount(&keys::members(keys::ENTITIES), now, f64::INFINITY)?)
    }

    /// Remove everything
    pub fn reset(&self) -> Result<()> {
        self.kv.flush()?;
        info!("Store reset");
        Ok(())
    }

    /// Drop expired memberships and empty registry entries
    pub fn reap(&self) -> Result<ReapStats> {
        reaper::reap(&self.kv, mdindex_common::now())
    }

    /// Flat attribute record of `id`
    pub fn record(&self, id: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.kv.hget_all(id)?)
    }

    /// Replace the flat attribute record of `id`
    pub fn set_record(&self, id: &str, fields: BTreeMap<String, String>) -> Result<()> {
        self.kv.hset_all(id, fields)?;
        Ok(())
    }
}
