//! Periodic compaction of membership groups and registries.
//!
//! Records are left to the store's per-key expiry; only group entries scored
//! before `now` are dropped, along with registry names whose groups emptied.

use crate::keys;
use mdindex_common::Result;
use mdindex_kv::{Batch, KvStore};
use tracing::{debug, info};

/// Counts from one reaper pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapStats {
    /// Membership and value-index entries removed
    pub expired_members: usize,
    /// Collection names removed from the collection registry
    pub dropped_collections: usize,
    /// Attribute names removed from the attribute registry
    pub dropped_attributes: usize,
}

/// Commands for one reaper pass.
///
/// Planning only enumerates the registries. Whether a group is empty is
/// decided when the batch applies, so an update committed in between keeps
/// its collection and attribute registered.
pub struct ReapPlan {
    batch: Batch,
    prunes: Vec<usize>,
    collection_drops: Vec<(usize, String)>,
    attribute_drops: Vec<(usize, String)>,
}

impl ReapPlan {
    #[allow(clippy::cast_precision_loss)]
    fn prune(&mut self, key: String, now: i64) {
        self.prunes.push(self.batch.len());
        self.batch
            .zrem_range_by_score(key, f64::NEG_INFINITY, (now - 1) as f64);
    }

    /// Apply the pass as one batch
    pub fn apply(self, kv: &KvStore) -> Result<ReapStats> {
        let affected = kv.execute(&self.batch)?;
        let count = |index: usize| affected.get(index).copied().unwrap_or(0);

        let mut stats = ReapStats {
            expired_members: self.prunes.iter().map(|&i| count(i)).sum(),
            ..ReapStats::default()
        };
        for (index, collection) in &self.collection_drops {
            if count(*index) > 0 {
                debug!(collection = %collection, "Dropped empty collection");
                stats.dropped_collections += 1;
            }
        }
        for (index, name) in &self.attribute_drops {
            if count(*index) > 0 {
                debug!(attribute = %name, "Dropped empty attribute");
                stats.dropped_attributes += 1;
            }
        }

        info!(
            expired_members = stats.expired_members,
            dropped_collections = stats.dropped_collections,
            dropped_attributes = stats.dropped_attributes,
            "Reaper pass complete"
        );
        Ok(stats)
    }
}

/// Stage pruning of every group scored before `now` and unregistration of
/// every registry entry whose group ends up empty
pub fn plan(kv: &KvStore, now: i64) -> Result<ReapPlan> {
    let mut plan = ReapPlan {
        batch: Batch::new(),
        prunes: Vec::new(),
        collection_drops: Vec::new(),
        attribute_drops: Vec::new(),
    };

    plan.prune(keys::members(keys::ENTITIES), now);

    for collection in kv.smembers(keys::COLLECTIONS)? {
        let group = keys::members(&collection);
        plan.prune(group.clone(), now);
        plan.collection_drops.push((plan.batch.len(), collection.clone()));
        plan.batch.srem_if_empty(keys::COLLECTIONS, collection, group);
    }

    for name in kv.smembers(keys::ATTRIBUTES)? {
        let index = keys::values(&name);
        for value in kv.zrange_by_score(&index, f64::NEG_INFINITY, f64::INFINITY)? {
            plan.prune(keys::members(&keys::attribute_group(&name, &value)), now);
        }
        plan.prune(index.clone(), now);
        plan.attribute_drops.push((plan.batch.len(), name.clone()));
        plan.batch.srem_if_empty(keys::ATTRIBUTES, name, index);
    }

    Ok(plan)
}

/// One reaper pass as of `now`
pub fn reap(kv: &KvStore, now: i64) -> Result<ReapStats> {
    plan(kv, now)?.apply(kv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_empty_store() {
        let kv = KvStore::in_memory().unwrap();
        assert_eq!(reap(&kv, 1000).unwrap(), ReapStats::default());
    }

    #[test]
    fn test_reap_prunes_and_unregisters() {
        let kv = KvStore::in_memory().unwrap();
        let now = 1000;

        kv.zadd("entities#members", "old", 10.0).unwrap();
        kv.zadd("entities#members", "new", 2000.0).unwrap();
        kv.zadd("gone#members", "old", 10.0).unwrap();
        kv.zadd("kept#members", "old", 10.0).unwrap();
        kv.zadd("kept#members", "new", 2000.0).unwrap();
        kv.sadd("#collections", "gone").unwrap();
        kv.sadd("#collections", "kept").unwrap();

        kv.zadd("{role}idp#members", "old", 10.0).unwrap();
        kv.zadd("{role}sp#members", "new", 2000.0).unwrap();
        kv.zadd("role#values", "idp", 10.0).unwrap();
        kv.zadd("role#values", "sp", 2000.0).unwrap();
        kv.zadd("{tag}x#members", "old", 10.0).unwrap();
        kv.zadd("tag#values", "x", 10.0).unwrap();
        kv.sadd("#attributes", "role").unwrap();
        kv.sadd("#attributes", "tag").unwrap();
        kv.set("old#metadata", b"<kept/>").unwrap();

        let stats = reap(&kv, now).unwrap();
        assert_eq!(stats, ReapStats {
            expired_members: 7,
            dropped_collections: 1,
            dropped_attributes: 1,
        });

        assert_eq!(kv.smembers("#collections").unwrap().into_iter().collect::<Vec<_>>(), vec!["kept"]);
        assert_eq!(kv.smembers("#attributes").unwrap().into_iter().collect::<Vec<_>>(), vec!["role"]);
        assert_eq!(kv.zrange_by_score("kept#members", f64::NEG_INFINITY, f64::INFINITY).unwrap(), vec!["new"]);
        assert_eq!(kv.zrange_by_score("role#values", f64::NEG_INFINITY, f64::INFINITY).unwrap(), vec!["sp"]);
        assert_eq!(kv.zcard("{role}idp#members").unwrap(), 0);
        assert_eq!(kv.zcard("entities#members").unwrap(), 1);
        // Records are untouched
        assert!(kv.exists("old#metadata").unwrap());
    }

    #[test]
    fn test_update_between_plan_and_apply_keeps_registration() {
        let kv = KvStore::in_memory().unwrap();
        kv.zadd("fed#members", "old", 10.0).unwrap();
        kv.sadd("#collections", "fed").unwrap();
        kv.zadd("{role}sp#members", "old", 10.0).unwrap();
        kv.zadd("role#values", "sp", 10.0).unwrap();
        kv.sadd("#attributes", "role").unwrap();

        let pass = plan(&kv, 1000).unwrap();

        // A concurrent update lands before the pass applies
        let mut update = Batch::new();
        update
            .zadd("fed#members", "new", 2000.0)
            .sadd("#collections", "fed")
            .zadd("{role}sp#members", "new", 2000.0)
            .zadd_max_of("role#values", "sp", "{role}sp#members")
            .sadd("#attributes", "role");
        kv.execute(&update).unwrap();

        let stats = pass.apply(&kv).unwrap();
        assert_eq!(stats, ReapStats {
            expired_members: 2,
            dropped_collections: 0,
            dropped_attributes: 0,
        });
        assert!(kv.smembers("#collections").unwrap().contains("fed"));
        assert!(kv.smembers("#attributes").unwrap().contains("role"));
        assert_eq!(kv.zrange_by_score("fed#members", f64::NEG_INFINITY, f64::INFINITY).unwrap(), vec!["new"]);
    }

    #[test]
    fn test_score_equal_to_now_survives() {
        let kv = KvStore::in_memory().unwrap();
        kv.zadd("fed#members", "edge", 1000.0).unwrap();
        kv.sadd("#collections", "fed").unwrap();
        let stats = reap(&kv, 1000).unwrap();
        assert_eq!(stats.expired_members, 0);
        assert!(kv.smembers("#collections").unwrap().contains("fed"));
    }
}
