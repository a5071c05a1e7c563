//! Keyed store backed by redb.
//!
//! Provides strings, hashes, sets and score-ordered sets with per-key
//! absolute expiry. Every mutation goes through [`KvStore::execute`], which
//! applies a [`Batch`] inside one redb write transaction, so a batch is
//! either fully visible or not at all.
//!
//! Expiry is lazy: an expired key reads as absent and is purged the next
//! time a command writes it. [`KvStore::evict_expired`] sweeps the rest.

use crate::batch::{Batch, Command};
use crate::tables::{self, member_key, member_prefix};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadOnlyTable, ReadableTable, Table, WriteTransaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Error type for keyed store operations
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("value is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for KvError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<KvError> for mdindex_common::Error {
    fn from(e: KvError) -> Self {
        match e {
            KvError::Io(e) => Self::Io(e),
            KvError::Redb(redb::DatabaseError::DatabaseAlreadyOpen) | KvError::Transaction(_) => {
                Self::StoreUnavailable(e.to_string())
            }
            other => Self::Store(other.to_string()),
        }
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// Keyed store backed by redb.
pub struct KvStore {
    db: Database,
}

impl KvStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        info!("Opened keyed store at {}", path.display());
        Self::init(db)
    }

    /// Create a store that lives only in memory.
    pub fn in_memory() -> KvResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> KvResult<Self> {
        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::STRINGS)?;
            let _t = write_txn.open_table(tables::HASHES)?;
            let _t = write_txn.open_table(tables::SET_MEMBERS)?;
            let _t = write_txn.open_table(tables::ZSET_MEMBERS)?;
            let _t = write_txn.open_table(tables::EXPIRY)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    // ---- Batches ----

    /// Apply every command of `batch` in one write transaction; returns
    /// the number of entries each command affected, in batch order.
    pub fn execute(&self, batch: &Batch) -> KvResult<Vec<usize>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let now = mdindex_common::now();
        let write_txn = self.db.begin_write()?;
        let affected = {
            let mut tables = WriteTables::open(&write_txn)?;
            batch
                .commands()
                .iter()
                .map(|command| tables.apply(command, now))
                .collect::<KvResult<Vec<_>>>()?
        };
        write_txn.commit()?;
        debug!(commands = batch.len(), "Committed batch");
        Ok(affected)
    }

    fn execute_one(&self, command: &Command) -> KvResult<usize> {
        let now = mdindex_common::now();
        let write_txn = self.db.begin_write()?;
        let affected = {
            let mut tables = WriteTables::open(&write_txn)?;
            tables.apply(command, now)?
        };
        write_txn.commit()?;
        Ok(affected)
    }

    // ---- Strings ----

    pub fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.execute_one(&Command::Set {
            key: key.to_string(),
            value: value.to_vec(),
        })
        .map(|_| ())
    }

    pub fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(None);
            }
            Ok(t.strings.get(key)?.map(|v| v.value().to_vec()))
        })
    }

    pub fn get_string(&self, key: &str) -> KvResult<Option<String>> {
        self.get(key)?.map(String::from_utf8).transpose().map_err(Into::into)
    }

    // ---- Keys ----

    /// Set an absolute expiry on an existing key. Returns false if the key
    /// does not exist.
    pub fn expire_at(&self, key: &str, at: i64) -> KvResult<bool> {
        let affected = self.execute_one(&Command::ExpireAt {
            key: key.to_string(),
            at,
        })?;
        Ok(affected > 0)
    }

    /// Absolute expiry of a live key, if one is set
    pub fn expires_at(&self, key: &str) -> KvResult<Option<i64>> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(None);
            }
            Ok(t.expiry.get(key)?.map(|v| v.value()))
        })
    }

    pub fn exists(&self, key: &str) -> KvResult<bool> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(false);
            }
            Ok(t.strings.get(key)?.is_some()
                || t.hashes.get(key)?.is_some()
                || has_members(&t.sets, key)?
                || has_members(&t.zsets, key)?)
        })
    }

    // ---- Hashes ----

    pub fn hset_all(&self, key: &str, fields: BTreeMap<String, String>) -> KvResult<()> {
        self.execute_one(&Command::HashSetAll {
            key: key.to_string(),
            fields,
        })
        .map(|_| ())
    }

    pub fn hget_all(&self, key: &str) -> KvResult<Option<BTreeMap<String, String>>> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(None);
            }
            match t.hashes.get(key)? {
                Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
                None => Ok(None),
            }
        })
    }

    // ---- Sets ----

    pub fn sadd(&self, key: &str, member: &str) -> KvResult<bool> {
        let added = self.execute_one(&Command::SetAdd {
            key: key.to_string(),
            member: member.to_string(),
        })?;
        Ok(added > 0)
    }

    pub fn smembers(&self, key: &str) -> KvResult<BTreeSet<String>> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(BTreeSet::new());
            }
            Ok(member_rows(&t.sets, key)?
                .into_iter()
                .map(|(member, ())| member)
                .collect())
        })
    }

    // ---- Sorted sets ----

    pub fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<bool> {
        let added = self.execute_one(&Command::ZAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        })?;
        Ok(added > 0)
    }

    /// Members with `min <= score <= max`, ordered by score then member
    pub fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> KvResult<Vec<String>> {
        Ok(self
            .zrange_by_score_with_scores(key, min, max)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    pub fn zrange_by_score_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> KvResult<Vec<(String, f64)>> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(Vec::new());
            }
            let mut entries: Vec<(String, f64)> = member_rows(&t.zsets, key)?
                .into_iter()
                .filter(|(_, score)| *score >= min && *score <= max)
                .collect();
            entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            Ok(entries)
        })
    }

    pub fn zcard(&self, key: &str) -> KvResult<usize> {
        self.read(|t| {
            if !t.live(key)? {
                return Ok(0);
            }
            Ok(member_rows(&t.zsets, key)?.len())
        })
    }

    pub fn zcount(&self, key: &str, min: f64, max: f64) -> KvResult<usize> {
        Ok(self.zrange_by_score_with_scores(key, min, max)?.len())
    }

    /// Remove members with `min <= score <= max`; returns how many
    pub fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> KvResult<usize> {
        self.execute_one(&Command::ZRemRangeByScore {
            key: key.to_string(),
            min,
            max,
        })
    }

    /// Store the intersection of `sources` at `dest`, scoring each member by
    /// its lowest score; returns its cardinality
    pub fn zinterstore(&self, dest: &str, sources: &[String]) -> KvResult<usize> {
        self.execute_one(&Command::ZInterStore {
            dest: dest.to_string(),
            sources: sources.to_vec(),
        })
    }

    // ---- Maintenance ----

    /// Physically delete every key whose expiry has passed; returns how many
    pub fn evict_expired(&self) -> KvResult<usize> {
        let now = mdindex_common::now();
        let write_txn = self.db.begin_write()?;
        let evicted = {
            let mut tables = WriteTables::open(&write_txn)?;
            let mut expired = Vec::new();
            for entry in tables.expiry.iter()? {
                let (key, at) = entry?;
                if at.value() <= now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                tables.delete_key(key)?;
            }
            expired.len()
        };
        write_txn.commit()?;
        if evicted > 0 {
            debug!(evicted, "Evicted expired keys");
        }
        Ok(evicted)
    }

    /// Remove every key
    pub fn flush(&self) -> KvResult<()> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(tables::STRINGS)?;
        write_txn.delete_table(tables::HASHES)?;
        write_txn.delete_table(tables::SET_MEMBERS)?;
        write_txn.delete_table(tables::ZSET_MEMBERS)?;
        write_txn.delete_table(tables::EXPIRY)?;
        {
            let _t = write_txn.open_table(tables::STRINGS)?;
            let _t = write_txn.open_table(tables::HASHES)?;
            let _t = write_txn.open_table(tables::SET_MEMBERS)?;
            let _t = write_txn.open_table(tables::ZSET_MEMBERS)?;
            let _t = write_txn.open_table(tables::EXPIRY)?;
        }
        write_txn.commit()?;
        info!("Flushed keyed store");
        Ok(())
    }

    // ---- Generic helpers ----

    fn read<R>(&self, f: impl FnOnce(&ReadTables) -> KvResult<R>) -> KvResult<R> {
        let read_txn = self.db.begin_read()?;
        let tables = ReadTables {
            strings: read_txn.open_table(tables::STRINGS)?,
            hashes: read_txn.open_table(tables::HASHES)?,
            sets: read_txn.open_table(tables::SET_MEMBERS)?,
            zsets: read_txn.open_table(tables::ZSET_MEMBERS)?,
            expiry: read_txn.open_table(tables::EXPIRY)?,
            now: mdindex_common::now(),
        };
        f(&tables)
    }
}

struct ReadTables {
    strings: ReadOnlyTable<&'static str, &'static [u8]>,
    hashes: ReadOnlyTable<&'static str, &'static [u8]>,
    sets: ReadOnlyTable<&'static str, ()>,
    zsets: ReadOnlyTable<&'static str, f64>,
    expiry: ReadOnlyTable<&'static str, i64>,
    now: i64,
}

impl ReadTables {
    fn live(&self, key: &str) -> KvResult<bool> {
        Ok(!is_expired(&self.expiry, key, self.now)?)
    }
}

struct WriteTables<'txn> {
    strings: Table<'txn, &'static str, &'static [u8]>,
    hashes: Table<'txn, &'static str, &'static [u8]>,
    sets: Table<'txn, &'static str, ()>,
    zsets: Table<'txn, &'static str, f64>,
    expiry: Table<'txn, &'static str, i64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> KvResult<Self> {
        Ok(Self {
            strings: txn.open_table(tables::STRINGS)?,
            hashes: txn.open_table(tables::HASHES)?,
            sets: txn.open_table(tables::SET_MEMBERS)?,
            zsets: txn.open_table(tables::ZSET_MEMBERS)?,
            expiry: txn.open_table(tables::EXPIRY)?,
        })
    }

    /// Apply one command; returns the number of affected entries
    fn apply(&mut self, command: &Command, now: i64) -> KvResult<usize> {
        let key = command.key();
        if is_expired(&self.expiry, key, now)? {
            self.delete_key(key)?;
        }

        match command {
            Command::Set { key, value } => {
                self.strings.insert(key.as_str(), value.as_slice())?;
                self.expiry.remove(key.as_str())?;
                Ok(1)
            }
            Command::ExpireAt { key, at } => {
                if !self.exists(key)? {
                    return Ok(0);
                }
                self.expiry.insert(key.as_str(), *at)?;
                Ok(1)
            }
            Command::HashSetAll { key, fields } => {
                let bytes = bincode::serialize(fields)?;
                self.hashes.insert(key.as_str(), bytes.as_slice())?;
                Ok(fields.len())
            }
            Command::SetAdd { key, member } => {
                let row = member_key(key, member);
                Ok(usize::from(self.sets.insert(row.as_str(), ())?.is_none()))
            }
            Command::ZAdd { key, member, score } => {
                let row = member_key(key, member);
                Ok(usize::from(self.zsets.insert(row.as_str(), *score)?.is_none()))
            }
            Command::ZAddMaxOf {
                key,
                member,
                source,
            } => {
                let row = member_key(key, member);
                let highest = if is_expired(&self.expiry, source, now)? {
                    None
                } else {
                    member_rows(&self.zsets, source)?
                        .into_iter()
                        .map(|(_, score)| score)
                        .max_by(f64::total_cmp)
                };
                match highest {
                    Some(score) => {
                        self.zsets.insert(row.as_str(), score)?;
                        Ok(1)
                    }
                    None => {
                        let removed = usize::from(self.zsets.remove(row.as_str())?.is_some());
                        self.drop_expiry_if_gone(key)?;
                        Ok(removed)
                    }
                }
            }
            Command::SetRemoveIfEmpty { key, member, guard } => {
                if !is_expired(&self.expiry, guard, now)? && has_members(&self.zsets, guard)? {
                    return Ok(0);
                }
                let row = member_key(key, member);
                let removed = usize::from(self.sets.remove(row.as_str())?.is_some());
                self.drop_expiry_if_gone(key)?;
                Ok(removed)
            }
            Command::ZRemRangeByScore { key, min, max } => {
                let doomed: Vec<String> = member_rows(&self.zsets, key)?
                    .into_iter()
                    .filter(|(_, score)| score >= min && score <= max)
                    .map(|(member, _)| member_key(key, &member))
                    .collect();
                for row in &doomed {
                    self.zsets.remove(row.as_str())?;
                }
                self.drop_expiry_if_gone(key)?;
                Ok(doomed.len())
            }
            Command::ZInterStore { dest, sources } => {
                let result = self.intersect(sources, now)?;
                self.delete_key(dest)?;
                for (member, score) in &result {
                    let row = member_key(dest, member);
                    self.zsets.insert(row.as_str(), *score)?;
                }
                Ok(result.len())
            }
        }
    }

    fn intersect(&self, sources: &[String], now: i64) -> KvResult<HashMap<String, f64>> {
        let mut result: Option<HashMap<String, f64>> = None;
        for source in sources {
            let entries: HashMap<String, f64> = if is_expired(&self.expiry, source, now)? {
                HashMap::new()
            } else {
                member_rows(&self.zsets, source)?.into_iter().collect()
            };
            result = Some(match result {
                None => entries,
                Some(acc) => acc
                    .into_iter()
                    .filter_map(|(member, score)| {
                        entries
                            .get(&member)
                            .map(|other| (member, score.min(*other)))
                    })
                    .collect(),
            });
        }
        Ok(result.unwrap_or_default())
    }

    fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.strings.get(key)?.is_some()
            || self.hashes.get(key)?.is_some()
            || has_members(&self.sets, key)?
            || has_members(&self.zsets, key)?)
    }

    fn drop_expiry_if_gone(&mut self, key: &str) -> KvResult<()> {
        if !self.exists(key)? {
            self.expiry.remove(key)?;
        }
        Ok(())
    }

    /// Remove `key` from every table; returns the number of rows removed
    fn delete_key(&mut self, key: &str) -> KvResult<usize> {
        let mut removed = 0;
        removed += usize::from(self.strings.remove(key)?.is_some());
        removed += usize::from(self.hashes.remove(key)?.is_some());
        removed += remove_members(&mut self.sets, key)?;
        removed += remove_members(&mut self.zsets, key)?;
        self.expiry.remove(key)?;
        Ok(removed)
    }
}

fn is_expired(
    expiry: &impl ReadableTable<&'static str, i64>,
    key: &str,
    now: i64,
) -> KvResult<bool> {
    Ok(expiry.get(key)?.is_some_and(|at| at.value() <= now))
}

/// All `(member, value)` rows stored under `key`
fn member_rows<V>(
    table: &impl ReadableTable<&'static str, V>,
    key: &str,
) -> KvResult<Vec<(String, V)>>
where
    V: for<'a> redb::Value<SelfType<'a> = V> + 'static,
{
    let prefix = member_prefix(key);
    let mut rows = Vec::new();
    for entry in table.range(prefix.as_str()..)? {
        let (row, value) = entry?;
        let Some(member) = row.value().strip_prefix(prefix.as_str()).map(str::to_string) else {
            break;
        };
        rows.push((member, value.value()));
    }
    Ok(rows)
}

fn has_members<V: redb::Value + 'static>(
    table: &impl ReadableTable<&'static str, V>,
    key: &str,
) -> KvResult<bool> {
    let prefix = member_prefix(key);
    match table.range(prefix.as_str()..)?.next() {
        Some(entry) => Ok(entry?.0.value().starts_with(prefix.as_str())),
        None => Ok(false),
    }
}

fn remove_members<V: redb::Value + 'static>(
    table: &mut Table<'_, &'static str, V>,
    key: &str,
) -> KvResult<usize> {
    let prefix = member_prefix(key);
    let rows: Vec<String> = {
        let mut rows = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (row, _) = entry?;
            let row = row.value();
            if !row.starts_with(prefix.as_str()) {
                break;
            }
            rows.push(row.to_string());
        }
        rows
    };
    for row in &rows {
        table.remove(row.as_str())?;
    }
    Ok(rows.len())
}
