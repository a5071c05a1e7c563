//! Command batches executed atomically by [`crate::KvStore::execute`].

use std::collections::BTreeMap;

/// A single store mutation
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Set {
        key: String,
        value: Vec<u8>,
    },
    ExpireAt {
        key: String,
        at: i64,
    },
    HashSetAll {
        key: String,
        fields: BTreeMap<String, String>,
    },
    SetAdd {
        key: String,
        member: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Score `member` in `key` with the highest score in `source`, or
    /// remove it when `source` is empty
    ZAddMaxOf {
        key: String,
        member: String,
        source: String,
    },
    ZRemRangeByScore {
        key: String,
        min: f64,
        max: f64,
    },
    /// Remove `member` from set `key` when sorted set `guard` is empty at
    /// the moment the command applies
    SetRemoveIfEmpty {
        key: String,
        member: String,
        guard: String,
    },
    /// Intersection of `sources`, each member scored by its lowest score
    ZInterStore { dest: String, sources: Vec<String> },
}

impl Command {
    /// Key written by this command
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. }
            | Self::ExpireAt { key, .. }
            | Self::HashSetAll { key, .. }
            | Self::SetAdd { key, .. }
            | Self::ZAdd { key, .. }
            | Self::ZAddMaxOf { key, .. }
            | Self::SetRemoveIfEmpty { key, .. }
            | Self::ZRemRangeByScore { key, .. } => key,
            Self::ZInterStore { dest, .. } => dest,
        }
    }
}

/// Ordered list of commands applied in one write transaction.
///
/// Nothing is visible to readers until the whole batch commits.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn expire_at(&mut self, key: impl Into<String>, at: i64) -> &mut Self {
        self.push(Command::ExpireAt { key: key.into(), at })
    }

    pub fn hset_all(
        &mut self,
        key: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) -> &mut Self {
        self.push(Command::HashSetAll {
            key: key.into(),
            fields,
        })
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn zadd(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
    ) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    pub fn zadd_max_of(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        source: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::ZAddMaxOf {
            key: key.into(),
            member: member.into(),
            source: source.into(),
        })
    }

    pub fn srem_if_empty(
        &mut self,
        key: impl Into<String>,
        member: impl Into<String>,
        guard: impl Into<String>,
    ) -> &mut Self {
        self.push(Command::SetRemoveIfEmpty {
            key: key.into(),
            member: member.into(),
            guard: guard.into(),
        })
    }

    pub fn zrem_range_by_score(&mut self, key: impl Into<String>, min: f64, max: f64) -> &mut Self {
        self.push(Command::ZRemRangeByScore {
            key: key.into(),
            min,
            max,
        })
    }

    pub fn zinterstore(&mut self, dest: impl Into<String>, sources: Vec<String>) -> &mut Self {
        self.push(Command::ZInterStore {
            dest: dest.into(),
            sources,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
