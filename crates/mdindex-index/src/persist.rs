//! Document persistence: the serialized document and its flat record.

use crate::keys;
use mdindex_kv::Batch;
use std::collections::BTreeMap;

/// Stage the serialized document under `<id>#metadata` and the flat record
/// (root attributes plus `expires`) under `<id>`, both expiring at `expiry`.
/// Without an expiry neither key is given one here.
pub fn persist(
    batch: &mut Batch,
    id: &str,
    serialized: Vec<u8>,
    mut record: BTreeMap<String, String>,
    expiry: Option<i64>,
) {
    let metadata = keys::metadata(id);
    if let Some(ts) = expiry {
        record.insert(keys::EXPIRES_FIELD.to_string(), ts.to_string());
    }

    batch.set(metadata.as_str(), serialized);
    batch.hset_all(id, record);
    if let Some(ts) = expiry {
        batch.expire_at(metadata, ts).expire_at(id, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdindex_kv::Command;

    #[test]
    fn test_persist_stages_both_keys_with_expiry() {
        let mut batch = Batch::new();
        let mut attrs = BTreeMap::new();
        attrs.insert("entityID".to_string(), "https://sp".to_string());
        persist(&mut batch, "https://sp", b"<e/>".to_vec(), attrs, Some(42));

        let commands = batch.commands();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], Command::Set {
            key: "https://sp#metadata".into(),
            value: b"<e/>".to_vec()
        });
        let Command::HashSetAll { key, fields } = &commands[1] else {
            panic!("expected record write");
        };
        assert_eq!(key, "https://sp");
        assert_eq!(fields["expires"], "42");
        assert_eq!(fields["entityID"], "https://sp");
        assert_eq!(commands[2], Command::ExpireAt {
            key: "https://sp#metadata".into(),
            at: 42
        });
        assert_eq!(commands[3], Command::ExpireAt {
            key: "https://sp".into(),
            at: 42
        });
    }

    #[test]
    fn test_persist_without_expiry() {
        let mut batch = Batch::new();
        persist(&mut batch, "x", Vec::new(), BTreeMap::new(), None);
        assert_eq!(batch.len(), 2);
        assert!(
            !batch
                .commands()
                .iter()
                .any(|c| matches!(c, Command::ExpireAt { .. }))
        );
    }
}
