//! Digest aliases: `{sha1}<hex>` style keys that resolve to a canonical id.

use crate::keys;
use mdindex_common::DigestAlgorithm;
use mdindex_kv::Batch;

/// Stage one alias per digest for `id`, expiring with its record
pub fn register_aliases(
    batch: &mut Batch,
    id: &str,
    expiry: Option<i64>,
    digests: &[DigestAlgorithm],
) {
    for digest in digests {
        let key = keys::alias(&digest.alias_key(id));
        batch.set(key.as_str(), id.as_bytes().to_vec());
        if let Some(ts) = expiry {
            batch.expire_at(key, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdindex_kv::Command;

    #[test]
    fn test_one_alias_per_digest() {
        let mut batch = Batch::new();
        register_aliases(&mut batch, "abc", Some(5), &DigestAlgorithm::ALL);
        assert_eq!(batch.len(), 6);
        assert_eq!(batch.commands()[0], Command::Set {
            key: "{sha1}a9993e364706816aba3e25717850c26c9cd0d89d#alias".into(),
            value: b"abc".to_vec()
        });
        assert_eq!(batch.commands()[1], Command::ExpireAt {
            key: "{sha1}a9993e364706816aba3e25717850c26c9cd0d89d#alias".into(),
            at: 5
        });
        assert_eq!(batch.commands()[4].key(), "{md5}900150983cd24fb0d6963f7d28e17f72#alias");
    }

    #[test]
    fn test_no_digests_no_aliases() {
        let mut batch = Batch::new();
        register_aliases(&mut batch, "abc", None, &[]);
        assert!(batch.is_empty());
    }
}
