//! Digest utilities for identifier aliasing
//!
//! Produces fixed-length, URL-safe hex identifiers from arbitrary strings.
//! Aliases are independent of storage: the same input always yields the
//! same digest.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl DigestAlgorithm {
    /// Every supported algorithm, in the default alias order
    pub const ALL: [Self; 3] = [Self::Sha1, Self::Sha256, Self::Md5];

    /// Algorithm name as used in alias keys
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }

    /// Lowercase hex digest of `input`
    #[must_use]
    pub fn hex_digest(self, input: &str) -> String {
        let data = input.as_bytes();
        match self {
            Self::Sha1 => hex::encode(Sha1::digest(data)),
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Md5 => format!("{:x}", md5::compute(data)),
        }
    }

    /// Lookup key for `input` under this algorithm: `{sha1}<hex>`
    #[must_use]
    pub fn alias_key(self, input: &str) -> String {
        format!("{{{}}}{}", self.name(), self.hex_digest(input))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown digest name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown digest algorithm: {0}")]
pub struct UnknownDigest(pub String);

impl FromStr for DigestAlgorithm {
    type Err = UnknownDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            _ => Err(UnknownDigest(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            DigestAlgorithm::Sha1.hex_digest("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            DigestAlgorithm::Sha256.hex_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            DigestAlgorithm::Md5.hex_digest("abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_alias_key_format() {
        let key = DigestAlgorithm::Md5.alias_key("abc");
        assert_eq!(key, "{md5}900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_parse_name() {
        assert_eq!("SHA256".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha256));
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
        for alg in DigestAlgorithm::ALL {
            assert_eq!(alg.name().parse::<DigestAlgorithm>(), Ok(alg));
        }
    }
}
