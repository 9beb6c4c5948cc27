//! Content-addressed hashing with domain separation.
//!
//! Algorithm: SHA-256. Result format: `"sha256:<hex_digest>"`.
//!
//! **Exactly one place defines content hashing.** Dataset dedup keys,
//! snapshot digests and sample sub-seeds all route through this module.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::hash_domain::HashDomain;

/// A content-addressed hash with algorithm identifier.
///
/// Format: `"algorithm:hex_digest"` (e.g., `"sha256:abcdef..."`)
///
/// Invariant: the inner string always contains exactly one `:` separator,
/// with non-empty substrings on both sides (enforced by [`ContentHash::parse`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    full: String,
    colon: usize,
}

impl ContentHash {
    /// Parse from `"algorithm:hex"` format.
    ///
    /// Returns `None` if the format is invalid (missing colon,
    /// empty algorithm, or empty digest).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let colon = s.find(':')?;
        if colon == 0 || colon == s.len() - 1 {
            return None;
        }
        Some(Self {
            full: s.to_string(),
            colon,
        })
    }

    /// The algorithm portion (e.g., "sha256").
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.full[..self.colon]
    }

    /// The hex digest portion.
    #[must_use]
    pub fn hex_digest(&self) -> &str {
        &self.full[self.colon + 1..]
    }

    /// The full string representation (`"algorithm:hex_digest"`).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("malformed content hash: {value:?}"))
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.full
    }
}

/// Compute the content hash of a byte slice under a domain.
#[must_use]
pub fn canonical_hash(domain: HashDomain, data: &[u8]) -> ContentHash {
    let mut hasher = DomainHasher::new(domain);
    hasher.update(data);
    hasher.finish()
}

/// Incremental hasher for multi-part inputs.
///
/// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// hash differently.
pub struct DomainHasher {
    inner: Sha256,
}

impl DomainHasher {
    #[must_use]
    pub fn new(domain: HashDomain) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain.as_bytes());
        Self { inner }
    }

    /// Feed raw bytes without framing.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feed one length-prefixed part.
    pub fn part(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update((data.len() as u64).to_le_bytes());
        self.inner.update(data);
        self
    }

    /// Feed one `u64` as a fixed-width part.
    pub fn part_u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    /// Raw 32-byte digest.
    #[must_use]
    pub fn finish_bytes(self) -> [u8; 32] {
        self.inner.finalize().into()
    }

    #[must_use]
    pub fn finish(self) -> ContentHash {
        let digest = self.finish_bytes();
        let full = format!("sha256:{}", hex::encode(digest));
        ContentHash { full, colon: 6 }
    }
}
