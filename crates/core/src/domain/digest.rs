// Content identity and cache keys

use crate::domain::options::DetailTier;
use serde::{Deserialize, Serialize};

/// Lowercase hex digest produced by a `ContentHasher`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        prefix(&self.0, 12)
    }
}

/// Up to `len` bytes of `s`, or all of it when `len` is not a char boundary
fn prefix(s: &str, len: usize) -> &str {
    s.get(..len).unwrap_or(s)
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache lookup key: artifact digest + detail tier + digest of the analysis
/// context. Caller identity is never part of the key.
///
/// Format: `<content digest>/<tier>/<first 16 hex of context digest>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

const CONTEXT_FINGERPRINT_LEN: usize = 16;

impl CacheKey {
    pub fn compose(content: &ContentDigest, tier: DetailTier, context: &ContentDigest) -> Self {
        let ctx = prefix(context.as_str(), CONTEXT_FINGERPRINT_LEN);
        Self(format!("{}/{}/{}", content.as_str(), tier.as_str(), ctx))
    }

    /// Rehydrate a key read back from durable storage
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
