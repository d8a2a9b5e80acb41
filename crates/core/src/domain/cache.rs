// Cache entry and durable snapshot model

use crate::domain::digest::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk snapshot format
pub const CACHE_SNAPSHOT_VERSION: u32 = 1;

/// One completed analysis. The payload is opaque to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub created_at: i64, // epoch ms, used only for TTL
}

impl CacheEntry {
    pub fn new(payload: serde_json::Value, created_at: i64) -> Self {
        Self {
            payload,
            created_at,
        }
    }

    /// Strictly older than the TTL
    pub fn is_expired(&self, now_millis: i64, ttl_ms: i64) -> bool {
        now_millis - self.created_at > ttl_ms
    }
}

/// Serialized form of the whole cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub saved_at: i64,
    pub entries: BTreeMap<CacheKey, CacheEntry>,
}

impl CacheSnapshot {
    pub fn new(saved_at: i64, entries: BTreeMap<CacheKey, CacheEntry>) -> Self {
        Self {
            version: CACHE_SNAPSHOT_VERSION,
            saved_at,
            entries,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let entry = CacheEntry::new(serde_json::json!({}), 1_000);
        assert!(!entry.is_expired(1_000 + 500, 500));
        assert!(entry.is_expired(1_000 + 501, 500));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut entries = BTreeMap::new();
        entries.insert(
            CacheKey::from_raw("abc/normal/0011"),
            CacheEntry::new(serde_json::json!({"text": "ok"}), 42),
        );
        let snapshot = CacheSnapshot::new(100, entries);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["entries"]["abc/normal/0011"]["created_at"], 42);

        let back: CacheSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
