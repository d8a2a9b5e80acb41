// Result Cache - content-addressed store of completed analyses
//
// In-memory map is authoritative; the CacheStore holds durable snapshots.

use crate::domain::{CacheEntry, CacheKey, CacheSnapshot};
use crate::port::{CacheStore, CacheStoreError, TimeProvider};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result cache
///
/// `get`/`put`/`evict_expired` are safe to call concurrently. Persists are
/// serialized so that an older snapshot never replaces a newer one on disk.
pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    store: Arc<dyn CacheStore>,
    time_provider: Arc<dyn TimeProvider>,
    ttl: Duration,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ResultCache {
    /// Create an empty cache. Call `restore()` once at startup.
    ///
    /// # Arguments
    /// * `store` - Durable snapshot store
    /// * `time_provider` - Clock for entry timestamps and TTL checks
    /// * `ttl` - Entries older than this are invisible to `get`
    pub fn new(
        store: Arc<dyn CacheStore>,
        time_provider: Arc<dyn TimeProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
            time_provider,
            ttl,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry
    ///
    /// Entries past their TTL are hidden even before the janitor removes them.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.time_provider.now_millis();
        let entries = self.read();
        let entry = entries.get(key)?;
        if entry.is_expired(now, ttl_millis(self.ttl)) {
            debug!(key = %key, "Cache entry expired, treating as miss");
            return None;
        }
        Some(entry.clone())
    }

    /// Insert or overwrite an entry, stamped with the current time
    pub fn put(&self, key: CacheKey, payload: serde_json::Value) {
        let entry = CacheEntry::new(payload, self.time_provider.now_millis());
        self.write().insert(key, entry);
    }

    /// Remove entries older than `ttl`, returning how many were removed
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let now = self.time_provider.now_millis();
        let ttl_ms = ttl_millis(ttl);
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, ttl_ms));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Write the current contents to the store.
    ///
    /// Failures are logged and swallowed: the in-memory cache stays
    /// authoritative and the previous durable snapshot is untouched.
    /// Returns whether the snapshot was written.
    pub async fn persist(&self) -> bool {
        match self.try_persist().await {
            Ok(count) => {
                debug!(entries = count, "Result cache persisted");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist result cache (in-memory cache still serving)");
                false
            }
        }
    }

    /// Persist and surface the error to the caller
    pub async fn try_persist(&self) -> Result<usize, CacheStoreError> {
        let _guard = self.persist_lock.lock().await;

        // Snapshot under the persist lock so saves land in snapshot order
        let snapshot = {
            let entries = self.read();
            let ordered: BTreeMap<CacheKey, CacheEntry> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            CacheSnapshot::new(self.time_provider.now_millis(), ordered)
        };

        let count = snapshot.entries.len();
        self.store.save(&snapshot).await?;
        Ok(count)
    }

    /// Replace in-memory contents with the durable snapshot.
    ///
    /// A missing or unreadable store yields an empty cache, never an error.
    /// Returns the number of entries loaded.
    pub async fn restore(&self) -> usize {
        let loaded = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot.entries,
            Ok(None) => {
                info!("No persisted result cache found, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(error = %e, "Persisted result cache unreadable, starting empty");
                BTreeMap::new()
            }
        };

        let count = loaded.len();
        *self.write() = loaded.into_iter().collect();
        info!(entries = count, "Result cache restored");
        count
    }

    // Poison is recovered: every mutation leaves the map consistent
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}
