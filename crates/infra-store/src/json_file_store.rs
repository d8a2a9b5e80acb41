// JSON file cache store
//
// Writes go to a uniquely named temp file in the target directory, are
// fsynced, then renamed over the target. Rename within one directory is
// atomic, so readers see either the old or the new snapshot, never a mix.

use async_trait::async_trait;
use clipscope_core::domain::{CacheSnapshot, CACHE_SNAPSHOT_VERSION};
use clipscope_core::port::{CacheStore, CacheStoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp-";

/// Temp files younger than this may belong to a save still in progress,
/// possibly in another process
const STALE_TEMP_AGE: Duration = Duration::from_secs(10 * 60);

/// Result cache persisted as one JSON document
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    /// # Arguments
    /// * `path` - Snapshot file; its directory is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache.json".to_string())
    }

    fn temp_prefix(&self) -> String {
        format!(".{}{}", self.file_name(), TEMP_MARKER)
    }

    /// Remove temp files left behind by an interrupted save
    ///
    /// Only files older than `STALE_TEMP_AGE` are touched.
    async fn remove_stale_temp_files(&self) {
        let prefix = self.temp_prefix();
        let mut entries = match tokio::fs::read_dir(self.dir()).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            if !is_stale(&entry).await {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => info!(path = %entry.path().display(), "Removed stale cache temp file"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Cannot remove stale temp file"),
            }
        }
    }

    async fn write_temp(&self, tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

async fn is_stale(entry: &tokio::fs::DirEntry) -> bool {
    let modified = match entry.metadata().await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= STALE_TEMP_AGE)
        .unwrap_or(false)
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn load(&self) -> Result<Option<CacheSnapshot>, CacheStoreError> {
        self.remove_stale_temp_files().await;

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: CacheSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            CacheStoreError::Corrupt(format!("{}: {}", self.path.display(), e))
        })?;

        if snapshot.version != CACHE_SNAPSHOT_VERSION {
            return Err(CacheStoreError::Corrupt(format!(
                "{}: unsupported snapshot version {} (expected {})",
                self.path.display(),
                snapshot.version,
                CACHE_SNAPSHOT_VERSION
            )));
        }

        debug!(path = %self.path.display(), entries = snapshot.entries.len(), "Cache snapshot loaded");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheStoreError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!("{}{}", self.temp_prefix(), Uuid::new_v4().simple()));
        if let Err(e) = self.write_temp(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        // Make the rename itself durable
        #[cfg(unix)]
        if let Ok(dir_handle) = tokio::fs::File::open(&dir).await {
            let _ = dir_handle.sync_all().await;
        }

        debug!(
            path = %self.path.display(),
            entries = snapshot.entries.len(),
            bytes = bytes.len(),
            "Cache snapshot saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipscope_core::domain::{CacheEntry, CacheKey};
    use std::collections::BTreeMap;

    fn snapshot(keys: &[&str]) -> CacheSnapshot {
        let entries: BTreeMap<CacheKey, CacheEntry> = keys
            .iter()
            .map(|k| {
                (
                    CacheKey::from_raw(*k),
                    CacheEntry::new(serde_json::json!({ "text": k }), 1_000),
                )
            })
            .collect();
        CacheSnapshot::new(2_000, entries)
    }

    fn backdate(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(TEMP_MARKER))
            .collect()
    }

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path().join("nested/deeper/cache.json"));

        tokio_test::assert_ok!(store.save(&snapshot(&["a", "b"])).await);
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[&CacheKey::from_raw("b")].payload["text"], "b");
        assert!(temp_files(&dir.path().join("nested/deeper")).is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));

        store.save(&snapshot(&["a", "b", "c"])).await.unwrap();
        store.save(&snapshot(&["z"])).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert!(loaded.entries.contains_key(&CacheKey::from_raw("z")));
        assert!(temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_save_leaves_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileCacheStore::new(&path);
        store.save(&snapshot(&["kept"])).await.unwrap();

        // A crash between write and rename leaves a half-written temp file
        let leftover = dir.path().join(".cache.json.tmp-deadbeef");
        std::fs::write(&leftover, b"{\"version\":1,\"saved_at\":").unwrap();
        backdate(&leftover, Duration::from_secs(3600));

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.entries.contains_key(&CacheKey::from_raw("kept")));
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_recent_temp_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));

        // Another process may be about to rename this
        let in_flight = dir.path().join(".cache.json.tmp-0123abcd");
        std::fs::write(&in_flight, b"{").unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(in_flight.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_during_saves_never_breaks_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = std::sync::Arc::new(JsonFileCacheStore::new(&path));
        store.save(&snapshot(&["seed"])).await.unwrap();

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut loads = 0usize;
                while !*stop_rx.borrow_and_update() {
                    store.load().await.unwrap();
                    loads += 1;
                    tokio::task::yield_now().await;
                }
                loads
            })
        };

        for i in 0..200 {
            let key = format!("k{}", i);
            tokio_test::assert_ok!(store.save(&snapshot(&[key.as_str()])).await);
        }
        stop_tx.send(true).unwrap();
        reader.await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.entries.contains_key(&CacheKey::from_raw("k199")));
        assert!(temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"not json at all").unwrap();

        let store = JsonFileCacheStore::new(&path);
        let result = store.load().await;
        assert!(matches!(result, Err(CacheStoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unknown_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, br#"{"version":99,"saved_at":0,"entries":{}}"#).unwrap();

        let store = JsonFileCacheStore::new(&path);
        assert!(matches!(store.load().await, Err(CacheStoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unrelated_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("other.tmp-keep");
        std::fs::write(&other, b"x").unwrap();

        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));
        store.load().await.unwrap();
        assert!(other.exists());
    }
}
