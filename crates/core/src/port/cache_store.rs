// Cache Store Port
// Durable home of the result cache snapshot

use crate::domain::CacheSnapshot;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache store: {0}")]
    Corrupt(String),
}

/// Cache store interface
///
/// `save` must be atomic: a reader never observes a partially written
/// snapshot, and a crash mid-save leaves the previous snapshot intact.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the last saved snapshot. `Ok(None)` when nothing was saved yet.
    async fn load(&self) -> Result<Option<CacheSnapshot>, CacheStoreError>;

    /// Replace the durable snapshot
    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheStoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Keeps the snapshot in memory; can be told to fail
    #[derive(Default)]
    pub struct InMemoryCacheStore {
        snapshot: Mutex<Option<CacheSnapshot>>,
        fail_saves: AtomicBool,
        corrupt_loads: AtomicBool,
        saves: AtomicUsize,
    }

    impl InMemoryCacheStore {
        pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
            let store = Self::default();
            *store.snapshot.lock().unwrap() = Some(snapshot);
            store
        }

        pub fn fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        pub fn corrupt_loads(&self, corrupt: bool) {
            self.corrupt_loads.store(corrupt, Ordering::SeqCst);
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        pub fn snapshot(&self) -> Option<CacheSnapshot> {
            self.snapshot.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CacheStore for InMemoryCacheStore {
        async fn load(&self) -> Result<Option<CacheSnapshot>, CacheStoreError> {
            if self.corrupt_loads.load(Ordering::SeqCst) {
                return Err(CacheStoreError::Corrupt("mock corruption".to_string()));
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), CacheStoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(CacheStoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "mock disk full",
                )));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.snapshot.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        }
    }
}
