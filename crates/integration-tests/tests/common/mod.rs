//! Shared wiring: real JSON store and SHA-256 hasher, scripted extractor,
//! analyzer and clock.

#![allow(dead_code)]

use clipscope_core::application::{
    AdmissionConfig, Artifact, ClipscopeService, Collaborators, RetryPolicy, ServiceConfig,
};
use clipscope_core::port::analyzer::mocks::ScriptedAnalyzer;
use clipscope_core::port::frame_extractor::mocks::ScriptedFrameExtractor;
use clipscope_core::port::id_provider::mocks::SequentialIdProvider;
use clipscope_core::port::sleeper::mocks::RecordingSleeper;
use clipscope_core::port::time_provider::mocks::ManualClock;
use clipscope_infra_store::JsonFileCacheStore;
use clipscope_infra_system::Sha256ContentHasher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2";
pub const START_MILLIS: i64 = 1_700_000_000_000;
pub const TTL: Duration = Duration::from_secs(3600);

pub struct World {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub extractor: Arc<ScriptedFrameExtractor>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl World {
    pub fn new(analyzer: ScriptedAnalyzer) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            clock: Arc::new(ManualClock::new(START_MILLIS)),
            extractor: Arc::new(ScriptedFrameExtractor::full()),
            analyzer: Arc::new(analyzer),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("state/analysis-cache.json")
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn config(&self, max_concurrent: usize, max_queue: Option<usize>) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.admission = AdmissionConfig {
            max_concurrent,
            max_queue,
        };
        config.executor.scratch_root = self.scratch_root();
        config.executor.retry = RetryPolicy::new(3, Duration::from_millis(5));
        config.cache.ttl = TTL;
        config.shutdown_grace = Duration::from_secs(5);
        config
    }

    /// A fresh service over the same on-disk state, as after a restart
    pub fn service(&self, config: ServiceConfig) -> ClipscopeService {
        let deps = Collaborators {
            extractor: self.extractor.clone(),
            analyzer: self.analyzer.clone(),
            hasher: Arc::new(Sha256ContentHasher::new()),
            store: Arc::new(JsonFileCacheStore::new(self.cache_path())),
            time_provider: self.clock.clone(),
            id_provider: Arc::new(SequentialIdProvider::default()),
            sleeper: self.sleeper.clone(),
        };
        ClipscopeService::new(config, deps).unwrap()
    }

    /// Write an MP4-looking upload whose content is unique per `body`
    pub fn upload(&self, name: &str, body: &[u8]) -> Artifact {
        std::fs::create_dir_all(self.uploads()).unwrap();
        let path = self.uploads().join(name);
        let mut bytes = MP4_HEADER.to_vec();
        bytes.extend_from_slice(body);
        std::fs::write(&path, bytes).unwrap();
        Artifact::new(path)
    }

    pub fn uploads_are_empty(&self) -> bool {
        dir_is_empty(self.uploads())
    }

    pub fn scratch_is_empty(&self) -> bool {
        dir_is_empty(self.scratch_root())
    }

    pub fn persisted_entries(&self) -> usize {
        let bytes = std::fs::read(self.cache_path()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["entries"].as_object().map(|m| m.len()).unwrap_or(0)
    }
}

fn dir_is_empty(path: PathBuf) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

/// Poll `condition` until it holds or ~2s pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
