// Shared fixtures for application-layer tests

use crate::application::admission::AdmissionController;
use crate::application::cache::ResultCache;
use crate::application::config::{AdmissionConfig, ExecutorConfig};
use crate::application::executor::{AnalysisExecutor, Artifact};
use crate::application::retry::RetryPolicy;
use crate::application::usage::UsageLedger;
use crate::domain::{AnalysisOptions, Job};
use crate::port::analyzer::mocks::ScriptedAnalyzer;
use crate::port::cache_store::mocks::InMemoryCacheStore;
use crate::port::content_hasher::mocks::HexContentHasher;
use crate::port::frame_extractor::mocks::ScriptedFrameExtractor;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::sleeper::mocks::RecordingSleeper;
use crate::port::time_provider::mocks::ManualClock;
use crate::port::{ContentHasher, FrameExtractor, TimeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Smallest header `sniff_container` accepts as MP4
pub(crate) const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2";

pub(crate) struct Harness {
    pub extractor: Arc<ScriptedFrameExtractor>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub store: Arc<InMemoryCacheStore>,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<RecordingSleeper>,
    pub cache: Arc<ResultCache>,
    pub usage: Arc<UsageLedger>,
    pub hasher: Arc<HexContentHasher>,
    scratch: TempDir,
    uploads: TempDir,
}

impl Harness {
    pub fn new(analyzer: ScriptedAnalyzer) -> Self {
        let store = Arc::new(InMemoryCacheStore::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = Arc::new(ResultCache::new(
            store.clone(),
            clock.clone(),
            Duration::from_secs(3600),
        ));
        Self {
            extractor: Arc::new(ScriptedFrameExtractor::full()),
            analyzer: Arc::new(analyzer),
            usage: Arc::new(UsageLedger::new(clock.clone())),
            store,
            clock,
            sleeper: Arc::new(RecordingSleeper::default()),
            cache,
            hasher: Arc::new(HexContentHasher),
            scratch: tempfile::tempdir().unwrap(),
            uploads: tempfile::tempdir().unwrap(),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            scratch_root: self.scratch_root(),
            extraction_timeout: Duration::from_secs(5),
            inference_timeout: Duration::from_secs(30),
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            persist_on_write: true,
        }
    }

    pub fn executor(&self) -> Arc<AnalysisExecutor> {
        self.executor_with(self.executor_config())
    }

    pub fn executor_with(&self, config: ExecutorConfig) -> Arc<AnalysisExecutor> {
        self.build_executor(self.extractor.clone(), config)
    }

    pub fn controller(&self, config: AdmissionConfig) -> AdmissionController {
        self.controller_with(config, self.extractor.clone())
    }

    pub fn controller_with(
        &self,
        config: AdmissionConfig,
        extractor: Arc<dyn FrameExtractor>,
    ) -> AdmissionController {
        self.build_controller(config, self.hasher.clone(), extractor)
    }

    pub fn controller_with_hasher(
        &self,
        config: AdmissionConfig,
        hasher: Arc<dyn ContentHasher>,
    ) -> AdmissionController {
        self.build_controller(config, hasher, self.extractor.clone())
    }

    fn build_controller(
        &self,
        config: AdmissionConfig,
        hasher: Arc<dyn ContentHasher>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> AdmissionController {
        AdmissionController::new(
            config,
            self.cache.clone(),
            hasher,
            self.build_executor(extractor, self.executor_config()),
            Arc::new(SequentialIdProvider::default()),
            self.clock.clone(),
            self.usage.clone(),
        )
    }

    /// Write a file that sniffs as MP4, unique per `body`
    pub fn upload(&self, name: &str, body: &[u8]) -> Artifact {
        let mut bytes = MP4_HEADER.to_vec();
        bytes.extend_from_slice(body);
        self.upload_raw(name, &bytes)
    }

    pub fn upload_raw(&self, name: &str, bytes: &[u8]) -> Artifact {
        let path = self.uploads.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        Artifact::new(path)
    }

    pub async fn job(&self, id: &str, artifact: &Artifact, options: AnalysisOptions) -> Job {
        let digest = self.hasher.hash_file(artifact.path()).await.unwrap();
        let key = self.hasher.cache_key(&digest, &options);
        Job::new(id, key, Arc::new(options), self.clock.now_millis())
    }

    /// No per-job scratch directory left behind
    pub fn scratch_is_empty(&self) -> bool {
        match std::fs::read_dir(self.scratch_root()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    fn scratch_root(&self) -> PathBuf {
        self.scratch.path().join("jobs")
    }

    fn build_executor(
        &self,
        extractor: Arc<dyn FrameExtractor>,
        config: ExecutorConfig,
    ) -> Arc<AnalysisExecutor> {
        Arc::new(AnalysisExecutor::new(
            extractor,
            self.analyzer.clone(),
            self.cache.clone(),
            self.sleeper.clone(),
            self.clock.clone(),
            config,
        ))
    }
}

/// Poll until `condition` holds, failing the test after ~2s
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
