// Service lifecycle: construct -> start (restore, background tasks) -> serve -> shutdown

mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::admission::AdmissionController;
use crate::application::cache::ResultCache;
use crate::application::config::ServiceConfig;
use crate::application::executor::AnalysisExecutor;
use crate::application::janitor::CacheJanitor;
use crate::application::usage::UsageLedger;
use crate::error::Result;
use crate::port::{
    Analyzer, CacheStore, ContentHasher, FrameExtractor, IdProvider, Sleeper, TimeProvider,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External capabilities the pipeline is wired with
pub struct Collaborators {
    pub extractor: Arc<dyn FrameExtractor>,
    pub analyzer: Arc<dyn Analyzer>,
    pub hasher: Arc<dyn ContentHasher>,
    pub store: Arc<dyn CacheStore>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// What happened during shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All admitted work finished within the grace period
    pub drained: bool,
    /// Queued jobs failed because the grace period ran out
    pub abandoned: usize,
    pub persisted: bool,
}

/// Owns the cache, admission controller and background tasks
pub struct ClipscopeService {
    config: ServiceConfig,
    cache: Arc<ResultCache>,
    usage: Arc<UsageLedger>,
    controller: AdmissionController,
    shutdown_tx: ShutdownSender,
    tasks: Vec<JoinHandle<()>>,
}

impl ClipscopeService {
    /// Wire the pipeline. Nothing runs until `start`.
    pub fn new(config: ServiceConfig, deps: Collaborators) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ResultCache::new(
            deps.store,
            Arc::clone(&deps.time_provider),
            config.cache.ttl,
        ));
        let usage = Arc::new(UsageLedger::new(Arc::clone(&deps.time_provider)));
        let executor = Arc::new(AnalysisExecutor::new(
            deps.extractor,
            deps.analyzer,
            Arc::clone(&cache),
            deps.sleeper,
            Arc::clone(&deps.time_provider),
            config.executor.clone(),
        ));
        let controller = AdmissionController::new(
            config.admission.clone(),
            Arc::clone(&cache),
            deps.hasher,
            executor,
            deps.id_provider,
            deps.time_provider,
            Arc::clone(&usage),
        );
        let (shutdown_tx, _) = shutdown_channel();

        Ok(Self {
            config,
            cache,
            usage,
            controller,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Restore the cache and start the janitor and usage tasks.
    /// Returns the number of cache entries restored.
    pub async fn start(&mut self) -> usize {
        // Phase 1: durable state
        let restored = self.cache.restore().await;

        // Phase 2: background tasks
        let janitor = CacheJanitor::new(Arc::clone(&self.cache), &self.config.cache);
        self.tasks
            .push(tokio::spawn(janitor.run(self.shutdown_tx.token())));
        self.tasks.push(tokio::spawn(
            Arc::clone(&self.usage).run(self.config.usage_tick, self.shutdown_tx.token()),
        ));

        info!(
            restored,
            max_concurrent = self.config.admission.max_concurrent,
            max_queue = ?self.config.admission.max_queue,
            "Clipscope service started"
        );
        restored
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn controller(&self) -> &AdmissionController {
        &self.controller
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn usage(&self) -> &Arc<UsageLedger> {
        &self.usage
    }

    /// One-off janitor sharing this service's cache
    pub fn janitor(&self) -> CacheJanitor {
        CacheJanitor::new(Arc::clone(&self.cache), &self.config.cache)
    }

    /// Stop accepting work, drain within the grace period, stop background
    /// tasks and write the final snapshot.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("Shutting down clipscope service");

        // Phase 1: no new submissions
        self.controller.close();

        // Phase 2: drain
        let grace = self.config.shutdown_grace;
        let mut abandoned = 0;
        let drained = match tokio::time::timeout(grace, self.controller.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                abandoned = self.controller.abandon_queued();
                let stats = self.controller.stats();
                warn!(
                    grace_secs = grace.as_secs(),
                    abandoned,
                    still_running = stats.running,
                    "Grace period elapsed before all jobs finished"
                );
                false
            }
        };

        // Phase 3: background tasks
        self.shutdown_tx.shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        // Phase 4: final snapshot
        let persisted = self.cache.persist().await;
        info!(drained, abandoned, persisted, entries = self.cache.len(), "Shutdown complete");

        ShutdownReport {
            drained,
            abandoned,
            persisted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::admission::Submission;
    use crate::application::executor::Artifact;
    use crate::application::retry::RetryPolicy;
    use crate::application::test_support::{eventually, MP4_HEADER};
    use crate::domain::{AnalysisOptions, CacheEntry, CacheKey, CacheSnapshot, JobStatus};
    use crate::port::analyzer::mocks::ScriptedAnalyzer;
    use crate::port::cache_store::mocks::InMemoryCacheStore;
    use crate::port::content_hasher::mocks::HexContentHasher;
    use crate::port::frame_extractor::mocks::ScriptedFrameExtractor;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::sleeper::mocks::RecordingSleeper;
    use crate::port::time_provider::mocks::ManualClock;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryCacheStore>,
        analyzer: Arc<ScriptedAnalyzer>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new(store: InMemoryCacheStore, analyzer: ScriptedAnalyzer) -> Self {
            Self {
                store: Arc::new(store),
                analyzer: Arc::new(analyzer),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn service(&self, grace: Duration) -> ClipscopeService {
            let mut config = ServiceConfig::default();
            config.admission.max_concurrent = 1;
            config.admission.max_queue = None;
            config.executor.scratch_root = self.dir.path().join("scratch");
            config.executor.retry = RetryPolicy::new(3, Duration::from_millis(10));
            config.shutdown_grace = grace;

            let deps = Collaborators {
                extractor: Arc::new(ScriptedFrameExtractor::full()),
                analyzer: self.analyzer.clone(),
                hasher: Arc::new(HexContentHasher),
                store: self.store.clone(),
                time_provider: Arc::new(ManualClock::new(1_000)),
                id_provider: Arc::new(SequentialIdProvider::default()),
                sleeper: Arc::new(RecordingSleeper::default()),
            };
            ClipscopeService::new(config, deps).unwrap()
        }

        fn upload(&self, name: &str, body: &[u8]) -> Artifact {
            let path = self.dir.path().join(name);
            let mut bytes = MP4_HEADER.to_vec();
            bytes.extend_from_slice(body);
            std::fs::write(&path, bytes).unwrap();
            Artifact::new(path)
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fixture = Fixture::new(InMemoryCacheStore::default(), ScriptedAnalyzer::new());
        let mut config = ServiceConfig::default();
        config.admission.max_concurrent = 0;
        let deps = Collaborators {
            extractor: Arc::new(ScriptedFrameExtractor::full()),
            analyzer: fixture.analyzer.clone(),
            hasher: Arc::new(HexContentHasher),
            store: fixture.store.clone(),
            time_provider: Arc::new(ManualClock::new(0)),
            id_provider: Arc::new(SequentialIdProvider::default()),
            sleeper: Arc::new(RecordingSleeper::default()),
        };
        assert!(ClipscopeService::new(config, deps).is_err());
    }

    #[tokio::test]
    async fn test_start_restores_and_shutdown_persists() {
        let mut entries = BTreeMap::new();
        entries.insert(CacheKey::from_raw("restored"), CacheEntry::new(json!({}), 1_000));
        let fixture = Fixture::new(
            InMemoryCacheStore::with_snapshot(CacheSnapshot::new(1_000, entries)),
            ScriptedAnalyzer::new(),
        );

        let mut service = fixture.service(Duration::from_secs(5));
        assert_eq!(service.start().await, 1);

        let submission = service
            .controller()
            .submit(fixture.upload("a.mp4", b"A"), AnalysisOptions::default())
            .await
            .unwrap();
        let Submission::Admitted(handle) = submission else {
            panic!("expected admission");
        };
        handle.wait().await.unwrap();

        let report = service.shutdown().await;
        assert!(report.drained);
        assert!(report.persisted);
        assert_eq!(fixture.store.snapshot().unwrap().entries.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_work_and_abandons_after_grace() {
        let fixture = Fixture::new(InMemoryCacheStore::default(), ScriptedAnalyzer::gated());
        let mut service = fixture.service(Duration::from_millis(50));
        service.start().await;
        let controller = service.controller().clone();

        let running = controller
            .submit(fixture.upload("a.mp4", b"A"), AnalysisOptions::default())
            .await
            .unwrap();
        let queued = controller
            .submit(fixture.upload("b.mp4", b"B"), AnalysisOptions::default())
            .await
            .unwrap();
        let Submission::Queued { handle: queued, .. } = queued else {
            panic!("expected queued");
        };
        eventually(|| fixture.analyzer.in_flight() == 1).await;

        let report = service.shutdown().await;
        assert!(!report.drained);
        assert_eq!(report.abandoned, 1);
        assert_eq!(queued.status(), JobStatus::Cancelled);

        let refused = controller
            .submit(fixture.upload("c.mp4", b"C"), AnalysisOptions::default())
            .await;
        assert!(refused.is_err());

        // The running job still finishes on its own
        fixture.analyzer.release(1);
        let Submission::Admitted(running) = running else {
            panic!("expected admission");
        };
        running.wait().await.unwrap();
    }
}
