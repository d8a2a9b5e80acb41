// Analysis Executor - runs one admitted job end to end
//
// Steps: scratch dir -> frame extraction (bounded, non-fatal) -> inference
// (bounded per attempt, retried) -> report -> cache write-through.

mod scratch;

pub use scratch::{Artifact, ScratchDir};

use crate::application::cache::ResultCache;
use crate::application::config::ExecutorConfig;
use crate::domain::{
    sniff_container, AnalysisError, AnalysisOptions, AnalysisReport, FrameExtractionDegraded, Job,
    ReportStats, VideoContainer, SNIFF_LEN,
};
use crate::port::{
    Analyzer, AnalyzerError, FrameExtractor, FrameSpec, InferenceRequest, Sleeper, TimeProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FRAME_EXTENSION: &str = "jpg";

pub struct AnalysisExecutor {
    extractor: Arc<dyn FrameExtractor>,
    analyzer: Arc<dyn Analyzer>,
    cache: Arc<ResultCache>,
    sleeper: Arc<dyn Sleeper>,
    time_provider: Arc<dyn TimeProvider>,
    config: ExecutorConfig,
}

impl AnalysisExecutor {
    pub fn new(
        extractor: Arc<dyn FrameExtractor>,
        analyzer: Arc<dyn Analyzer>,
        cache: Arc<ResultCache>,
        sleeper: Arc<dyn Sleeper>,
        time_provider: Arc<dyn TimeProvider>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            cache,
            sleeper,
            time_provider,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Check options and container magic bytes before a job is created.
    ///
    /// # Errors
    /// `AnalysisError::InvalidInput` for oversized options, a non-video
    /// declared type, an unreadable or empty file, or unknown magic bytes.
    pub async fn validate(
        &self,
        artifact: &Artifact,
        options: &AnalysisOptions,
    ) -> Result<VideoContainer, AnalysisError> {
        options.validate()?;

        let header = artifact.read_header(SNIFF_LEN).await.map_err(|e| {
            AnalysisError::InvalidInput(format!("Cannot read uploaded file: {}", e))
        })?;
        if header.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "Uploaded file is empty".to_string(),
            ));
        }

        sniff_container(&header).ok_or_else(|| {
            AnalysisError::InvalidInput("Uploaded file is not a supported video".to_string())
        })
    }

    /// Run a job. Consumes the artifact: it is deleted, together with the
    /// scratch directory, before this returns on every path.
    pub async fn execute(
        &self,
        job: &Job,
        artifact: Artifact,
    ) -> Result<AnalysisReport, AnalysisError> {
        let scratch = match ScratchDir::create(
            &self.config.scratch_root,
            &job.id,
            self.time_provider.now_millis(),
        )
        .await
        {
            Ok(scratch) => scratch,
            Err(e) => {
                artifact.remove().await;
                return Err(AnalysisError::Internal(format!(
                    "Cannot create scratch directory: {}",
                    e
                )));
            }
        };

        // A panic inside `analyze` unwinds through the guards' Drop instead
        let result = self.analyze(job, &artifact, &scratch).await;
        scratch.remove().await;
        artifact.remove().await;
        result
    }

    async fn analyze(
        &self,
        job: &Job,
        artifact: &Artifact,
        scratch: &ScratchDir,
    ) -> Result<AnalysisReport, AnalysisError> {
        let profile = job.options.tier.profile();
        let spec = FrameSpec {
            count: profile.frame_count,
            width: profile.frame_width,
        };

        // Phase 1: frames (never fatal)
        let extraction_started = self.time_provider.now_millis();
        let (frames, degradation) = self.extract_frames(job, artifact, scratch, spec).await;
        let extraction_ms = self.time_provider.now_millis() - extraction_started;

        // Phase 2: inference with per-attempt timeout and backoff
        let inference_started = self.time_provider.now_millis();
        let request = InferenceRequest {
            context: &job.options.context,
            frames: &frames,
            token_budget: profile.token_budget,
        };
        let analyzer = &self.analyzer;
        let timeout = self.config.inference_timeout;
        let job_id = job.id.as_str();

        let outcome = self
            .config
            .retry
            .run(self.sleeper.as_ref(), job_id, move |attempt| async move {
                debug!(job_id = %job_id, attempt, frames = request.frames.len(), "Calling analyzer");
                match tokio::time::timeout(timeout, analyzer.infer(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalyzerError::Transient(format!(
                        "inference timed out after {}ms",
                        timeout.as_millis()
                    ))),
                }
            })
            .await;
        let inference_ms = self.time_provider.now_millis() - inference_started;

        let (inference, attempts) = outcome.map_err(|(e, attempts)| {
            AnalysisError::AnalysisUnavailable {
                attempts,
                reason: e.to_string(),
            }
        })?;

        let report = AnalysisReport {
            job_id: job.id.clone(),
            cache_key: job.key.clone(),
            tier: job.options.tier,
            text: inference.text,
            usage: inference.usage,
            stats: ReportStats {
                frames_requested: spec.count,
                frames_extracted: frames.len(),
                inference_attempts: attempts,
                extraction_ms,
                inference_ms,
            },
            degradation,
            analyzed_at: self.time_provider.now_millis(),
            cached: false,
        };

        self.write_through(job, &report).await;

        info!(
            job_id = %job.id,
            frames = report.stats.frames_extracted,
            attempts,
            degraded = report.degradation.is_some(),
            "Analysis completed"
        );
        Ok(report)
    }

    async fn extract_frames(
        &self,
        job: &Job,
        artifact: &Artifact,
        scratch: &ScratchDir,
        spec: FrameSpec,
    ) -> (Vec<PathBuf>, Option<FrameExtractionDegraded>) {
        let timeout = self.config.extraction_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.extractor.extract(artifact.path(), scratch.path(), spec),
        )
        .await;

        let (mut frames, failure) = match result {
            Ok(Ok(frames)) => (frames, None),
            Ok(Err(e)) => (salvage_frames(scratch).await, Some(e.to_string())),
            // The extractor future is dropped here, which kills its child process
            Err(_) => (
                salvage_frames(scratch).await,
                Some(format!("frame extraction timed out after {}ms", timeout.as_millis())),
            ),
        };
        frames.truncate(spec.count);

        let reason = failure.or_else(|| {
            (frames.len() < spec.count).then(|| {
                format!("extractor produced {} of {} frames", frames.len(), spec.count)
            })
        });

        let degradation = reason.map(|reason| {
            warn!(
                job_id = %job.id,
                requested = spec.count,
                extracted = frames.len(),
                reason = %reason,
                "Frame extraction degraded, continuing with reduced input"
            );
            FrameExtractionDegraded {
                reason,
                frames_requested: spec.count,
                frames_extracted: frames.len(),
            }
        });

        (frames, degradation)
    }

    async fn write_through(&self, job: &Job, report: &AnalysisReport) {
        let payload = match serde_json::to_value(report) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Report not cacheable");
                return;
            }
        };
        self.cache.put(job.key.clone(), payload);
        if self.config.persist_on_write {
            self.cache.persist().await;
        }
    }
}

// Frames written before a failure or timeout
async fn salvage_frames(scratch: &ScratchDir) -> Vec<PathBuf> {
    match scratch.files().await {
        Ok(files) => files
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == FRAME_EXTENSION))
            .collect(),
        Err(e) => {
            warn!(path = %scratch.path().display(), error = %e, "Cannot list scratch directory");
            Vec::new()
        }
    }
}
