//! Subcommand implementations

use anyhow::{Context, Result};
use clipscope_core::application::{AdmissionController, Artifact, ClipscopeService, Submission};
use clipscope_core::domain::{AnalysisContext, AnalysisOptions, AnalysisReport, DetailTier};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

const UPLOADS_DIR: &str = "uploads";

/// Inputs of `clipscope analyze`
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub files: Vec<PathBuf>,
    pub tier: DetailTier,
    pub game: Option<String>,
    pub notes: Option<String>,
    pub focus: Vec<String>,
}

impl AnalyzeRequest {
    fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            tier: self.tier,
            context: AnalysisContext {
                game: self.game.clone(),
                notes: self.notes.clone(),
                focus_areas: self.focus.clone(),
                ..Default::default()
            },
            content_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Completed { report: Box<AnalysisReport> },
    Failed { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub file: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Submit every file concurrently and wait for all outcomes, in input order
pub async fn analyze(service: &ClipscopeService, request: &AnalyzeRequest) -> Vec<FileResult> {
    let uploads = service.config().executor.scratch_root.join(UPLOADS_DIR);
    let options = request.options();
    let controller = service.controller();

    let jobs = request
        .files
        .iter()
        .map(|file| analyze_one(controller, &uploads, file, options.clone()));
    futures::future::join_all(jobs).await
}

async fn analyze_one(
    controller: &AdmissionController,
    uploads: &Path,
    file: &Path,
    options: AnalysisOptions,
) -> FileResult {
    let name = file.display().to_string();

    let artifact = match stage_upload(file, uploads).await {
        Ok(artifact) => artifact,
        Err(e) => {
            return FileResult {
                file: name,
                outcome: FileOutcome::Failed {
                    code: "IO_ERROR",
                    message: format!("{:#}", e),
                },
            }
        }
    };

    let outcome = match controller.submit(artifact, options).await {
        Ok(Submission::Cached(report)) => {
            info!(file = %name, job_id = %report.job_id, "Served from cache");
            Ok(report)
        }
        Ok(Submission::Admitted(handle)) => {
            info!(file = %name, job_id = %handle.job_id(), "Analysis started");
            handle.wait().await
        }
        Ok(Submission::Queued { position, handle }) => {
            eprintln!("{}: queued at position {}", name, position);
            handle.wait().await
        }
        Err(e) => Err(e),
    };

    let outcome = match outcome {
        Ok(report) => FileOutcome::Completed {
            report: Box::new(report),
        },
        Err(e) => {
            warn!(file = %name, code = e.code(), error = %e, "Analysis failed");
            FileOutcome::Failed {
                code: e.code(),
                message: e.to_string(),
            }
        }
    };
    FileResult {
        file: name,
        outcome,
    }
}

/// Copy the user's file into the pipeline-owned uploads area.
///
/// The pipeline deletes every artifact it is handed, so it never gets the
/// original.
pub async fn stage_upload(source: &Path, uploads: &Path) -> Result<Artifact> {
    tokio::fs::create_dir_all(uploads)
        .await
        .with_context(|| format!("Cannot create {}", uploads.display()))?;

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    let target = uploads.join(format!("{}-{}", Uuid::new_v4().simple(), file_name));

    tokio::fs::copy(source, &target)
        .await
        .with_context(|| format!("Cannot read {}", source.display()))?;
    Ok(Artifact::new(target))
}

/// One eviction pass over the persisted cache
pub async fn sweep(service: &ClipscopeService) -> serde_json::Value {
    let restored = service.cache().restore().await;
    let report = service.janitor().sweep_now().await;
    json!({
        "loaded": restored,
        "evicted": report.evicted,
        "remaining": report.remaining,
        "persisted": report.persisted,
    })
}

/// Cache size and admission limits
pub async fn stats(service: &ClipscopeService, cache_path: &Path) -> serde_json::Value {
    let entries = service.cache().restore().await;
    json!({
        "cache_path": cache_path.display().to_string(),
        "entries": entries,
        "ttl_secs": service.config().cache.ttl.as_secs(),
        "admission": service.controller().stats(),
    })
}
