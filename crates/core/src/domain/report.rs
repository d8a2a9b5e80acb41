// Analysis report returned to callers and stored in the result cache

use crate::domain::digest::CacheKey;
use crate::domain::job::JobId;
use crate::domain::options::DetailTier;
use serde::{Deserialize, Serialize};

/// Structured result of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Job that produced the analysis (the original job for cache hits)
    pub job_id: JobId,
    pub cache_key: CacheKey,
    pub tier: DetailTier,
    pub text: String,
    /// Analyzer accounting data, passed through unmodified
    pub usage: serde_json::Value,
    pub stats: ReportStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<FrameExtractionDegraded>,
    pub analyzed_at: i64, // epoch ms
    /// Set on the way out of the cache, never persisted as true
    #[serde(default)]
    pub cached: bool,
}

/// Derived execution statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub frames_requested: usize,
    pub frames_extracted: usize,
    pub inference_attempts: u32,
    pub extraction_ms: i64,
    pub inference_ms: i64,
}

/// Frame extraction fell short; the analysis ran on reduced input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameExtractionDegraded {
    pub reason: String,
    pub frames_requested: usize,
    pub frames_extracted: usize,
}
