// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Terminal failures delivered to the submitter of an analysis.
///
/// Frame-extraction problems are deliberately absent: they degrade the
/// report (see `FrameExtractionDegraded`) instead of failing the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Artifact rejected before admission; never queued, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Worker pool and queue are both saturated.
    #[error("Queue full: {running} running, {queued} queued")]
    QueueFull { running: usize, queued: usize },

    /// The inference call exhausted its retry budget.
    #[error("Analysis unavailable after {attempts} attempt(s): {reason}")]
    AnalysisUnavailable { attempts: u32, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Short machine-readable code for logs and transport layers
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "INVALID_INPUT",
            AnalysisError::QueueFull { .. } => "QUEUE_FULL",
            AnalysisError::AnalysisUnavailable { .. } => "ANALYSIS_UNAVAILABLE",
            AnalysisError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for AnalysisError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => AnalysisError::InvalidInput(msg),
            other => AnalysisError::Internal(other.to_string()),
        }
    }
}
