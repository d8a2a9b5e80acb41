// Job Domain Model

use crate::domain::digest::CacheKey;
use crate::domain::error::{DomainError, Result};
use crate::domain::options::AnalysisOptions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Job ID (UUID v4 in production, injected in tests)
pub type JobId = String;

/// Job lifecycle: `Pending -> Running -> {Completed, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Caller-observable progress of a submitted job.
///
/// `Queued` carries the 1-based position and is refreshed whenever a job
/// ahead of it leaves the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued { position: usize },
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Job Entity
///
/// The options snapshot is shared read-only: nothing mutates it after
/// submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub key: CacheKey,
    pub options: Arc<AnalysisOptions>,
    pub state: JobState,

    pub submitted_at: i64, // epoch ms, observability only
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Job {
    /// Create a new Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `key` - Content key of the submitted artifact
    /// * `options` - Immutable options snapshot
    /// * `submitted_at` - Submission timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        key: CacheKey,
        options: Arc<AnalysisOptions>,
        submitted_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            key,
            options,
            state: JobState::Pending,
            submitted_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running state with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Running.to_string(),
            });
        }
        self.state = JobState::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed state with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        self.finish(JobState::Completed, now_millis)
    }

    /// Transition to Failed state with explicit timestamp
    pub fn fail(&mut self, now_millis: i64) -> Result<()> {
        self.finish(JobState::Failed, now_millis)
    }

    fn finish(&mut self, to: JobState, now_millis: i64) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Milliseconds spent waiting for a worker slot, once started
    pub fn queue_wait_ms(&self) -> Option<i64> {
        self.started_at.map(|s| s - self.submitted_at)
    }
}
