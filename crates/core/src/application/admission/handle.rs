// Caller side of a submitted job

use super::Shared;
use crate::domain::{AnalysisError, AnalysisReport, JobId, JobStatus};
use std::sync::Weak;
use tokio::sync::{oneshot, watch};

/// Terminal result delivered exactly once per job
pub type JobOutcome = Result<AnalysisReport, AnalysisError>;

/// Handle to an admitted or queued job.
///
/// Dropping the handle (or calling `cancel`) while the job is still queued
/// withdraws it: it never dispatches and its artifact is deleted. Running
/// jobs are not interrupted.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    status: watch::Receiver<JobStatus>,
    outcome: Option<oneshot::Receiver<JobOutcome>>,
    controller: Weak<Shared>,
}

impl JobHandle {
    pub(super) fn new(
        job_id: JobId,
        status: watch::Receiver<JobStatus>,
        outcome: oneshot::Receiver<JobOutcome>,
        controller: Weak<Shared>,
    ) -> Self {
        Self {
            job_id,
            status,
            outcome: Some(outcome),
            controller,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Latest known status
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Status stream; queue positions are refreshed as jobs ahead leave
    pub fn watch_status(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    /// Wait for the terminal result
    pub async fn wait(mut self) -> JobOutcome {
        let Some(rx) = self.outcome.take() else {
            return Err(AnalysisError::Internal("Job result already taken".to_string()));
        };
        let outcome = rx.await.unwrap_or_else(|_| {
            Err(AnalysisError::Internal(
                "Job ended without reporting a result".to_string(),
            ))
        });
        // Settled: nothing left to withdraw on drop
        self.controller = Weak::new();
        outcome
    }

    /// Withdraw the job if it has not started. Returns whether it was removed.
    pub fn cancel(mut self) -> bool {
        let controller = std::mem::take(&mut self.controller);
        match controller.upgrade() {
            Some(shared) => shared.withdraw(&self.job_id),
            None => false,
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if let Some(shared) = self.controller.upgrade() {
            shared.withdraw(&self.job_id);
        }
    }
}
