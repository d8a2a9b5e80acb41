// Admission Controller - cache lookup, slot accounting and the FIFO wait queue
//
// All queue state lives behind one mutex that is never held across an await
// or while touching the filesystem. Dispatch of queued jobs happens in a loop
// on slot release, never by recursion.

mod handle;

pub use handle::{JobHandle, JobOutcome};

use crate::application::cache::ResultCache;
use crate::application::config::AdmissionConfig;
use crate::application::executor::{AnalysisExecutor, Artifact};
use crate::application::usage::UsageLedger;
use crate::domain::{
    AnalysisError, AnalysisOptions, AnalysisReport, CacheKey, Job, JobStatus,
};
use crate::port::{ContentHasher, IdProvider, TimeProvider};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, error, info, warn};

/// Immediate answer to a submission
#[derive(Debug)]
pub enum Submission {
    /// Served from the result cache; no slot or queue position used
    Cached(AnalysisReport),
    /// Started right away
    Admitted(JobHandle),
    /// Waiting for a slot at the given 1-based position
    Queued { position: usize, handle: JobHandle },
}

/// Point-in-time view of the admission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue: Option<usize>,
}

struct PendingJob {
    job: Job,
    artifact: Artifact,
    status: watch::Sender<JobStatus>,
    reply: oneshot::Sender<JobOutcome>,
}

impl PendingJob {
    fn finish(self, status: JobStatus, outcome: JobOutcome) {
        self.status.send_replace(status);
        let _ = self.reply.send(outcome);
        // Artifact dropped here
    }
}

struct AdmissionState {
    running: usize,
    queue: VecDeque<PendingJob>,
    closed: bool,
}

struct Shared {
    state: Mutex<AdmissionState>,
    config: AdmissionConfig,
    cache: Arc<ResultCache>,
    hasher: Arc<dyn ContentHasher>,
    executor: Arc<AnalysisExecutor>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    usage: Arc<UsageLedger>,
    idle: Notify,
}

/// Admission controller
///
/// Cheap to clone; clones share the same slots and queue.
#[derive(Clone)]
pub struct AdmissionController {
    shared: Arc<Shared>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        cache: Arc<ResultCache>,
        hasher: Arc<dyn ContentHasher>,
        executor: Arc<AnalysisExecutor>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        usage: Arc<UsageLedger>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(AdmissionState {
                    running: 0,
                    queue: VecDeque::new(),
                    closed: false,
                }),
                config,
                cache,
                hasher,
                executor,
                id_provider,
                time_provider,
                usage,
                idle: Notify::new(),
            }),
        }
    }

    /// Submit an uploaded artifact for analysis.
    ///
    /// The controller takes ownership of the artifact; it is deleted on every
    /// path (rejection, cache hit, cancellation or job completion).
    ///
    /// # Errors
    /// - `InvalidInput` if the options or the file are rejected
    /// - `QueueFull` if every slot is busy and the queue is at capacity
    /// - `Internal` if the file cannot be hashed or the service is closing
    pub async fn submit(
        &self,
        artifact: Artifact,
        options: AnalysisOptions,
    ) -> Result<Submission, AnalysisError> {
        let shared = &self.shared;
        if shared.lock().closed {
            return Err(AnalysisError::Internal(
                "Service is shutting down".to_string(),
            ));
        }

        if let Err(e) = shared.executor.validate(&artifact, &options).await {
            warn!(path = %artifact.path().display(), error = %e, "Submission rejected");
            return Err(e);
        }

        let digest = shared
            .hasher
            .hash_file(artifact.path())
            .await
            .map_err(|e| AnalysisError::Internal(format!("Cannot hash uploaded file: {}", e)))?;
        let key = shared.hasher.cache_key(&digest, &options);
        debug!(content = digest.short(), tier = %options.tier, "Upload hashed");

        if let Some(report) = shared.cached_report(&key) {
            artifact.remove().await;
            shared.usage.record_cache_hit();
            info!(key = %key, job_id = %report.job_id, "Served analysis from cache");
            return Ok(Submission::Cached(report));
        }

        let job = Job::new(
            shared.id_provider.generate_id(),
            key,
            Arc::new(options),
            shared.time_provider.now_millis(),
        );
        let job_id = job.id.clone();
        let (status_tx, status_rx) = watch::channel(JobStatus::Running);
        let (reply_tx, reply_rx) = oneshot::channel();
        let handle = JobHandle::new(job_id.clone(), status_rx, reply_rx, Arc::downgrade(shared));
        let pending = PendingJob {
            job,
            artifact,
            status: status_tx,
            reply: reply_tx,
        };

        let mut state = shared.lock();
        if state.closed {
            drop(state);
            return Err(AnalysisError::Internal(
                "Service is shutting down".to_string(),
            ));
        }

        if state.running < shared.config.max_concurrent {
            state.running += 1;
            drop(state);
            info!(job_id = %job_id, "Job admitted");
            Shared::spawn_job(Arc::clone(shared), pending);
            return Ok(Submission::Admitted(handle));
        }

        if let Some(max_queue) = shared.config.max_queue {
            if state.queue.len() >= max_queue {
                let err = AnalysisError::QueueFull {
                    running: state.running,
                    queued: state.queue.len(),
                };
                drop(state);
                warn!(job_id = %job_id, error = %err, "Submission refused");
                return Err(err);
            }
        }

        let position = state.queue.len() + 1;
        pending
            .status
            .send_replace(JobStatus::Queued { position });
        state.queue.push_back(pending);
        drop(state);

        info!(job_id = %job_id, position, "Job queued");
        Ok(Submission::Queued { position, handle })
    }

    pub fn stats(&self) -> AdmissionStats {
        let state = self.shared.lock();
        AdmissionStats {
            running: state.running,
            queued: state.queue.len(),
            max_concurrent: self.shared.config.max_concurrent,
            max_queue: self.shared.config.max_queue,
        }
    }

    /// Refuse new submissions. Queued and running jobs still complete.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        info!("Admission closed to new submissions");
    }

    /// Fail every job still waiting for a slot. Returns how many were dropped.
    pub fn abandon_queued(&self) -> usize {
        let abandoned: Vec<PendingJob> = {
            let mut state = self.shared.lock();
            let drained = state.queue.drain(..).collect();
            self.shared.notify_if_idle(&state);
            drained
        };

        let count = abandoned.len();
        for pending in abandoned {
            warn!(job_id = %pending.job.id, "Queued job abandoned at shutdown");
            pending.finish(
                JobStatus::Cancelled,
                Err(AnalysisError::Internal(
                    "Service shut down before the job started".to_string(),
                )),
            );
        }
        count
    }

    /// Resolve once no job is running or queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.shared.lock();
                if state.running == 0 && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl Shared {
    // Poison is recovered: state is only mutated in short non-panicking sections
    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_report(&self, key: &CacheKey) -> Option<AnalysisReport> {
        let entry = self.cache.get(key)?;
        match serde_json::from_value::<AnalysisReport>(entry.payload) {
            Ok(mut report) => {
                report.cached = true;
                Some(report)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable cache entry, treating as miss");
                None
            }
        }
    }

    /// Run a job whose slot is already counted in `running`
    fn spawn_job(shared: Arc<Shared>, pending: PendingJob) {
        pending.status.send_replace(JobStatus::Running);
        tokio::spawn(async move {
            let PendingJob {
                mut job,
                artifact,
                status,
                reply,
            } = pending;
            let slot = SlotGuard {
                shared: Arc::clone(&shared),
            };

            let outcome = shared.run_job(&mut job, artifact).await;
            let terminal = if outcome.is_ok() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };

            // Slot first, so a caller woken by the result sees it released
            drop(slot);
            status.send_replace(terminal);
            if reply.send(outcome).is_err() {
                debug!(job_id = %job.id, "Caller gone before job finished");
            }
        });
    }

    async fn run_job(&self, job: &mut Job, artifact: Artifact) -> JobOutcome {
        job.start(self.time_provider.now_millis())?;
        info!(
            job_id = %job.id,
            tier = %job.options.tier,
            queue_wait_ms = self.time_provider.now_millis() - job.submitted_at,
            "Job started"
        );

        // Separate task so a panic in the pipeline cannot take the slot with it
        let executor = Arc::clone(&self.executor);
        let snapshot = job.clone();
        let joined =
            tokio::spawn(async move { executor.execute(&snapshot, artifact).await }).await;

        let outcome = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Analysis task panicked");
                Err(AnalysisError::Internal(format!("Analysis task failed: {}", e)))
            }
        };

        let now = self.time_provider.now_millis();
        let transition = match &outcome {
            Ok(report) => {
                self.usage.record_analysis(&report.usage);
                job.complete(now)
            }
            Err(e) => {
                self.usage.record_failure();
                warn!(job_id = %job.id, code = e.code(), error = %e, "Job failed");
                job.fail(now)
            }
        };
        if let Err(e) = transition {
            error!(job_id = %job.id, error = %e, "Job state transition rejected");
        }
        outcome
    }

    /// Free one slot and start queue heads until the ceiling is reached again
    fn release_slot(self: &Arc<Self>) {
        let mut to_start = Vec::new();
        let mut withdrawn = Vec::new();
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);

            while state.running < self.config.max_concurrent {
                let Some(next) = state.queue.pop_front() else {
                    break;
                };
                if next.reply.is_closed() {
                    withdrawn.push(next);
                    continue;
                }
                state.running += 1;
                to_start.push(next);
            }

            refresh_positions(&state.queue);
            self.notify_if_idle(&state);
        }

        for pending in withdrawn {
            info!(job_id = %pending.job.id, "Skipping queued job whose caller left");
            pending.status.send_replace(JobStatus::Cancelled);
        }

        if to_start.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(_) => {
                for pending in to_start {
                    info!(job_id = %pending.job.id, "Queued job dispatched");
                    Self::spawn_job(Arc::clone(self), pending);
                }
            }
            Err(_) => {
                // Runtime is gone (process teardown); nothing can run any more
                for pending in to_start {
                    pending.finish(
                        JobStatus::Cancelled,
                        Err(AnalysisError::Internal("Runtime stopped".to_string())),
                    );
                }
            }
        }
    }

    /// Remove a job from the wait queue. Running jobs are left alone.
    fn withdraw(&self, job_id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let idx = state.queue.iter().position(|p| p.job.id == job_id);
            let removed = idx.and_then(|idx| state.queue.remove(idx));
            if removed.is_some() {
                refresh_positions(&state.queue);
                self.notify_if_idle(&state);
            }
            removed
        };

        match removed {
            Some(pending) => {
                info!(job_id = %job_id, "Queued job cancelled");
                pending.status.send_replace(JobStatus::Cancelled);
                true
            }
            None => false,
        }
    }

    fn notify_if_idle(&self, state: &AdmissionState) {
        if state.running == 0 && state.queue.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

fn refresh_positions(queue: &VecDeque<PendingJob>) {
    for (idx, pending) in queue.iter().enumerate() {
        let position = idx + 1;
        pending.status.send_if_modified(|status| {
            if *status == (JobStatus::Queued { position }) {
                false
            } else {
                *status = JobStatus::Queued { position };
                true
            }
        });
    }
}

/// Holds one worker slot; releases it on drop, including during unwinding
struct SlotGuard {
    shared: Arc<Shared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.release_slot();
    }
}
