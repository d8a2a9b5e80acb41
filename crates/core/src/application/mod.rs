// Application Layer - Use Cases and Business Logic

pub mod admission;
pub mod cache;
pub mod config;
pub mod constants;
pub mod executor;
pub mod janitor;
pub mod lifecycle;
pub mod retry;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use admission::{AdmissionController, AdmissionStats, JobHandle, JobOutcome, Submission};
pub use cache::ResultCache;
pub use config::{AdmissionConfig, CacheConfig, ExecutorConfig, ServiceConfig};
pub use executor::{AnalysisExecutor, Artifact, ScratchDir};
pub use janitor::{CacheJanitor, SweepReport};
pub use lifecycle::{
    shutdown_channel, ClipscopeService, Collaborators, ShutdownReport, ShutdownSender,
    ShutdownToken,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use usage::{UsageCounters, UsageLedger, UsageSnapshot};
