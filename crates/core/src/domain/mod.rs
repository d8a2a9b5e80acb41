// Domain Layer - Pure business logic and entities

pub mod cache;
pub mod digest;
pub mod error;
pub mod job;
pub mod media;
pub mod options;
pub mod report;

// Re-exports
pub use cache::{CacheEntry, CacheSnapshot, CACHE_SNAPSHOT_VERSION};
pub use digest::{CacheKey, ContentDigest};
pub use error::{AnalysisError, DomainError};
pub use job::{Job, JobId, JobState, JobStatus};
pub use media::{sniff_container, VideoContainer, SNIFF_LEN};
pub use options::{AnalysisContext, AnalysisOptions, DetailTier, TierProfile};
pub use report::{AnalysisReport, FrameExtractionDegraded, ReportStats};
