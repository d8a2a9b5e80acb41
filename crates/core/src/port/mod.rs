// Port Layer - Interfaces for external dependencies

pub mod analyzer;
pub mod cache_store;
pub mod content_hasher;
pub mod frame_extractor;
pub mod id_provider; // For deterministic testing
pub mod sleeper; // For retry tests without real delays
pub mod time_provider;

// Re-exports
pub use analyzer::{Analyzer, AnalyzerError, Inference, InferenceRequest};
pub use cache_store::{CacheStore, CacheStoreError};
pub use content_hasher::ContentHasher;
pub use frame_extractor::{ExtractionError, FrameExtractor, FrameSpec};
pub use id_provider::IdProvider;
pub use sleeper::Sleeper;
pub use time_provider::TimeProvider;
