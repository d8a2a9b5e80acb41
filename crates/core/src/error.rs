// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] crate::domain::AnalysisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache store error: {0}")]
    CacheStore(#[from] crate::port::CacheStoreError),

    #[error("Frame extraction error: {0}")]
    Extraction(#[from] crate::port::ExtractionError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] crate::port::AnalyzerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
