// Frame Extractor Port
// Abstraction for pulling representative frames out of a video

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How many frames to extract and at which width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub count: usize,
    pub width: u32,
}

/// Extraction errors (never fatal to a job)
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Extraction failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame Extractor trait
///
/// Implementations write frame images into `out_dir` (a per-job scratch
/// directory owned by the caller) and return their paths in timeline order.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract at most `spec.count` frames
    ///
    /// # Errors
    /// - ExtractionError::SpawnFailed if the tool cannot be started
    /// - ExtractionError::Failed if it exits unsuccessfully
    async fn extract(
        &self,
        artifact: &Path,
        out_dir: &Path,
        spec: FrameSpec,
    ) -> Result<Vec<PathBuf>, ExtractionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock extractor behavior
    #[derive(Debug, Clone)]
    pub enum ExtractBehavior {
        /// Write as many frames as requested
        Full,
        /// Write at most N frames
        Partial(usize),
        /// Write N frames, then report failure
        FailAfter(usize),
        /// Never complete (exercises the extraction timeout)
        Hang,
    }

    /// Scripted extractor that writes small placeholder frames
    pub struct ScriptedFrameExtractor {
        behavior: Mutex<ExtractBehavior>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedFrameExtractor {
        pub fn new(behavior: ExtractBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn full() -> Self {
            Self::new(ExtractBehavior::Full)
        }

        pub fn set_behavior(&self, behavior: ExtractBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Artifacts seen, in call order
        pub fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().clone()
        }
    }

    async fn write_frames(out_dir: &Path, n: usize) -> Result<Vec<PathBuf>, ExtractionError> {
        let mut frames = Vec::with_capacity(n);
        for i in 1..=n {
            let path = out_dir.join(format!("frame_{:03}.jpg", i));
            tokio::fs::write(&path, b"\xFF\xD8\xFF\xD9").await?;
            frames.push(path);
        }
        Ok(frames)
    }

    #[async_trait]
    impl FrameExtractor for ScriptedFrameExtractor {
        async fn extract(
            &self,
            artifact: &Path,
            out_dir: &Path,
            spec: FrameSpec,
        ) -> Result<Vec<PathBuf>, ExtractionError> {
            self.calls.lock().unwrap().push(artifact.to_path_buf());
            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                ExtractBehavior::Full => write_frames(out_dir, spec.count).await,
                ExtractBehavior::Partial(n) => write_frames(out_dir, n.min(spec.count)).await,
                ExtractBehavior::FailAfter(n) => {
                    write_frames(out_dir, n.min(spec.count)).await?;
                    Err(ExtractionError::Failed("mock decoder error".to_string()))
                }
                ExtractBehavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(Vec::new())
                }
            }
        }
    }
}
