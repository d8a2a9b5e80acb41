// Analyzer Port
// The vision/text inference call behind each analysis

use crate::domain::AnalysisContext;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Result of one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub text: String,
    /// Opaque accounting data (tokens, cost), passed through unmodified
    pub usage: serde_json::Value,
}

/// Input of one inference call
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub context: &'a AnalysisContext,
    pub frames: &'a [PathBuf],
    pub token_budget: u32,
}

/// Analyzer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    /// Rate limited, timed out, upstream 5xx: worth retrying
    #[error("Transient analyzer failure: {0}")]
    Transient(String),

    /// Rejected request or unusable response: retrying cannot help
    #[error("Analyzer rejected request: {0}")]
    Permanent(String),
}

impl AnalyzerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::Transient(_))
    }
}

/// Analyzer trait
///
/// Implementations:
/// - ChatCompletionsAnalyzer (infra-inference): OpenAI-compatible vision endpoint
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn infer(&self, request: InferenceRequest<'_>) -> Result<Inference, AnalyzerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Analyzer that replays a script of results.
    ///
    /// Once the script is exhausted every call succeeds. A gated analyzer
    /// blocks each call until a permit is released, which lets tests hold
    /// jobs in the Running state.
    pub struct ScriptedAnalyzer {
        script: Mutex<VecDeque<Result<Inference, AnalyzerError>>>,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        frames_seen: Mutex<Vec<usize>>,
    }

    impl ScriptedAnalyzer {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                gate: None,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                frames_seen: Mutex::new(Vec::new()),
            }
        }

        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::new()
            }
        }

        pub fn with_script(script: Vec<Result<Inference, AnalyzerError>>) -> Self {
            let analyzer = Self::new();
            *analyzer.script.lock().unwrap() = script.into();
            analyzer
        }

        /// Let `n` blocked (or future) calls through
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        pub fn push(&self, result: Result<Inference, AnalyzerError>) {
            self.script.lock().unwrap().push_back(result);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn frames_seen(&self) -> Vec<usize> {
            self.frames_seen.lock().unwrap().clone()
        }

        pub fn success(text: &str) -> Result<Inference, AnalyzerError> {
            Ok(Inference {
                text: text.to_string(),
                usage: serde_json::json!({"total_tokens": 100}),
            })
        }
    }

    impl Default for ScriptedAnalyzer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Analyzer for ScriptedAnalyzer {
        async fn infer(&self, request: InferenceRequest<'_>) -> Result<Inference, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.frames_seen.lock().unwrap().push(request.frames.len());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let next = self.script.lock().unwrap().pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            next.unwrap_or_else(|| Self::success("mock analysis"))
        }
    }
}
