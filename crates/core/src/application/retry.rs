// Retry logic for the inference call (ADR-002 backoff)
use crate::application::constants::*;
use crate::port::{AnalyzerError, Sleeper};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff delay
    Retry(Duration),
    /// Do not retry, the call has failed permanently
    Failed,
}

/// Exponential backoff policy
///
/// Determines if a failed attempt should be retried based on:
/// - Attempt number (1-based) against `max_attempts`
/// - Whether the error is transient
/// - `base_delay * multiplier ^ (attempt - 1)`, capped at `max_delay`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Example
    /// ```text
    /// let policy = RetryPolicy::new(3, Duration::from_secs(1));
    /// ```
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Backoff after the given failed attempt, before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Determine if a failed attempt should be retried
    ///
    /// `seed` (the job id) makes the ±10% jitter deterministic per job while
    /// still spreading concurrent jobs apart.
    pub fn decide(&self, attempt: u32, error: &AnalyzerError, seed: &str) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::Failed;
        }
        RetryDecision::Retry(jitter(self.delay_for_attempt(attempt), seed))
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-based attempt number. Returns the value together
    /// with the number of attempts used, or the last error and attempt count.
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        job_id: &str,
        mut op: F,
    ) -> Result<(T, u32), (AnalyzerError, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AnalyzerError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => match self.decide(attempt, &e, job_id) {
                    RetryDecision::Retry(delay) => {
                        info!(
                            job_id = %job_id,
                            attempt = attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying inference after failure"
                        );
                        sleeper.sleep(delay).await;
                    }
                    RetryDecision::Failed => {
                        warn!(
                            job_id = %job_id,
                            attempts = attempt,
                            error = %e,
                            "Inference failed, not retrying"
                        );
                        return Err((e, attempt));
                    }
                },
            }
        }
    }
}

// 0.9 to 1.1, seeded by job id
fn jitter(delay: Duration, seed: &str) -> Duration {
    let jitter_seed = seed.chars().map(|c| c as u32).sum::<u32>();
    let factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);
    delay.mul_f64(factor)
}
