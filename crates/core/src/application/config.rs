// Service configuration (plain scalars, no framework config objects)

use crate::application::constants::*;
use crate::application::retry::RetryPolicy;
use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Admission control limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Worker slots (MAX_CONCURRENT)
    pub max_concurrent: usize,
    /// Waiting jobs allowed (MAX_QUEUE). `None` = unbounded, `Some(0)` = never queue.
    pub max_queue: Option<usize>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_queue: Some(DEFAULT_MAX_QUEUE),
        }
    }
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Parent of the per-job scratch directories
    pub scratch_root: PathBuf,
    pub extraction_timeout: Duration,
    /// Bound on each individual inference attempt
    pub inference_timeout: Duration,
    pub retry: RetryPolicy,
    /// Persist the cache right after each write-through
    pub persist_on_write: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("clipscope"),
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            retry: RetryPolicy::default(),
            persist_on_write: true,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Everything the pipeline reads at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub admission: AdmissionConfig,
    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
    pub usage_tick: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            usage_tick: DEFAULT_USAGE_TICK,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServiceConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_concurrent == 0 {
            return Err(AppError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.executor.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if self.executor.retry.multiplier < 1.0 {
            return Err(AppError::Config(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.executor.retry.multiplier
            )));
        }
        let timers = [
            ("cache ttl", self.cache.ttl),
            ("sweep interval", self.cache.sweep_interval),
            ("extraction timeout", self.executor.extraction_timeout),
            ("inference timeout", self.executor.inference_timeout),
            ("usage tick", self.usage_tick),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(AppError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}
