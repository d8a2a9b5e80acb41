// Pipeline defaults (ADR: No magic values)
use std::time::Duration;

/// Default worker slots
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Default queue depth before submissions are rejected with QueueFull
pub const DEFAULT_MAX_QUEUE: usize = 32;

/// Default cache entry lifetime (7 days)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default cache janitor cadence (1 hour)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Wall-clock bound on frame extraction (60s)
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Wall-clock bound on a single inference attempt (90s)
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(90);

/// Default inference attempts before AnalysisUnavailable
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Backoff multiplier between attempts
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;

/// Upper bound on a single backoff delay (30s)
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Usage ledger roll-over check cadence (1 minute)
pub const DEFAULT_USAGE_TICK: Duration = Duration::from_secs(60);

/// How long shutdown waits for running jobs before the final persist (30s)
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
