//! Runtime configuration from `CLIPSCOPE_*` environment variables

use anyhow::{anyhow, Context, Result};
use clipscope_core::application::constants::*;
use clipscope_core::application::{RetryPolicy, ServiceConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CACHE_PATH: &str = "~/.clipscope/analysis-cache.json";
const DEFAULT_ANALYZER_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ANALYZER_MODEL: &str = "gpt-4o-mini";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Vision endpoint settings
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub service: ServiceConfig,
    pub cache_path: PathBuf,
    pub analyzer: AnalyzerSettings,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut service = ServiceConfig::default();

        service.admission.max_concurrent =
            parse_or(&lookup, "CLIPSCOPE_MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT)?;
        service.admission.max_queue = match lookup("CLIPSCOPE_MAX_QUEUE") {
            Some(v) if v.trim().eq_ignore_ascii_case("none") => None,
            Some(v) => Some(parse_value("CLIPSCOPE_MAX_QUEUE", &v)?),
            None => Some(DEFAULT_MAX_QUEUE),
        };

        service.cache.ttl = secs_or(&lookup, "CLIPSCOPE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL)?;
        service.cache.sweep_interval =
            secs_or(&lookup, "CLIPSCOPE_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL)?;

        if let Some(dir) = lookup("CLIPSCOPE_SCRATCH_DIR") {
            service.executor.scratch_root = expand(&dir);
        }
        service.executor.extraction_timeout = secs_or(
            &lookup,
            "CLIPSCOPE_EXTRACTION_TIMEOUT_SECS",
            DEFAULT_EXTRACTION_TIMEOUT,
        )?;
        service.executor.inference_timeout = secs_or(
            &lookup,
            "CLIPSCOPE_INFERENCE_TIMEOUT_SECS",
            DEFAULT_INFERENCE_TIMEOUT,
        )?;

        let max_attempts = parse_or(
            &lookup,
            "CLIPSCOPE_RETRY_MAX_ATTEMPTS",
            DEFAULT_RETRY_MAX_ATTEMPTS,
        )?;
        let base_delay_ms: u64 = parse_or(
            &lookup,
            "CLIPSCOPE_RETRY_BASE_DELAY_MS",
            DEFAULT_RETRY_BASE_DELAY.as_millis() as u64,
        )?;
        service.executor.retry =
            RetryPolicy::new(max_attempts, Duration::from_millis(base_delay_ms));

        service
            .validate()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

        let cache_path = expand(
            &lookup("CLIPSCOPE_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string()),
        );

        let analyzer = AnalyzerSettings {
            url: lookup("CLIPSCOPE_ANALYZER_URL")
                .unwrap_or_else(|| DEFAULT_ANALYZER_URL.to_string()),
            model: lookup("CLIPSCOPE_ANALYZER_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYZER_MODEL.to_string()),
            api_key: lookup("CLIPSCOPE_ANALYZER_API_KEY").filter(|k| !k.trim().is_empty()),
        };

        let log_format = match lookup("CLIPSCOPE_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            service,
            cache_path,
            analyzer,
            log_format,
        })
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("{}='{}' is not a valid value", name, raw))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration> {
    parse_or(lookup, name, default.as_secs()).map(Duration::from_secs)
}
