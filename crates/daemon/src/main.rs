//! Clipscope - Main Entry Point
//! Gameplay clip analysis from the command line

mod commands;
mod config;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use clipscope_core::application::{ClipscopeService, Collaborators};
use clipscope_core::domain::DetailTier;
use clipscope_core::port::id_provider::UuidProvider;
use clipscope_core::port::sleeper::TokioSleeper;
use clipscope_core::port::time_provider::SystemTimeProvider;
use clipscope_infra_inference::{ChatCompletionsAnalyzer, ChatCompletionsConfig};
use clipscope_infra_store::JsonFileCacheStore;
use clipscope_infra_system::{FfmpegFrameExtractor, Sha256ContentHasher};

use crate::commands::AnalyzeRequest;
use crate::config::{DaemonConfig, LogFormat};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "clipscope")]
#[command(about = "Gameplay clip analysis", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more clips
    Analyze {
        /// Video files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Detail tier (low, normal, high)
        #[arg(short, long, default_value = "normal")]
        tier: DetailTier,

        /// Game title
        #[arg(short, long)]
        game: Option<String>,

        /// Free-form notes for the analyzer
        #[arg(short, long)]
        notes: Option<String>,

        /// Focus area (repeatable)
        #[arg(short, long = "focus")]
        focus: Vec<String>,
    },

    /// Evict expired cache entries once
    Sweep,

    /// Show cache size and admission limits
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging (JSON format for production - ADR-050)
    init_logging(config.log_format)?;
    info!("Clipscope v{} starting...", VERSION);

    // 3. Setup dependencies (DI wiring)
    let mut service = build_service(&config)?;

    // 4. Run the command
    match cli.command {
        Commands::Analyze {
            files,
            tier,
            game,
            notes,
            focus,
        } => {
            let request = AnalyzeRequest {
                files,
                tier,
                game,
                notes,
                focus,
            };
            service.start().await;

            let results = commands::analyze(&service, &request).await;
            let failures = results.iter().filter(|r| r.is_failure()).count();
            println!("{}", serde_json::to_string_pretty(&results)?);

            let usage = service.usage().snapshot();
            info!(
                analyses = usage.daily.analyses,
                cache_hits = usage.daily.cache_hits,
                tokens = usage.daily.tokens,
                "Usage today"
            );

            let report = service.shutdown().await;
            if !report.persisted {
                tracing::warn!("Final cache snapshot was not written");
            }
            if failures > 0 {
                bail!("{} of {} analyses failed", failures, results.len());
            }
        }
        Commands::Sweep => {
            let summary = commands::sweep(&service).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Stats => {
            let summary = commands::stats(&service, &config.cache_path).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("clipscope=info,warn"))
        .map_err(|e| anyhow!("Failed to create env filter: {}", e))?;

    // Logs go to stderr; stdout carries the JSON results
    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn build_service(config: &DaemonConfig) -> Result<ClipscopeService> {
    let mut analyzer_config =
        ChatCompletionsConfig::new(&config.analyzer.url, &config.analyzer.model);
    if let Some(key) = &config.analyzer.api_key {
        analyzer_config = analyzer_config.with_api_key(key);
    }
    // Per-attempt bound is enforced by the executor; the client bound is a backstop
    analyzer_config.request_timeout = config.service.executor.inference_timeout * 2;
    let analyzer = ChatCompletionsAnalyzer::new(analyzer_config)
        .map_err(|e| anyhow!("HTTP client creation failed: {}", e))?;

    info!(
        cache_path = %config.cache_path.display(),
        scratch_root = %config.service.executor.scratch_root.display(),
        analyzer = %analyzer.endpoint(),
        "Wiring pipeline"
    );

    let deps = Collaborators {
        extractor: Arc::new(FfmpegFrameExtractor::new()),
        analyzer: Arc::new(analyzer),
        hasher: Arc::new(Sha256ContentHasher::new()),
        store: Arc::new(JsonFileCacheStore::new(&config.cache_path)),
        time_provider: Arc::new(SystemTimeProvider),
        id_provider: Arc::new(UuidProvider),
        sleeper: Arc::new(TokioSleeper),
    };

    ClipscopeService::new(config.service.clone(), deps)
        .map_err(|e| anyhow!("Service setup failed: {}", e))
}
