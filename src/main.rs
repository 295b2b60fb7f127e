//! aqi-pipeline: streaming AQI ingestion service
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline against the spool directory (serves the API if [server] addr is set)
//! aqi-pipeline run
//!
//! # Drain the spool once and exit
//! aqi-pipeline run --once
//!
//! # Spool readings from a JSON-lines file
//! aqi-pipeline enqueue readings.jsonl
//!
//! # Spool weather observations; a running pipeline records them into the side table
//! aqi-pipeline import-weather weather.jsonl
//!
//! # Validate configuration
//! aqi-pipeline check-config --print
//! ```
//!
//! # Environment Variables
//!
//! - `AQI_PIPELINE_CONFIG`: config file path (when `--config` is not given)
//! - `AQI_CORS_ORIGINS`: comma-separated origins allowed by the read API
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aqi_pipeline::api::{create_app, ApiState};
use aqi_pipeline::config::{PipelineConfig, QueueKind, StorageBackend};
use aqi_pipeline::pipeline::{PipelineCoordinator, PipelineStats};
use aqi_pipeline::source::{open_queue, SpoolQueue};
use aqi_pipeline::storage::{ProcessLock, Stores};
use aqi_pipeline::types::WeatherObservation;
use aqi_pipeline::weather::WeatherIngest;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "aqi-pipeline")]
#[command(about = "Air-quality ingestion, AQI scoring and dual-store persistence")]
#[command(version)]
struct CliArgs {
    /// Configuration file (default: $AQI_PIPELINE_CONFIG, then ./aqi_pipeline.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the pipeline (default)
    Run {
        /// Drain the inbound queue, then exit
        #[arg(long)]
        once: bool,
        /// Override `[server] addr` for the read API
        #[arg(short, long, value_name = "HOST:PORT")]
        addr: Option<String>,
    },
    /// Spool readings from a JSON-lines file into the inbound directory
    Enqueue {
        file: PathBuf,
    },
    /// Spool weather observations (JSON lines) for the side table
    ImportWeather {
        file: PathBuf,
    },
    /// Validate configuration and exit
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Pipeline,
    WeatherIngest,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Pipeline => write!(f, "Pipeline"),
            TaskName::WeatherIngest => write!(f, "WeatherIngest"),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    state: ApiState,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        axum::serve(listener, create_app(state))
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
            })
            .await
            .context("HTTP server error")?;
        Ok(TaskName::HttpServer)
    });
}

/// Monitor tasks; any failure cancels the rest.
async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!(task = %task_name, "Task completed"),
            Ok(Err(e)) => {
                error!(error = %e, "Task failed, shutting down");
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "Task panicked, shutting down");
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {e}"));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).context("Invalid pipeline configuration")
}

/// Lock the data directory when a sled database lives there.
fn lock_data_dir(config: &PipelineConfig) -> Result<Option<ProcessLock>> {
    match config.storage.backend {
        StorageBackend::Sled => Ok(Some(ProcessLock::acquire(&config.storage.data_dir)?)),
        StorageBackend::Memory => Ok(None),
    }
}

async fn run_pipeline(mut config: PipelineConfig, once: bool, addr: Option<String>) -> Result<()> {
    if let Some(addr) = addr {
        config.server.addr = Some(addr);
        config.validate().context("Invalid --addr")?;
    }

    let _lock = lock_data_dir(&config)?;
    let stores = Stores::open(&config.storage).context("Failed to open stores")?;
    let queue = open_queue(&config.queue, once).context("Failed to open inbound queue")?;
    let stats = Arc::new(PipelineStats::new());

    let coordinator = PipelineCoordinator::new(&config, &stores, queue, stats.clone())
        .context("Failed to build pipeline")?;
    let table_version = config.breakpoint_set()?.version().to_string();
    info!(
        table = %table_version,
        scale = %config.breakpoints.scale,
        workers = coordinator.worker_count(),
        "AQI pipeline starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    // Observations spooled while stopped are in the table before the first reading
    WeatherIngest::open(&config.weather, stores.weather_writer.clone(), true)
        .context("Failed to open weather spool")?
        .run(cancel_token.clone())
        .await;

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if !once {
        let ingest = WeatherIngest::open(&config.weather, stores.weather_writer.clone(), false)
            .context("Failed to open weather spool")?;
        info!(spool = %config.weather.spool_dir.display(), "Weather ingest running");
        let ingest_token = cancel_token.clone();
        task_set.spawn(async move {
            ingest.run(ingest_token).await;
            Ok(TaskName::WeatherIngest)
        });
    }

    if let Some(addr) = &config.server.addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;
        info!(addr = %addr, "Read API listening");
        let state = ApiState::new(&stores, stats.clone(), table_version);
        spawn_http_server(&mut task_set, listener, state, cancel_token.clone());
    }

    let pipeline_token = cancel_token.clone();
    task_set.spawn(async move {
        coordinator.run(pipeline_token.clone()).await;
        // Queue closed (EOF or --once): stop the API too
        pipeline_token.cancel();
        Ok(TaskName::Pipeline)
    });

    let result = run_supervisor(&mut task_set, cancel_token).await;

    if let Err(e) = stores.flush() {
        warn!(error = %e, "Failed to flush stores on shutdown");
    }
    result?;
    info!("AQI pipeline shutdown complete");
    Ok(())
}

fn enqueue_file(config: &PipelineConfig, file: &Path) -> Result<()> {
    if config.queue.kind != QueueKind::Spool {
        bail!("enqueue requires [queue] kind = \"spool\"");
    }
    let spool = SpoolQueue::open(&config.queue.spool_dir, std::time::Duration::ZERO)?;
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );

    let (mut queued, mut skipped) = (0usize, 0usize);
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", file.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(line) {
            warn!(line = n + 1, error = %e, "Skipping line that is not JSON");
            skipped += 1;
            continue;
        }
        spool.enqueue(line.as_bytes())?;
        queued += 1;
    }

    info!(queued, skipped, spool = %spool.dir().display(), "Readings spooled");
    Ok(())
}

fn import_weather(config: &PipelineConfig, file: &Path) -> Result<()> {
    let spool = SpoolQueue::open(&config.weather.spool_dir, std::time::Duration::ZERO)?;
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );

    let (mut queued, mut skipped) = (0usize, 0usize);
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WeatherObservation>(&line) {
            Ok(obs) => {
                spool.enqueue_json(&obs)?;
                queued += 1;
            }
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping invalid weather observation");
                skipped += 1;
            }
        }
    }

    info!(queued, skipped, spool = %spool.dir().display(), "Weather observations spooled");
    Ok(())
}

fn check_config(config: &PipelineConfig, print: bool) -> Result<()> {
    let set = config.breakpoint_set()?;
    info!(
        table = %set.version(),
        scale = %set.scale(),
        workers = config.pipeline.workers,
        queue = ?config.queue.kind,
        storage = ?config.storage.backend,
        "Configuration OK"
    );
    if print {
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(args.config.as_deref())?;

    match args.command.unwrap_or(SubCommand::Run {
        once: false,
        addr: None,
    }) {
        SubCommand::Run { once, addr } => run_pipeline(config, once, addr).await,
        SubCommand::Enqueue { file } => enqueue_file(&config, &file),
        SubCommand::ImportWeather { file } => import_weather(&config, &file),
        SubCommand::CheckConfig { print } => check_config(&config, print),
    }
}
