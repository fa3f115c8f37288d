//! VibeSensor — vehicle NVH/vibration diagnostic appliance.
//!
//! Reads accelerometer blocks (and vehicle telemetry) from a
//! newline-delimited JSON stream, continuously computes per-sensor
//! vibration metrics, serves a live-diagnostics snapshot and a run
//! history/insights API over HTTP, and on request records a run to disk
//! for offline order/residual-peak analysis.
//!
//! # Usage
//!
//! ```bash
//! # Pipe a recorded or simulated sensor stream in over stdin
//! ./simulation | vibesensor --addr 0.0.0.0:8080
//! ```
//!
//! # Environment Variables
//!
//! - `VIBESENSOR_CONFIG`: path to a TOML config file (see `config::Config::load`)
//! - `RUST_LOG`: tracing filter (default: info)
//! - `RESET_DB`: set to "true" to wipe `./data` on startup

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vibesensor::acquisition::{SampleSource, StdinFrameSource};
use vibesensor::api::{self, ApiState};
use vibesensor::config::{self, Config};
use vibesensor::pipeline::{self, AnalysisJob, PipelineState, TaskName};
use vibesensor::storage::HistoryStore;
use vibesensor::RunStatus;

#[derive(Parser, Debug)]
#[command(name = "vibesensor")]
#[command(about = "Vehicle NVH/vibration diagnostic appliance")]
#[command(version)]
struct CliArgs {
    /// HTTP bind address (overrides VIBESENSOR_ADDR / default 0.0.0.0:8080)
    #[arg(short, long)]
    addr: Option<String>,

    /// Directory for the sled history database (default: ./data)
    #[arg(long)]
    data_dir: Option<String>,

    /// Wipe the data directory on startup. WARNING: destructive.
    /// Can also be set via RESET_DB=true.
    #[arg(long)]
    reset_db: bool,
}

fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    std::env::var("RESET_DB")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn reset_data_directory(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        info!("data directory does not exist, nothing to reset");
        return Ok(());
    }
    warn!(dir = %data_dir.display(), "RESET_DB requested, wiping data directory");
    std::fs::remove_dir_all(data_dir).context("failed to remove data directory")?;
    Ok(())
}

/// Finds runs left in `Analyzing` from a previous process (crash or kill
/// mid-analysis) and re-enqueues them. A run whose samples fail to load is
/// marked `Error` rather than retried indefinitely.
fn recover_interrupted_runs(state: &PipelineState) {
    const MAX_RECOVERY_ATTEMPTS: u32 = 3;

    let runs = match state.history.list_runs() {
        Ok(runs) => runs,
        Err(e) => {
            error!(error = %e, "failed to list run history during startup recovery");
            return;
        }
    };

    for mut metadata in runs.into_iter().filter(|r| r.status == RunStatus::Analyzing) {
        let mut attempt = 0;
        let samples = loop {
            attempt += 1;
            match state.history.get_samples(&metadata.run_id) {
                Ok(samples) => break Some(samples),
                Err(e) if attempt < MAX_RECOVERY_ATTEMPTS => {
                    warn!(run_id = %metadata.run_id, attempt, error = %e, "retrying sample load for interrupted run");
                }
                Err(e) => {
                    error!(run_id = %metadata.run_id, error = %e, "giving up on interrupted run, marking as error");
                    break None;
                }
            }
        };

        match samples {
            Some(samples) => {
                info!(run_id = %metadata.run_id, rows = samples.len(), "re-queuing interrupted run for analysis");
                state.analysis_queue.push(AnalysisJob {
                    metadata,
                    samples,
                    connected_locations: Default::default(),
                });
            }
            None => {
                metadata.status = RunStatus::Error;
                metadata.error_message = Some("interrupted before analysis could recover samples".to_string());
                if let Err(e) = state.history.save_run_metadata(&metadata) {
                    error!(run_id = %metadata.run_id, error = %e, "failed to persist recovery failure status");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let data_dir = args.data_dir.unwrap_or_else(|| "./data".to_string());
    let data_path = Path::new(&data_dir);

    if should_reset_db(args.reset_db) {
        reset_data_directory(data_path)?;
    }

    config::init(Config::load());

    let addr = args
        .addr
        .or_else(|| std::env::var("VIBESENSOR_ADDR").ok())
        .unwrap_or_else(|| "0.0.0.0:8080".to_string());

    info!("VibeSensor starting, data_dir={data_dir}, addr={addr}");

    let history = HistoryStore::open(data_path).context("failed to open history store")?;
    let state = Arc::new(PipelineState::new(history));

    recover_interrupted_runs(&state);

    let app = api::create_app(ApiState { pipeline: Arc::clone(&state) });
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("HTTP API listening on {addr}");

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("ctrl-c received, initiating shutdown");
        shutdown_cancel.cancel();
    });

    let mut tasks: JoinSet<(TaskName, anyhow::Result<()>)> = JoinSet::new();
    let source: Box<dyn SampleSource> = Box::new(StdinFrameSource::new());
    pipeline::spawn_all(&mut tasks, Arc::clone(&state), source, cancel.clone());

    let http_cancel = cancel.clone();
    let mut http_task: JoinSet<anyhow::Result<()>> = JoinSet::new();
    http_task.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                http_cancel.cancelled().await;
                info!("[HttpServer] shutdown signal received");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
    });

    let shutdown_analysis_timeout = Duration::from_secs(config::get().shutdown_analysis_timeout_s);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("supervisor: shutdown signal received, waiting on pipeline tasks");
                break;
            }
            result = tasks.join_next() => {
                match result {
                    Some(Ok((name, Ok(())))) => info!(task = ?name, "pipeline task completed normally"),
                    Some(Ok((name, Err(e)))) => {
                        error!(task = ?name, error = %e, "pipeline task failed, shutting down");
                        cancel.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "pipeline task panicked, shutting down");
                        cancel.cancel();
                        return Err(anyhow::anyhow!("pipeline task panicked: {e}"));
                    }
                    None => {
                        info!("supervisor: all pipeline tasks completed");
                        break;
                    }
                }
            }
            result = http_task.join_next() => {
                if let Some(result) = result {
                    match result {
                        Ok(Ok(())) => info!("HTTP server exited"),
                        Ok(Err(e)) => {
                            error!(error = %e, "HTTP server failed, shutting down");
                            cancel.cancel();
                            return Err(e);
                        }
                        Err(e) => {
                            error!(error = %e, "HTTP server task panicked");
                            cancel.cancel();
                            return Err(anyhow::anyhow!("HTTP server panicked: {e}"));
                        }
                    }
                }
            }
        }
    }

    // The analysis worker alone may still be draining queued runs; every
    // other task exits as soon as it observes cancellation.
    if tokio::time::timeout(shutdown_analysis_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            timeout_s = shutdown_analysis_timeout.as_secs(),
            "shutdown_analysis_timeout_s exceeded, aborting remaining pipeline tasks"
        );
        tasks.shutdown().await;
    }
    http_task.shutdown().await;

    info!("VibeSensor shutdown complete");
    Ok(())
}
