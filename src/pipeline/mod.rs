//! Pipeline orchestration (spec §5): the mixed concurrency model wiring
//! together acquisition, signal processing, recording, live diagnostics, and
//! post-run analysis.
//!
//! ```text
//! ingest task        — drains the sample source into buffer/registry, no fixed rate
//! processing task    — fft_update_hz:  ring buffer -> FFT -> strength metrics
//! recorder task       — metrics_log_hz: latest metrics -> sled + in-memory run
//! live broadcast task — ui_push_hz:     latest metrics -> C11 hysteresis engine
//! analysis worker     — drains the bounded post-stop queue (C6-C10)
//! ```
//!
//! All five run as independent tasks under one `CancellationToken`; `main.rs`
//! supervises them with a `JoinSet` and applies `shutdown_analysis_timeout_s`
//! to the analysis worker specifically, since it alone may still have queued
//! work when shutdown begins.

mod analysis;
mod ingest;
mod state;
mod tasks;

pub use analysis::run_analysis_worker;
pub use ingest::run_ingest;
pub use state::{AnalysisJob, AnalysisQueue, PipelineState, StartRunParams};
pub use tasks::{run_eviction_sweep, run_live_broadcast, run_processing, run_recorder};

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::acquisition::SampleSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a run is already recording")]
    AlreadyRecording,

    #[error("no run is currently recording")]
    NoActiveRun,

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

/// Identifies which supervised task a `JoinSet` result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    Ingest,
    Processing,
    Recorder,
    LiveBroadcast,
    Eviction,
    Analysis,
}

/// Spawns every pipeline task onto `tasks`, returning immediately. The
/// caller (`main.rs`) owns the `JoinSet` and decides how to react to a task
/// exiting or failing.
pub fn spawn_all(
    tasks: &mut JoinSet<(TaskName, anyhow::Result<()>)>,
    state: Arc<PipelineState>,
    source: Box<dyn SampleSource>,
    cancel: CancellationToken,
) {
    let c = cancel.clone();
    let s = Arc::clone(&state);
    tasks.spawn(async move { (TaskName::Ingest, run_ingest(s, source, c).await) });

    let c = cancel.clone();
    let s = Arc::clone(&state);
    tasks.spawn(async move {
        run_processing(s, c).await;
        (TaskName::Processing, Ok(()))
    });

    let c = cancel.clone();
    let s = Arc::clone(&state);
    tasks.spawn(async move {
        run_recorder(s, c).await;
        (TaskName::Recorder, Ok(()))
    });

    let c = cancel.clone();
    let s = Arc::clone(&state);
    tasks.spawn(async move {
        run_live_broadcast(s, c).await;
        (TaskName::LiveBroadcast, Ok(()))
    });

    let c = cancel.clone();
    let s = Arc::clone(&state);
    tasks.spawn(async move {
        run_eviction_sweep(s, c).await;
        (TaskName::Eviction, Ok(()))
    });

    let s = Arc::clone(&state);
    tasks.spawn(async move {
        run_analysis_worker(s, cancel).await;
        (TaskName::Analysis, Ok(()))
    });
}
