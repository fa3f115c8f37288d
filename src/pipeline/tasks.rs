//! The three fixed-cadence tasks of the mixed concurrency model (spec §5):
//! processing at `fft_update_hz`, recording at `metrics_log_hz`, and the
//! live-diagnostics broadcast at `ui_push_hz`. Each is a thin `interval`
//! loop around a [`PipelineState`] method — the actual work is synchronous
//! and lock-based, so there is nothing to `.await` inside the tick itself.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::PipelineState;

fn period_for(hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(0.01))
}

async fn run_ticking<F>(label: &'static str, period: Duration, cancel: CancellationToken, mut tick: F)
where
    F: FnMut(),
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[{label}] shutdown signal received");
                return;
            }
            _ = interval.tick() => {
                tick();
            }
        }
    }
}

pub async fn run_processing(state: Arc<PipelineState>, cancel: CancellationToken) {
    let period = period_for(crate::config::get().fft_update_hz);
    run_ticking("Processing", period, cancel, move || state.run_processing_tick()).await;
}

pub async fn run_recorder(state: Arc<PipelineState>, cancel: CancellationToken) {
    let period = period_for(crate::config::get().metrics_log_hz);
    run_ticking("Recorder", period, cancel, move || state.run_recorder_tick()).await;
}

pub async fn run_live_broadcast(state: Arc<PipelineState>, cancel: CancellationToken) {
    let period = period_for(crate::config::get().ui_push_hz);
    run_ticking("LiveBroadcast", period, cancel, move || state.run_live_tick()).await;
}

/// Sweeps stale sensors out of the registry/ring buffer once per
/// `CLIENT_TTL_SECONDS` window.
pub async fn run_eviction_sweep(state: Arc<PipelineState>, cancel: CancellationToken) {
    let period = Duration::from_secs(crate::config::defaults::CLIENT_TTL_SECONDS / 2 + 1);
    run_ticking("Eviction", period, cancel, move || state.evict_stale_sensors()).await;
}
