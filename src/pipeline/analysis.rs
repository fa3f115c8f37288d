//! Post-analysis worker (spec §5): consumes stopped runs off the bounded
//! queue and runs them through phase segmentation (C6), the order and
//! residual-peak findings builders (C7/C8), and the summary assembler
//! (C10), then persists the result.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::defaults::{CONSTANT_SPEED_STDDEV_KMH, SPEED_COVERAGE_MIN_PCT, SPEED_MIN_POINTS};
use crate::findings::orders::{build_order_findings, OrderFindingsInput};
use crate::findings::peaks::build_residual_peak_findings;
use crate::phase::{classify_phases, diagnostic_mask, segment_phases};
use crate::summary::{build_run_summary, effective_tire_circumference_m, has_engine_reference};
use crate::types::RunStatus;

use super::state::{AnalysisJob, PipelineState};

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

fn process_job(state: &PipelineState, job: AnalysisJob) {
    let AnalysisJob { mut metadata, mut samples, connected_locations } = job;
    samples.sort_by(|a, b| a.t_s.total_cmp(&b.t_s));

    let labels = classify_phases(&samples);
    for (sample, label) in samples.iter_mut().zip(labels.iter()) {
        sample.phase = *label;
    }
    let phase_segments = segment_phases(&samples, &labels);
    let diagnostic_indices = diagnostic_mask(&labels);

    let speed_values: Vec<f64> = samples.iter().filter_map(|s| s.speed_kmh).filter(|v| *v > 0.0).collect();
    let speed_non_null_pct = if samples.is_empty() {
        0.0
    } else {
        samples.iter().filter(|s| s.speed_kmh.is_some()).count() as f64 / samples.len() as f64 * 100.0
    };
    let (_, speed_stddev) = mean_stddev(&speed_values);
    let steady_speed = speed_stddev < CONSTANT_SPEED_STDDEV_KMH;
    let speed_sufficient = speed_non_null_pct >= SPEED_COVERAGE_MIN_PCT && speed_values.len() >= SPEED_MIN_POINTS;
    let engine_ref_sufficient = has_engine_reference(&metadata, &samples);
    let tire_circumference_m = effective_tire_circumference_m(&metadata);

    let order_input = OrderFindingsInput {
        metadata: &metadata,
        samples: &samples,
        diagnostic_indices: &diagnostic_indices,
        phases: &labels,
        tire_circumference_m,
        speed_sufficient,
        steady_speed,
        speed_stddev_kmh: (!speed_values.is_empty()).then_some(speed_stddev),
        engine_ref_sufficient,
        connected_locations: connected_locations.clone(),
    };
    let order_findings = build_order_findings(&order_input);
    let peak_findings = build_residual_peak_findings(&samples, &diagnostic_indices, &order_findings, &connected_locations);

    let mut findings = order_findings;
    findings.extend(peak_findings);

    let summary = build_run_summary(&metadata, &samples, &phase_segments, findings, speed_non_null_pct);

    match state.history.save_run_summary(&summary) {
        Ok(()) => {
            metadata.status = RunStatus::Complete;
        }
        Err(e) => {
            error!(run_id = %metadata.run_id, error = %e, "failed to persist run summary");
            metadata.status = RunStatus::Error;
            metadata.error_message = Some(e.to_string());
        }
    }
    if let Err(e) = state.history.save_run_metadata(&metadata) {
        error!(run_id = %metadata.run_id, error = %e, "failed to persist final run status");
    }
    info!(run_id = %metadata.run_id, rows = summary.rows, findings = summary.findings.len(), "run analysis complete");
}

/// Drains the analysis queue until cancelled *and* empty — a cancellation
/// mid-drain lets the current and already-queued jobs finish so a run never
/// gets stuck in `analyzing` on shutdown (the caller bounds total wait time
/// with `shutdown_analysis_timeout_s`, see `main.rs`).
pub async fn run_analysis_worker(state: Arc<PipelineState>, cancel: CancellationToken) {
    loop {
        match state.analysis_queue.pop() {
            Some(job) => process_job(&state, job),
            None => {
                if cancel.is_cancelled() {
                    info!("[Analysis] queue drained, shutting down");
                    return;
                }
                tokio::select! {
                    _ = state.analysis_queue.notified() => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }
}
