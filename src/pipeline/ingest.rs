//! Ingest task (spec §5): drains a [`SampleSource`], writing IMU blocks into
//! the ring buffer store and vehicle telemetry into shared state. Runs at
//! the source's own pace — there is no fixed tick rate here, unlike the
//! processing/recorder/broadcast tasks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquisition::{AcquisitionError, IngestEvent, SampleSource};

use super::state::PipelineState;

pub async fn run_ingest(
    state: Arc<PipelineState>,
    mut source: Box<dyn SampleSource>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Ingest] shutdown signal received");
                return Ok(());
            }
            event = source.next_event() => event,
        };

        match event {
            Ok(Some(IngestEvent::Frame(frame))) => {
                state.registry.observe(frame.sensor_id, crate::config::get().sample_rate_hz);
                if let Err(e) = state.buffer.ingest(frame.sensor_id, &frame.samples) {
                    warn!(sensor = %frame.sensor_id, error = %e, "dropped malformed sample block");
                }
            }
            Ok(Some(IngestEvent::Telemetry(telemetry))) => {
                state.set_vehicle_telemetry(telemetry);
            }
            Ok(None) => {
                info!("[Ingest] source reached clean end-of-stream");
                return Ok(());
            }
            Err(AcquisitionError::Malformed(msg)) => {
                warn!(error = %msg, "malformed ingest event, skipping");
            }
            Err(e @ (AcquisitionError::Closed | AcquisitionError::Io(_))) => {
                return Err(anyhow::anyhow!("ingest source failed: {e}"));
            }
        }
    }
}
