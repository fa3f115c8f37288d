//! Sensor data acquisition.
//!
//! The wire protocol a sensor speaks to reach this process (UDP
//! `MSG_HELLO`/`MSG_DATA`/`MSG_ACK`, see spec §6) is out of scope for this
//! crate — acquisition here starts one step later, at the parsed
//! [`crate::types::SampleFrame`] a wire listener would hand off. The only
//! source implemented is a newline-delimited JSON stream (stdin or a
//! forwarded UDP-to-JSON bridge), which is what the simulation harness in
//! `src/bin/simulation.rs` speaks. Vehicle telemetry (speed, engine RPM)
//! rides the same stream as a second event variant since it comes from a
//! separate OBD-II bridge on real hardware, not the accelerometer.

mod stdin_source;

pub use stdin_source::StdinFrameSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{SampleFrame, VehicleTelemetry};

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("source closed")]
    Closed,

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of the ingest stream: either an IMU sample frame or a vehicle
/// telemetry update. Externally tagged (`{"frame": {...}}` / `{"telemetry":
/// {...}}`) so the simulation harness can emit either without a shared
/// envelope type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
    Frame(SampleFrame),
    Telemetry(VehicleTelemetry),
}

/// A source of parsed ingest events, one sensor (or many, multiplexed by
/// `SampleFrame::sensor_id`) at a time.
#[async_trait]
pub trait SampleSource: Send {
    /// Next event, or `None` on clean end-of-stream (spec §6: the ingest
    /// task treats this the same as a connection drop — it logs and keeps
    /// the sensor's last-seen state until TTL eviction, it does not abort
    /// the run).
    async fn next_event(&mut self) -> Result<Option<IngestEvent>, AcquisitionError>;
}
