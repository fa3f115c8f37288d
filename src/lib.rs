//! VibeSensor: vehicle NVH/vibration diagnostic appliance.
//!
//! Ingests tri-axial accelerometer waveforms from one or more body-mounted
//! sensors, extracts per-tick strength/spectral metrics, and correlates
//! vibration against the vehicle's rotating orders (wheel, driveshaft,
//! engine) to localize and explain NVH complaints. See `SPEC_FULL.md` for
//! the full component breakdown.

pub mod config;
pub mod error;
pub mod types;

pub mod buffer;
pub mod findings;
pub mod localization;
pub mod live;
pub mod orders;
pub mod phase;
pub mod processing;
pub mod registry;
pub mod storage;
pub mod summary;

pub mod acquisition;
pub mod api;
pub mod pipeline;

pub use error::{AnalysisError, ProcessingHealth};
pub use types::{ProcessedSample, RunMetadata, RunStatus, SampleFrame, SensorId};
