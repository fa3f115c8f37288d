//! Signal Processor (C2).
//!
//! For each sensor, each tick: pull an FFT window from the ring buffer
//! store, window + transform each axis, combine into a single spectrum,
//! and extract the strength metrics the rest of the pipeline consumes
//! (spec §4.2).

mod fft;
pub mod strength;
pub mod strength_bands;

pub use fft::FftProcessor;
pub use strength::{SensorMetrics, StrengthMetrics};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Axes;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),
}

/// One axis's single-sided amplitude spectrum, clipped to
/// `[spectrum_min_hz, spectrum_max_hz]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencySpectrum {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub rms: f64,
    pub peak_frequency: f64,
    pub sample_rate: f64,
}

/// Process one sensor's latest window for one tick: windowed FFT per axis,
/// combined spectrum, and full strength-metric extraction.
///
/// Returns `None` if fewer than `fft_window_size` samples are available yet
/// (spec §4.2 step 1: "if fewer than FFT_N samples exist, skip").
pub fn process_tick(
    processor: &FftProcessor,
    window: &[Axes],
) -> Result<Option<SensorMetrics>, ProcessingError> {
    if window.len() < processor.size() {
        return Ok(None);
    }
    let xs: Vec<f64> = window.iter().map(|a| a.x as f64).collect();
    let ys: Vec<f64> = window.iter().map(|a| a.y as f64).collect();
    let zs: Vec<f64> = window.iter().map(|a| a.z as f64).collect();

    let cfg = crate::config::get();
    let spec_x = processor.compute(&xs, cfg.spectrum_min_hz, cfg.spectrum_max_hz)?;
    let spec_y = processor.compute(&ys, cfg.spectrum_min_hz, cfg.spectrum_max_hz)?;
    let spec_z = processor.compute(&zs, cfg.spectrum_min_hz, cfg.spectrum_max_hz)?;

    Ok(Some(strength::compute_sensor_metrics(&spec_x, &spec_y, &spec_z)))
}
