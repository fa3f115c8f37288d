//! Core data model shared across every component: sensor identity, sample
//! frames, processed sample records, run metadata, and the i18n reference
//! representation used throughout the findings builders.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 6-byte hardware address, rendered canonically as 12 lowercase hex chars.
/// Uniquely identifies a physical sensor across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId(pub [u8; 6]);

impl SensorId {
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 12 {
            return None;
        }
        let mut bytes = [0u8; 6];
        for i in 0..6 {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// One tri-axial reading, in g.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Raw sample frame as delivered from the (out-of-scope) UDP ingest layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFrame {
    pub sensor_id: SensorId,
    /// 32-bit wrap-around counter; gaps imply dropped frames.
    pub seq: u32,
    pub t0_us: u64,
    pub samples: Vec<Axes>,
}

/// Vehicle-side telemetry (speed, engine RPM) delivered out-of-band from the
/// IMU sample stream — typically an OBD-II bridge rather than the
/// accelerometer itself. Either field may be absent for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
    pub speed_kmh: Option<f64>,
    pub engine_rpm: Option<f64>,
}

/// Driving phase label (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Idle,
    Acceleration,
    Cruise,
    Deceleration,
    CoastDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "IDLE",
            Phase::Acceleration => "ACCELERATION",
            Phase::Cruise => "CRUISE",
            Phase::Deceleration => "DECELERATION",
            Phase::CoastDown => "COAST_DOWN",
        };
        f.write_str(s)
    }
}

/// A single non-DC spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub hz: f64,
    pub amp: f64,
}

/// Strength band key assigned by the band table (spec §6). `None` means
/// below `l1` (the implicit L0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthBucket {
    L1,
    L2,
    L3,
    L4,
    L5,
}

impl StrengthBucket {
    pub fn as_key(self) -> &'static str {
        match self {
            StrengthBucket::L1 => "l1",
            StrengthBucket::L2 => "l2",
            StrengthBucket::L3 => "l3",
            StrengthBucket::L4 => "l4",
            StrengthBucket::L5 => "l5",
        }
    }
}

/// The unit persisted and analyzed: one materialization of a sensor's
/// current state at the recorder's cadence (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub run_id: String,
    pub record_type: &'static str,
    pub timestamp_utc: DateTime<Utc>,

    /// Monotonic seconds since run start.
    pub t_s: f64,
    pub speed_kmh: Option<f64>,
    pub accel_x_g: f64,
    pub accel_y_g: f64,
    pub accel_z_g: f64,

    pub vibration_strength_db: f64,
    pub strength_floor_amp_g: f64,
    pub strength_bucket: Option<StrengthBucket>,
    pub top_peaks: Vec<Peak>,

    pub client_id: String,
    pub client_name: String,
    pub sample_rate_hz: f64,

    pub dominant_freq_hz: Option<f64>,
    pub frames_dropped: u64,
    pub queue_overflow: u64,

    pub final_drive_ratio: Option<f64>,
    pub current_gear_ratio: Option<f64>,
    pub engine_rpm: Option<f64>,

    pub phase: Option<Phase>,
}

impl ProcessedSample {
    pub fn new(run_id: impl Into<String>, t_s: f64, client_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            record_type: "sample",
            timestamp_utc: Utc::now(),
            t_s,
            speed_kmh: None,
            accel_x_g: 0.0,
            accel_y_g: 0.0,
            accel_z_g: 0.0,
            vibration_strength_db: crate::config::defaults::SILENCE_DB,
            strength_floor_amp_g: 0.0,
            strength_bucket: None,
            top_peaks: Vec::new(),
            client_id: client_id.into(),
            client_name: client_name.into(),
            sample_rate_hz: crate::config::defaults::SAMPLE_RATE_HZ,
            dominant_freq_hz: None,
            frames_dropped: 0,
            queue_overflow: 0,
            final_drive_ratio: None,
            current_gear_ratio: None,
            engine_rpm: None,
            phase: None,
        }
    }
}

/// Tire geometry sufficient to derive `tire_circumference_m` (spec §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TireSpec {
    pub width_mm: f64,
    pub aspect_pct: f64,
    pub rim_in: f64,
}

impl TireSpec {
    pub fn circumference_m(&self) -> f64 {
        let diameter_mm = self.width_mm * (self.aspect_pct / 100.0) * 2.0 + self.rim_in * 25.4;
        diameter_mm * std::f64::consts::PI / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Recording,
    Analyzing,
    Complete,
    Error,
}

/// Run metadata (spec §3), one per recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub record_type: &'static str,
    pub status: RunStatus,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: Option<DateTime<Utc>>,
    pub sensor_model: String,
    pub raw_sample_rate_hz: f64,
    pub fft_window_size: usize,
    pub fft_window_type: String,
    pub peak_picker_method: String,
    pub accel_scale_g_per_lsb: f64,
    pub tire: Option<TireSpec>,
    pub tire_circumference_m: Option<f64>,
    pub final_drive_ratio: Option<f64>,
    pub current_gear_ratio: Option<f64>,

    /// Fractional uncertainty inputs (percent) feeding C5's propagated
    /// uncertainty (spec §4.5); `None` falls back to the vehicle-spec
    /// defaults in `config::defaults`.
    pub speed_uncertainty_pct: Option<f64>,
    pub tire_diameter_uncertainty_pct: Option<f64>,
    pub final_drive_uncertainty_pct: Option<f64>,
    pub gear_uncertainty_pct: Option<f64>,

    pub language: String,
    pub error_message: Option<String>,
}

impl RunMetadata {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            record_type: "run_metadata",
            status: RunStatus::Recording,
            start_time_utc: Utc::now(),
            end_time_utc: None,
            sensor_model: "vibesensor-mems-v1".to_string(),
            raw_sample_rate_hz: crate::config::defaults::SAMPLE_RATE_HZ,
            fft_window_size: crate::config::defaults::FFT_WINDOW_SIZE,
            fft_window_type: "hann".to_string(),
            peak_picker_method: "local_maxima_p20x2.6".to_string(),
            accel_scale_g_per_lsb: 1.0,
            tire: None,
            tire_circumference_m: None,
            final_drive_ratio: None,
            current_gear_ratio: None,
            speed_uncertainty_pct: None,
            tire_diameter_uncertainty_pct: None,
            final_drive_uncertainty_pct: None,
            gear_uncertainty_pct: None,
            language: "en".to_string(),
            error_message: None,
        }
    }
}

/// A language-neutral i18n reference: `{_i18n_key, ...params}`. Resolved
/// only by the (out-of-scope) render layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct I18nRef {
    #[serde(rename = "_i18n_key")]
    pub key: String,
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl I18nRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(param.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_id_round_trips_through_hex() {
        let id = SensorId::from_hex("aabbccddeeff").unwrap();
        assert_eq!(id.to_string(), "aabbccddeeff");
    }

    #[test]
    fn sensor_id_rejects_wrong_length() {
        assert!(SensorId::from_hex("aabb").is_none());
    }

    #[test]
    fn tire_circumference_matches_formula() {
        let tire = TireSpec { width_mm: 225.0, aspect_pct: 45.0, rim_in: 17.0 };
        let diameter_mm = 225.0 * 0.45 * 2.0 + 17.0 * 25.4;
        let expected = diameter_mm * std::f64::consts::PI / 1000.0;
        assert!((tire.circumference_m() - expected).abs() < 1e-9);
    }

    #[test]
    fn i18n_ref_serializes_flattened_params() {
        let r = I18nRef::new("SPEED_HINT_FOCUS").with("speed_band", "90-100");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["_i18n_key"], "SPEED_HINT_FOCUS");
        assert_eq!(v["speed_band"], "90-100");
    }
}
