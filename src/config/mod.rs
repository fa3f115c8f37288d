//! Global runtime configuration.
//!
//! ## Loading Order
//!
//! 1. `VIBESENSOR_CONFIG` environment variable (path to TOML file)
//! 2. `config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Loaded once at startup and held for the process lifetime — nothing in
//! this crate re-reads config after `init()`.
//!
//! ```ignore
//! config::init(Config::load());
//! let n = config::get().fft_window_size;
//! ```

pub mod defaults;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Tunables for every component named in the component design (spec §4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_rate_hz: f64,
    pub waveform_seconds: f64,
    pub stale_data_age_s: f64,

    pub fft_window_size: usize,
    pub spectrum_min_hz: f64,
    pub spectrum_max_hz: f64,
    pub peak_bandwidth_hz: f64,
    pub peak_separation_hz: f64,
    pub fft_update_hz: f64,

    pub client_ttl_seconds: u64,
    pub metrics_log_hz: f64,

    pub order_min_coverage_points: usize,
    pub order_min_match_points: usize,
    pub order_tolerance_min_hz: f64,
    pub order_tolerance_rel: f64,
    pub order_constant_speed_min_match_rate: f64,
    pub constant_speed_stddev_kmh: f64,
    pub mems_noise_floor_g: f64,

    pub freq_bin_hz: f64,
    pub transient_burstiness_threshold: f64,
    pub persistent_peak_min_presence: f64,
    pub persistent_peak_max_findings: usize,
    pub baseline_noise_snr_threshold: f64,

    pub ui_push_hz: f64,
    pub shutdown_analysis_timeout_s: u64,

    /// `en` | `nl`.
    pub language: String,
}

impl Default for Config {
    fn default() -> Self {
        use defaults::*;
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            waveform_seconds: WAVEFORM_SECONDS,
            stale_data_age_s: STALE_DATA_AGE_S,

            fft_window_size: FFT_WINDOW_SIZE,
            spectrum_min_hz: SPECTRUM_MIN_HZ,
            spectrum_max_hz: SPECTRUM_MAX_HZ,
            peak_bandwidth_hz: PEAK_BANDWIDTH_HZ,
            peak_separation_hz: PEAK_SEPARATION_HZ,
            fft_update_hz: FFT_UPDATE_HZ,

            client_ttl_seconds: CLIENT_TTL_SECONDS,
            metrics_log_hz: METRICS_LOG_HZ,

            order_min_coverage_points: ORDER_MIN_COVERAGE_POINTS,
            order_min_match_points: ORDER_MIN_MATCH_POINTS,
            order_tolerance_min_hz: ORDER_TOLERANCE_MIN_HZ,
            order_tolerance_rel: ORDER_TOLERANCE_REL,
            order_constant_speed_min_match_rate: ORDER_CONSTANT_SPEED_MIN_MATCH_RATE,
            constant_speed_stddev_kmh: CONSTANT_SPEED_STDDEV_KMH,
            mems_noise_floor_g: MEMS_NOISE_FLOOR_G,

            freq_bin_hz: FREQ_BIN_HZ,
            transient_burstiness_threshold: TRANSIENT_BURSTINESS_THRESHOLD,
            persistent_peak_min_presence: PERSISTENT_PEAK_MIN_PRESENCE,
            persistent_peak_max_findings: PERSISTENT_PEAK_MAX_FINDINGS,
            baseline_noise_snr_threshold: BASELINE_NOISE_SNR_THRESHOLD,

            ui_push_hz: UI_PUSH_HZ,
            shutdown_analysis_timeout_s: SHUTDOWN_ANALYSIS_TIMEOUT_S,

            language: "en".to_string(),
        }
    }
}

impl Config {
    /// Load per the documented order: env var path, `./config.toml`, defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("VIBESENSOR_CONFIG") {
            match Self::load_from_file(std::path::Path::new(&path)) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(%path, error = %e, "failed to load VIBESENSOR_CONFIG, trying defaults"),
            }
        }
        let default_path = std::path::Path::new("config.toml");
        if default_path.exists() {
            match Self::load_from_file(default_path) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(error = %e, "failed to load ./config.toml, using built-in defaults"),
            }
        }
        Self::default()
    }

    fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// Install the global configuration. Intended to be called exactly once at
/// startup; calling it again is logged but not treated as fatal.
pub fn init(config: Config) {
    if CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Fetch the global configuration.
///
/// # Panics
/// Panics if called before [`init`] — this indicates a startup bug, not a
/// recoverable runtime condition.
pub fn get() -> &'static Config {
    CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_fft_window() {
        let cfg = Config::default();
        assert_eq!(cfg.fft_window_size, 2048);
        assert!(cfg.spectrum_max_hz > cfg.spectrum_min_hz);
    }
}
