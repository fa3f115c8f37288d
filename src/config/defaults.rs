//! System-wide default constants.
//!
//! Centralises magic numbers referenced from more than one module. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Ring Buffer Store (C1)
// ============================================================================

/// Default raw sample rate advertised by a sensor (Hz).
pub const SAMPLE_RATE_HZ: f64 = 800.0;

/// Default rolling waveform window kept per sensor (seconds).
pub const WAVEFORM_SECONDS: f64 = 8.0;

/// A sensor with no write in this window is considered stale.
pub const STALE_DATA_AGE_S: f64 = 2.0;

// ============================================================================
// Signal Processor (C2)
// ============================================================================

/// FFT window length in samples.
pub const FFT_WINDOW_SIZE: usize = 2048;

/// Lower bound of the retained spectrum (Hz).
pub const SPECTRUM_MIN_HZ: f64 = 0.0;

/// Upper bound of the retained spectrum (Hz).
pub const SPECTRUM_MAX_HZ: f64 = 200.0;

/// Half-width used when integrating a peak's band-RMS amplitude (Hz).
pub const PEAK_BANDWIDTH_HZ: f64 = 1.2;

/// Minimum separation enforced between distinct reported peaks (Hz), and the
/// exclusion radius around a peak when computing the noise floor.
pub const PEAK_SEPARATION_HZ: f64 = 1.2;

/// Multiplier applied to the 20th-percentile floor to find the local-maxima
/// detection threshold: `max(p20 * PEAK_THRESHOLD_FLOOR_RATIO, p20 + epsilon)`.
pub const PEAK_THRESHOLD_FLOOR_RATIO: f64 = 2.6;

/// Absolute floor below which amplitudes are treated as silence (g).
pub const STRENGTH_EPSILON_MIN_G: f64 = 1e-9;

/// `epsilon = max(STRENGTH_EPSILON_MIN_G, floor * STRENGTH_EPSILON_FLOOR_RATIO)`.
pub const STRENGTH_EPSILON_FLOOR_RATIO: f64 = 0.05;

/// Maximum top-peaks retained per sample.
pub const TOP_PEAKS_MAX: usize = 5;

/// Local maxima excluded from the noise-floor median are capped to the
/// top-N by amplitude; every local maximum still stands as a final-peak
/// candidate afterward.
pub const PEAK_FLOOR_EXCLUSION_MAX: usize = 5;

/// dB value representing silence / no meaningful vibration signal.
pub const SILENCE_DB: f64 = -120.0;

/// Processing tick rate (Hz).
pub const FFT_UPDATE_HZ: f64 = 4.0;

// ============================================================================
// Sensor Registry (C3)
// ============================================================================

/// Entries with no `last_seen` update within this window are evicted.
pub const CLIENT_TTL_SECONDS: u64 = 120;

/// Minimum interval between persisted registry writes unless `force=true`.
pub const REGISTRY_PERSIST_MIN_INTERVAL_S: u64 = 60;

// ============================================================================
// Run Recorder (C4)
// ============================================================================

/// Sample-record materialization rate (Hz).
pub const METRICS_LOG_HZ: f64 = 4.0;

// ============================================================================
// Order Reference Engine / Findings Builder — Orders (C5, C7)
// ============================================================================

/// Minimum candidate samples a hypothesis must have before being scored.
pub const ORDER_MIN_COVERAGE_POINTS: usize = 20;

/// Minimum matched samples a hypothesis must have before being scored.
pub const ORDER_MIN_MATCH_POINTS: usize = 8;

/// Absolute floor on the per-hypothesis match tolerance (Hz).
pub const ORDER_TOLERANCE_MIN_HZ: f64 = 0.6;

/// Relative match tolerance as a fraction of the predicted Hz.
pub const ORDER_TOLERANCE_REL: f64 = 0.08;

/// Minimum effective match rate required at non-constant speed.
pub const ORDER_MIN_MATCH_RATE: f64 = 0.30;

/// Minimum effective match rate required when the run is at constant speed
/// (higher, because chance matches inflate the rate when speed barely moves).
pub const ORDER_CONSTANT_SPEED_MIN_MATCH_RATE: f64 = 0.55;

/// Speed stddev (km/h) below which a run (or speed bin) is "constant speed".
pub const CONSTANT_SPEED_STDDEV_KMH: f64 = 3.0;

/// Default fractional uncertainty inputs (percent) for C5's propagated
/// uncertainty (spec §4.5): vehicle speed reading, tire-diameter spec,
/// final-drive ratio, and current gear ratio. Combined in quadrature into
/// per-order (wheel/drive/engine) fractional uncertainty.
pub const SPEED_UNCERTAINTY_PCT: f64 = 0.6;
pub const TIRE_DIAMETER_UNCERTAINTY_PCT: f64 = 1.2;
pub const FINAL_DRIVE_UNCERTAINTY_PCT: f64 = 0.2;
pub const GEAR_UNCERTAINTY_PCT: f64 = 0.5;

/// Minimum fractional gap (relative to engine Hz) below which drive Hz and
/// engine Hz are fused into a single `driveshaft_engine_1x` hypothesis
/// rather than scored as separate driveshaft/engine 1x hypotheses.
pub const ORDER_FUSION_OVERLAP_MIN: f64 = 0.03;

/// Approximate MEMS accelerometer noise floor (g), used as an SNR reference
/// when a measured per-sample floor is implausibly low.
pub const MEMS_NOISE_FLOOR_G: f64 = 0.0015;

/// Divisor for `log1p(SNR)` normalisation to `[0, 1]` in the confidence formula.
pub const SNR_LOG_DIVISOR: f64 = 2.5;

/// Hard clamp bounds on any non-reference finding's confidence.
pub const CONFIDENCE_FLOOR: f64 = 0.08;
pub const CONFIDENCE_CEILING: f64 = 0.97;

/// Range (percentage points, as a fraction) below which per-location match
/// rates are considered "similar" for diffuse-excitation detection.
pub const DIFFUSE_MATCH_RATE_RANGE_THRESHOLD: f64 = 0.15;

/// Ratio below which per-location mean matched amplitudes are "similar".
pub const DIFFUSE_AMP_RATIO_THRESHOLD: f64 = 2.0;

/// Ratio an engine finding's confidence must exceed (relative to the best
/// wheel finding) to escape alias-suppression demotion.
pub const HARMONIC_ALIAS_RATIO: f64 = 1.15;

/// Multiplier applied to a suppressed engine finding's confidence.
pub const ENGINE_ALIAS_DEMOTION_FACTOR: f64 = 0.60;

/// Minimum confidence an order finding must retain (after alias suppression)
/// to be emitted at all.
pub const ORDER_MIN_CONFIDENCE: f64 = 0.15;

/// Minimum mean per-location match rate below which diffuse-excitation
/// detection is moot (the signal is too weak everywhere to call uniform).
pub const DIFFUSE_MIN_MEAN_RATE: f64 = 0.15;

/// Diffuse-excitation confidence penalty: base factor, per-sensor decrement,
/// and floor.
pub const DIFFUSE_PENALTY_BASE: f64 = 0.85;
pub const DIFFUSE_PENALTY_PER_SENSOR: f64 = 0.04;
pub const DIFFUSE_PENALTY_FLOOR: f64 = 0.65;

/// Confidence scale applied when only one (resp. two) connected locations
/// carry any localization evidence at all.
pub const SINGLE_SENSOR_CONFIDENCE_SCALE: f64 = 0.85;
pub const DUAL_SENSOR_CONFIDENCE_SCALE: f64 = 0.92;

// ============================================================================
// Phase Segmenter (C6)
// ============================================================================

/// Below this smoothed speed, a sample is `IDLE` regardless of derivative.
pub const PHASE_IDLE_SPEED_KMH: f64 = 3.0;

/// Moving-average window (samples) used to smooth the speed signal before
/// computing its derivative.
pub const PHASE_SPEED_SMOOTHING_WINDOW: usize = 5;

/// `|d(speed)/dt|` threshold (km/h per second) above which a sample is
/// acceleration/deceleration rather than cruise.
pub const PHASE_ACCEL_THRESHOLD_KMH_PER_S: f64 = 1.5;

/// Relative deviation of the engine-Hz/wheel-Hz ratio from its segment-start
/// value beyond which a decelerating sample is `COAST_DOWN` (engine no
/// longer tracking wheel speed, e.g. clutch disengaged) rather than plain
/// `DECELERATION` (engine braking, ratio holds steady).
pub const PHASE_COASTDOWN_RATIO_DEVIATION: f64 = 0.15;

/// Non-IDLE sample weight in the amplitude-weighted speed-band estimate.
pub const PHASE_WEIGHT_CRUISE: f64 = 3.0;
pub const PHASE_WEIGHT_TRANSIENT: f64 = 0.3;
pub const PHASE_WEIGHT_DEFAULT: f64 = 1.0;

/// Minimum non-IDLE samples required before falling back to the full sample
/// set for order-finding evidence (spec §4.6).
pub const PHASE_MIN_DIAGNOSTIC_SAMPLES: usize = 5;

/// Max boost to a finding's phase-adjusted ranking score from cruise_fraction.
pub const PHASE_CRUISE_FRACTION_MAX_BOOST: f64 = 0.15;

// ============================================================================
// Findings Builder — Residual Peaks (C8)
// ============================================================================

/// Frequency-bin granularity for residual-peak accumulation (Hz).
pub const FREQ_BIN_HZ: f64 = 2.0;

/// Minimum order-finding confidence required before it "shadows" (excludes)
/// a residual-peak bin within `FREQ_BIN_HZ` of its frequency.
pub const ORDER_SUPPRESS_PERSISTENT_MIN_CONF: f64 = 0.40;

pub const PERSISTENT_PEAK_MIN_PRESENCE: f64 = 0.15;
pub const TRANSIENT_BURSTINESS_THRESHOLD: f64 = 5.0;
pub const PATTERNED_MIN_PRESENCE: f64 = 0.40;
pub const PATTERNED_MAX_BURSTINESS: f64 = 3.0;
pub const BASELINE_NOISE_SNR_THRESHOLD: f64 = 1.5;
pub const BASELINE_NOISE_SPATIAL_UNIFORMITY: f64 = 0.85;
pub const BASELINE_NOISE_PRESENCE: f64 = 0.60;
pub const BASELINE_NOISE_BURSTINESS: f64 = 2.0;

/// Second baseline-noise corner: a peak spread across nearly every location,
/// at a near-constant rate regardless of speed bin, at moderate presence and
/// burstiness — a uniform hum rather than a real fault.
pub const BASELINE_NOISE_SPATIAL_UNIFORMITY_MIN: f64 = 0.80;
pub const BASELINE_NOISE_SPEED_UNIFORMITY_MAX: f64 = 0.10;
pub const BASELINE_NOISE_PRESENCE_MIN: f64 = 0.20;
pub const BASELINE_NOISE_PRESENCE_MAX: f64 = 0.40;
pub const BASELINE_NOISE_BURSTINESS_MIN: f64 = 3.0;
pub const BASELINE_NOISE_BURSTINESS_MAX: f64 = 5.0;

/// At most this many persistent and this many transient findings are kept.
pub const PERSISTENT_PEAK_MAX_FINDINGS: usize = 3;

// ============================================================================
// Localization & Test-Plan Engine (C9)
// ============================================================================

/// A location with fewer samples than this fraction of the best-covered
/// location's count is flagged `sample_coverage_warning`.
pub const SAMPLE_COVERAGE_WARNING_RATIO: f64 = 0.20;

/// Spatial-disagreement trigger: second finding must carry at least this
/// fraction of the top finding's confidence while pointing elsewhere.
pub const SPATIAL_DISAGREEMENT_CONFIDENCE_RATIO: f64 = 0.70;

// ============================================================================
// Summary Assembler (C10)
// ============================================================================

/// Drop-off rule for grouping findings into top causes (percentage points,
/// as a fraction).
pub const TOP_CAUSE_DROPOFF: f64 = 0.15;

/// Maximum number of top causes retained.
pub const TOP_CAUSE_MAX: usize = 3;

/// Minimum non-null speed-sample percentage for the run to be considered
/// speed-sufficient for order analysis and speed breakdown.
pub const SPEED_COVERAGE_MIN_PCT: f64 = 35.0;

/// Minimum absolute count of non-null speed samples, alongside the percentage
/// floor above.
pub const SPEED_MIN_POINTS: usize = 8;

/// Z-score magnitude beyond which a data-quality sample is counted as an
/// outlier.
pub const OUTLIER_ZSCORE_THRESHOLD: f64 = 3.0;

/// Maximum peak-table rows retained in the plot-data bundle.
pub const PEAK_TABLE_MAX_ROWS: usize = 12;

// ============================================================================
// Live Diagnostics Engine (C11)
// ============================================================================

/// UI broadcast tick rate (Hz).
pub const UI_PUSH_HZ: f64 = 10.0;

/// Consecutive below-threshold ticks required before a falling edge is
/// recognised (hysteresis).
pub const LIVE_DECAY_TICKS: u32 = 5;

/// Heartbeat re-emit interval while a bucket stays active (ms).
pub const LIVE_HEARTBEAT_EMIT_MS: u64 = 3_000;

/// Multi-sensor coincidence window (s) and frequency bin (Hz).
pub const LIVE_COINCIDENCE_WINDOW_S: f64 = 0.8;
pub const LIVE_COINCIDENCE_BIN_HZ: f64 = 1.5;

/// Sensitivity bonus applied to combined multi-sensor events (dB).
pub const LIVE_MULTI_SENSOR_BONUS_DB: f64 = 2.0;

/// Frequency band treated as generic road/chassis noise when a peak matches
/// no order hypothesis (Hz).
pub const LIVE_ROAD_BAND_HZ: (f64, f64) = (3.0, 12.0);

/// How many of a tick's strongest peaks are classified per sensor.
pub const LIVE_PEAKS_PER_TICK: usize = 4;

// ============================================================================
// Concurrency & Recovery
// ============================================================================

/// Consecutive processing-tick failures before `processing_state` flips to
/// `fatal` and the tick loop backs off.
pub const FATAL_PROCESSING_TICK_FAILURES: u32 = 25;

/// Backoff duration after `FATAL_PROCESSING_TICK_FAILURES` is hit (s).
pub const FATAL_PROCESSING_BACKOFF_S: u64 = 30;

/// Post-analysis worker queue capacity; the oldest entry is evicted on overflow.
pub const ANALYSIS_QUEUE_CAPACITY: usize = 100;

/// How long graceful shutdown waits for the analysis queue to drain (s).
pub const SHUTDOWN_ANALYSIS_TIMEOUT_S: u64 = 30;

/// Worker-pool size for parallel per-sensor FFTs.
pub const FFT_WORKER_THREADS: usize = 4;
