//! Live Diagnostics Engine (C11, spec §4.11).
//!
//! Runs on the broadcast tick (`ui_push_hz`). Per (sensor, class_key) and per
//! (combined-sensor-group, class_key), maintains a hysteresis-gated strength
//! bucket: rising edges register the instant the band is crossed; falling
//! edges require `LIVE_DECAY_TICKS` consecutive below-threshold ticks before
//! the bucket actually drops. Emits an event on every rising edge and on a
//! heartbeat cadence while a bucket stays active, and accumulates dwell time
//! into a source×severity matrix.
//!
//! Peak-to-source classification reuses the six order hypotheses from C5
//! directly (`wheel_1x/2x`, `driveshaft_1x/2x`, `engine_1x/2x`) rather than
//! the narrower six-key taxonomy some retrieved sources use — this keeps one
//! order model across C5/C7/C11 instead of two disjoint ones.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::config::defaults::{
    LIVE_COINCIDENCE_BIN_HZ, LIVE_COINCIDENCE_WINDOW_S, LIVE_DECAY_TICKS, LIVE_HEARTBEAT_EMIT_MS,
    LIVE_MULTI_SENSOR_BONUS_DB, LIVE_PEAKS_PER_TICK, LIVE_ROAD_BAND_HZ, ORDER_TOLERANCE_MIN_HZ, ORDER_TOLERANCE_REL,
    SILENCE_DB,
};
use crate::orders::order_hypotheses;
use crate::processing::strength::strength_db;
use crate::processing::strength_bands::bucket_for;
use crate::types::{ProcessedSample, RunMetadata, StrengthBucket};

/// Which mechanical source (or lack thereof) a peak's frequency was
/// classified against this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKey {
    Wheel1,
    Wheel2,
    Driveshaft1,
    Driveshaft2,
    Engine1,
    Engine2,
    Road,
    Other,
}

impl ClassKey {
    fn from_hypothesis_key(key: &str) -> Self {
        match key {
            "wheel_1x" => ClassKey::Wheel1,
            "wheel_2x" => ClassKey::Wheel2,
            "driveshaft_1x" => ClassKey::Driveshaft1,
            "driveshaft_2x" => ClassKey::Driveshaft2,
            "engine_1x" => ClassKey::Engine1,
            "engine_2x" => ClassKey::Engine2,
            _ => ClassKey::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassKey::Wheel1 => "wheel1",
            ClassKey::Wheel2 => "wheel2",
            ClassKey::Driveshaft1 => "driveshaft1",
            ClassKey::Driveshaft2 => "driveshaft2",
            ClassKey::Engine1 => "eng1",
            ClassKey::Engine2 => "eng2",
            ClassKey::Road => "road",
            ClassKey::Other => "other",
        }
    }

    /// The source×severity matrix column(s) this class feeds. A single class
    /// never maps to more than one source here (unlike some retrieved Python
    /// variants that fold a driveshaft/engine overlap into one key).
    pub fn source_keys(self) -> &'static [&'static str] {
        match self {
            ClassKey::Wheel1 | ClassKey::Wheel2 => &["wheel"],
            ClassKey::Driveshaft1 | ClassKey::Driveshaft2 => &["driveshaft"],
            ClassKey::Engine1 | ClassKey::Engine2 => &["engine"],
            ClassKey::Road | ClassKey::Other => &["other"],
        }
    }
}

pub const SOURCE_KEYS: [&str; 4] = ["engine", "driveshaft", "wheel", "other"];

fn bucket_rank(b: Option<StrengthBucket>) -> u8 {
    match b {
        None => 0,
        Some(StrengthBucket::L1) => 1,
        Some(StrengthBucket::L2) => 2,
        Some(StrengthBucket::L3) => 3,
        Some(StrengthBucket::L4) => 4,
        Some(StrengthBucket::L5) => 5,
    }
}

/// Classify one peak frequency against the six order hypotheses (closest
/// match within tolerance wins), falling back to a generic road band and
/// then to "other". Mirrors `findings/orders.rs`'s own match tolerance
/// (`ORDER_TOLERANCE_MIN_HZ`/`ORDER_TOLERANCE_REL` scaled by path
/// compliance) rather than reinventing a separate uncertainty model.
fn classify_peak_hz(peak_hz: f64, sample: &ProcessedSample, metadata: &RunMetadata, tire_circumference_m: Option<f64>) -> ClassKey {
    let mut best: Option<(ClassKey, f64)> = None;
    for hyp in order_hypotheses() {
        let (predicted, _source) = hyp.predicted_hz(sample, metadata, tire_circumference_m);
        let Some(predicted) = predicted else { continue };
        if predicted <= 0.2 {
            continue;
        }
        let compliance_scale = hyp.path_compliance.sqrt();
        let tolerance_hz = ORDER_TOLERANCE_MIN_HZ.max(predicted * ORDER_TOLERANCE_REL * compliance_scale);
        let delta_hz = (peak_hz - predicted).abs();
        if delta_hz > tolerance_hz {
            continue;
        }
        let rel_err = delta_hz / predicted.max(1e-9);
        if best.as_ref().map(|(_, e)| rel_err < *e).unwrap_or(true) {
            best = Some((ClassKey::from_hypothesis_key(hyp.key), rel_err));
        }
    }
    if let Some((class_key, _)) = best {
        return class_key;
    }
    let (lo, hi) = LIVE_ROAD_BAND_HZ;
    if peak_hz >= lo && peak_hz <= hi {
        return ClassKey::Road;
    }
    ClassKey::Other
}

#[derive(Debug, Clone)]
struct TrackerState {
    current_bucket: Option<StrengthBucket>,
    below_threshold_ticks: u32,
    last_strength_db: f64,
    last_band_rms_g: f64,
    last_update_ms: i64,
    last_peak_hz: f64,
    last_class_key: ClassKey,
    last_sensor_label: String,
    last_emitted_ms: i64,
}

impl TrackerState {
    fn new(class_key: ClassKey) -> Self {
        Self {
            current_bucket: None,
            below_threshold_ticks: 0,
            last_strength_db: SILENCE_DB,
            last_band_rms_g: 0.0,
            last_update_ms: 0,
            last_peak_hz: 0.0,
            last_class_key: class_key,
            last_sensor_label: String::new(),
            last_emitted_ms: 0,
        }
    }
}

/// Applies the rising/falling-edge hysteresis rule to `tracker` given this
/// tick's instantaneous bucket, returning the bucket the tracker held
/// *before* this update (for transition/emission decisions downstream).
fn apply_hysteresis(tracker: &mut TrackerState, instantaneous: Option<StrengthBucket>, instantaneous_db: f64) -> Option<StrengthBucket> {
    let previous = tracker.current_bucket;
    let prev_rank = bucket_rank(previous);
    let inst_rank = bucket_rank(instantaneous);
    if inst_rank > prev_rank {
        tracker.current_bucket = instantaneous;
        tracker.below_threshold_ticks = 0;
    } else if inst_rank == prev_rank {
        tracker.below_threshold_ticks = 0;
    } else {
        tracker.below_threshold_ticks += 1;
        if tracker.below_threshold_ticks >= LIVE_DECAY_TICKS {
            tracker.current_bucket = instantaneous;
            tracker.below_threshold_ticks = 0;
        }
    }
    tracker.last_strength_db = instantaneous_db;
    previous
}

fn transition_bucket(previous: Option<StrengthBucket>, current: Option<StrengthBucket>) -> Option<StrengthBucket> {
    let current = current?;
    match previous {
        None => Some(current),
        Some(p) if bucket_rank(Some(current)) > bucket_rank(Some(p)) => Some(current),
        _ => None,
    }
}

fn should_emit(tracker: &TrackerState, previous: Option<StrengthBucket>, now_ms: i64) -> bool {
    if tracker.current_bucket.is_none() {
        return false;
    }
    let prev_rank = bucket_rank(previous);
    let cur_rank = bucket_rank(tracker.current_bucket);
    if previous.is_none() || cur_rank > prev_rank {
        return true;
    }
    now_ms - tracker.last_emitted_ms >= LIVE_HEARTBEAT_EMIT_MS as i64
}

fn bump_matrix(matrix: &mut BTreeMap<&'static str, BTreeMap<&'static str, MatrixCell>>, source_key: &'static str, bucket: StrengthBucket, contributor: &str) {
    let cell = matrix.entry(source_key).or_default().entry(bucket.as_key()).or_default();
    cell.count += 1;
    *cell.contributors.entry(contributor.to_string()).or_insert(0) += 1;
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count().max(1) as f64;
    values.sum::<f64>() / n
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatrixCell {
    pub count: u64,
    pub seconds: f64,
    pub contributors: BTreeMap<String, u64>,
}

pub type SeverityMatrix = BTreeMap<&'static str, BTreeMap<&'static str, MatrixCell>>;

#[derive(Debug, Clone, Serialize)]
pub struct ActiveLevel {
    pub bucket_key: &'static str,
    pub strength_db: f64,
    pub sensor_label: String,
    pub class_key: &'static str,
    pub peak_hz: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveEvent {
    /// `"single"` or `"multi"`.
    pub kind: &'static str,
    pub class_key: &'static str,
    pub sensor_count: usize,
    pub sensor_id: Option<String>,
    pub sensor_label: String,
    pub sensor_labels: Vec<String>,
    pub peak_hz: f64,
    pub peak_amp: f64,
    pub severity_key: &'static str,
    pub vibration_strength_db: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub matrix: SeverityMatrix,
    pub events: Vec<LiveEvent>,
    pub levels_by_source: BTreeMap<&'static str, ActiveLevel>,
    pub levels_by_sensor: BTreeMap<String, ActiveLevel>,
}

fn new_matrix() -> SeverityMatrix {
    let mut m = SeverityMatrix::new();
    for source in SOURCE_KEYS {
        let mut cols = BTreeMap::new();
        for severity in ["l1", "l2", "l3", "l4", "l5"] {
            cols.insert(severity, MatrixCell::default());
        }
        m.insert(source, cols);
    }
    m
}

fn upsert_active(
    active_by_source: &mut BTreeMap<&'static str, ActiveLevel>,
    source_key: &'static str,
    bucket: StrengthBucket,
    strength_db: f64,
    sensor_label: &str,
    class_key: ClassKey,
    peak_hz: f64,
) {
    let better = active_by_source.get(source_key).map(|existing| strength_db > existing.strength_db).unwrap_or(true);
    if better {
        active_by_source.insert(
            source_key,
            ActiveLevel { bucket_key: bucket.as_key(), strength_db, sensor_label: sensor_label.to_string(), class_key: class_key.as_str(), peak_hz },
        );
    }
}

/// Hysteresis/heartbeat state machine described in spec §4.11, fed once per
/// broadcast tick with every connected sensor's latest processed sample.
#[derive(Debug, Clone)]
pub struct LiveDiagnosticsEngine {
    matrix: SeverityMatrix,
    sensor_trackers: HashMap<String, TrackerState>,
    combined_trackers: HashMap<String, TrackerState>,
    active_by_source: BTreeMap<&'static str, ActiveLevel>,
    active_by_sensor: BTreeMap<String, ActiveLevel>,
    last_update_ms: Option<i64>,
}

impl Default for LiveDiagnosticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveDiagnosticsEngine {
    pub fn new() -> Self {
        Self {
            matrix: new_matrix(),
            sensor_trackers: HashMap::new(),
            combined_trackers: HashMap::new(),
            active_by_source: BTreeMap::new(),
            active_by_sensor: BTreeMap::new(),
            last_update_ms: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn accumulate_matrix_seconds(&mut self, dt_s: f64) {
        if dt_s <= 0.0 {
            return;
        }
        for (source_key, level) in &self.active_by_source {
            if let Some(cell) = self.matrix.get_mut(source_key).and_then(|cols| cols.get_mut(level.bucket_key)) {
                cell.seconds += dt_s;
            }
        }
    }

    /// One broadcast tick: `now_s` is the run's monotonic clock (sample
    /// `t_s`), `samples` is each connected sensor's latest processed sample.
    pub fn update(&mut self, now_s: f64, samples: &[ProcessedSample], metadata: &RunMetadata, tire_circumference_m: Option<f64>) -> LiveSnapshot {
        let now_ms = (now_s * 1000.0).round() as i64;
        let dt_s = self.last_update_ms.map(|prev| ((now_ms - prev) as f64 / 1000.0).clamp(0.0, 1.0)).unwrap_or(0.0);
        self.last_update_ms = Some(now_ms);
        self.accumulate_matrix_seconds(dt_s);

        let mut events = Vec::new();
        let mut active_by_source: BTreeMap<&'static str, ActiveLevel> = BTreeMap::new();
        let mut active_by_sensor: BTreeMap<String, ActiveLevel> = BTreeMap::new();

        struct Classified {
            sensor_id: String,
            sensor_label: String,
            peak_hz: f64,
            peak_amp: f64,
            db: f64,
            class_key: ClassKey,
        }

        let mut latest_by_tracker: HashMap<String, Classified> = HashMap::new();
        for sample in samples {
            for peak in sample.top_peaks.iter().take(LIVE_PEAKS_PER_TICK) {
                let class_key = classify_peak_hz(peak.hz, sample, metadata, tire_circumference_m);
                let (db, _eps) = strength_db(peak.amp, sample.strength_floor_amp_g.max(0.0));
                let tracker_key = format!("{}:{}", sample.client_id, class_key.as_str());
                let replace = latest_by_tracker.get(&tracker_key).map(|existing| db > existing.db).unwrap_or(true);
                if replace {
                    latest_by_tracker.insert(
                        tracker_key,
                        Classified { sensor_id: sample.client_id.clone(), sensor_label: sample.client_name.clone(), peak_hz: peak.hz, peak_amp: peak.amp, db, class_key },
                    );
                }
            }
        }

        let seen_tracker_keys: HashSet<String> = latest_by_tracker.keys().cloned().collect();
        for (tracker_key, ev) in &latest_by_tracker {
            let tracker = self.sensor_trackers.entry(tracker_key.clone()).or_insert_with(|| TrackerState::new(ev.class_key));
            let instantaneous = if ev.peak_amp <= 0.0 { None } else { bucket_for(ev.db, ev.peak_amp) };
            let previous = apply_hysteresis(tracker, instantaneous, ev.db);
            tracker.last_band_rms_g = ev.peak_amp;
            tracker.last_update_ms = now_ms;
            tracker.last_peak_hz = ev.peak_hz;
            tracker.last_class_key = ev.class_key;
            tracker.last_sensor_label = ev.sensor_label.clone();

            if let Some(current) = tracker.current_bucket {
                for &src in ev.class_key.source_keys() {
                    upsert_active(&mut active_by_source, src, current, tracker.last_strength_db, &ev.sensor_label, ev.class_key, ev.peak_hz);
                }
                let better = active_by_sensor.get(&ev.sensor_id).map(|e| tracker.last_strength_db > e.strength_db).unwrap_or(true);
                if better {
                    active_by_sensor.insert(
                        ev.sensor_id.clone(),
                        ActiveLevel { bucket_key: current.as_key(), strength_db: tracker.last_strength_db, sensor_label: ev.sensor_label.clone(), class_key: ev.class_key.as_str(), peak_hz: ev.peak_hz },
                    );
                }
            }

            if let Some(trans) = transition_bucket(previous, tracker.current_bucket) {
                for &src in ev.class_key.source_keys() {
                    bump_matrix(&mut self.matrix, src, trans, &ev.sensor_label);
                }
            }

            if should_emit(tracker, previous, now_ms) {
                tracker.last_emitted_ms = now_ms;
                events.push(LiveEvent {
                    kind: "single",
                    class_key: ev.class_key.as_str(),
                    sensor_count: 1,
                    sensor_id: Some(ev.sensor_id.clone()),
                    sensor_label: ev.sensor_label.clone(),
                    sensor_labels: vec![ev.sensor_label.clone()],
                    peak_hz: ev.peak_hz,
                    peak_amp: ev.peak_amp,
                    severity_key: tracker.current_bucket.expect("should_emit implies Some").as_key(),
                    vibration_strength_db: tracker.last_strength_db,
                });
            }
        }

        for (tracker_key, tracker) in self.sensor_trackers.iter_mut() {
            if seen_tracker_keys.contains(tracker_key) {
                continue;
            }
            apply_hysteresis(tracker, None, SILENCE_DB);
        }

        // Continuous active-level view from every tracker still holding a
        // bucket, not just the ones refreshed this tick (a decayed-but-held
        // bucket still counts as "active").
        for (tracker_key, tracker) in &self.sensor_trackers {
            let Some(current) = tracker.current_bucket else { continue };
            let sensor_id = tracker_key.split(':').next().unwrap_or(tracker_key).to_string();
            for &src in tracker.last_class_key.source_keys() {
                upsert_active(&mut active_by_source, src, current, tracker.last_strength_db, &tracker.last_sensor_label, tracker.last_class_key, tracker.last_peak_hz);
            }
            let better = active_by_sensor.get(&sensor_id).map(|e| tracker.last_strength_db > e.strength_db).unwrap_or(true);
            if better {
                active_by_sensor.insert(
                    sensor_id,
                    ActiveLevel {
                        bucket_key: current.as_key(),
                        strength_db: tracker.last_strength_db,
                        sensor_label: tracker.last_sensor_label.clone(),
                        class_key: tracker.last_class_key.as_str(),
                        peak_hz: tracker.last_peak_hz,
                    },
                );
            }
        }

        // Multi-sensor coincidence: trackers with an active bucket, refreshed
        // within the coincidence window, grouped by class and then by
        // adjacency within the frequency bin.
        let fresh: Vec<&TrackerState> = self
            .sensor_trackers
            .values()
            .filter(|t| t.current_bucket.is_some() && ((now_ms - t.last_update_ms) as f64 / 1000.0) <= LIVE_COINCIDENCE_WINDOW_S)
            .collect();
        let mut by_class: HashMap<ClassKey, Vec<&TrackerState>> = HashMap::new();
        for t in fresh {
            by_class.entry(t.last_class_key).or_default().push(t);
        }

        let mut seen_combined: HashSet<String> = HashSet::new();
        for (class_key, mut trackers) in by_class {
            trackers.sort_by(|a, b| a.last_peak_hz.partial_cmp(&b.last_peak_hz).unwrap_or(std::cmp::Ordering::Equal));
            let mut groups: Vec<Vec<&TrackerState>> = Vec::new();
            for t in trackers {
                let fits_last = groups.last().and_then(|g| g.last()).map(|prev| (prev.last_peak_hz - t.last_peak_hz).abs() <= LIVE_COINCIDENCE_BIN_HZ).unwrap_or(false);
                if fits_last {
                    groups.last_mut().unwrap().push(t);
                } else {
                    groups.push(vec![t]);
                }
            }

            for group in groups {
                if group.len() < 2 {
                    continue;
                }
                let avg_hz = mean(group.iter().map(|t| t.last_peak_hz));
                let avg_amp = mean(group.iter().map(|t| t.last_band_rms_g));
                let avg_db = mean(group.iter().map(|t| t.last_strength_db));
                let freq_bin = (avg_hz / LIVE_COINCIDENCE_BIN_HZ).round() as i64;
                let combined_key = format!("combined:{}:{}", class_key.as_str(), freq_bin);
                seen_combined.insert(combined_key.clone());

                let combined_db = avg_db + LIVE_MULTI_SENSOR_BONUS_DB;
                let instantaneous = if avg_amp <= 0.0 { None } else { bucket_for(combined_db, avg_amp) };
                let labels: Vec<String> = group.iter().map(|t| t.last_sensor_label.clone()).collect();

                let tracker = self.combined_trackers.entry(combined_key).or_insert_with(|| TrackerState::new(class_key));
                let previous = apply_hysteresis(tracker, instantaneous, combined_db);
                tracker.last_band_rms_g = avg_amp;
                tracker.last_update_ms = now_ms;
                tracker.last_peak_hz = avg_hz;
                tracker.last_class_key = class_key;
                tracker.last_sensor_label = format!("combined({})", labels.join(", "));

                if let Some(current) = tracker.current_bucket {
                    for &src in class_key.source_keys() {
                        upsert_active(&mut active_by_source, src, current, tracker.last_strength_db, &tracker.last_sensor_label, class_key, avg_hz);
                    }
                }

                if let Some(trans) = transition_bucket(previous, tracker.current_bucket) {
                    for &src in class_key.source_keys() {
                        bump_matrix(&mut self.matrix, src, trans, &tracker.last_sensor_label);
                    }
                }

                if should_emit(tracker, previous, now_ms) {
                    tracker.last_emitted_ms = now_ms;
                    events.push(LiveEvent {
                        kind: "multi",
                        class_key: class_key.as_str(),
                        sensor_count: group.len(),
                        sensor_id: None,
                        sensor_label: tracker.last_sensor_label.clone(),
                        sensor_labels: labels,
                        peak_hz: avg_hz,
                        peak_amp: avg_amp,
                        severity_key: tracker.current_bucket.expect("should_emit implies Some").as_key(),
                        vibration_strength_db: tracker.last_strength_db,
                    });
                }
            }
        }

        for (combined_key, tracker) in self.combined_trackers.iter_mut() {
            if seen_combined.contains(combined_key) {
                continue;
            }
            apply_hysteresis(tracker, None, SILENCE_DB);
        }

        self.active_by_source = active_by_source.clone();
        self.active_by_sensor = active_by_sensor.clone();

        LiveSnapshot { matrix: self.matrix.clone(), events, levels_by_source: active_by_source, levels_by_sensor: active_by_sensor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn wheel_sample(t_s: f64, client_id: &str, speed_kmh: f64, peak_hz: f64, peak_amp: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", t_s, client_id, format!("Sensor {client_id}"));
        s.speed_kmh = Some(speed_kmh);
        s.strength_floor_amp_g = 0.001;
        s.top_peaks = vec![Peak { hz: peak_hz, amp: peak_amp }];
        s
    }

    fn wheel_metadata(tire_circumference_m: f64) -> (RunMetadata, Option<f64>) {
        (RunMetadata::new("run-1"), Some(tire_circumference_m))
    }

    #[test]
    fn classify_peak_hz_matches_wheel_order() {
        let sample = wheel_sample(0.0, "aabbccddeeff", 100.0, 0.0, 0.0);
        let (metadata, circumference) = wheel_metadata(2.0);
        let wheel_hz = (100.0 / 3.6) / 2.0;
        let class = classify_peak_hz(wheel_hz, &sample, &metadata, circumference);
        assert_eq!(class, ClassKey::Wheel1);
    }

    #[test]
    fn classify_peak_hz_falls_back_to_road_band() {
        let sample = wheel_sample(0.0, "aabbccddeeff", 0.0, 0.0, 0.0);
        let metadata = RunMetadata::new("run-1");
        let class = classify_peak_hz(7.0, &sample, &metadata, None);
        assert_eq!(class, ClassKey::Road);
    }

    #[test]
    fn rising_edge_activates_immediately() {
        let mut engine = LiveDiagnosticsEngine::new();
        let (metadata, circumference) = wheel_metadata(2.0);
        let wheel_hz = (100.0 / 3.6) / 2.0;
        let sample = wheel_sample(0.0, "aabbccddeeff", 100.0, wheel_hz, 0.05);
        let snapshot = engine.update(0.0, &[sample], &metadata, circumference);
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].kind, "single");
        assert!(!snapshot.levels_by_source.is_empty());
    }

    #[test]
    fn falling_edge_requires_decay_ticks() {
        let mut engine = LiveDiagnosticsEngine::new();
        let (metadata, circumference) = wheel_metadata(2.0);
        let wheel_hz = (100.0 / 3.6) / 2.0;

        let loud = wheel_sample(0.0, "aabbccddeeff", 100.0, wheel_hz, 0.05);
        engine.update(0.0, &[loud], &metadata, circumference);
        assert!(engine.sensor_trackers.values().any(|t| t.current_bucket.is_some()));

        // Silence for fewer ticks than LIVE_DECAY_TICKS: bucket must persist.
        for i in 1..LIVE_DECAY_TICKS {
            let quiet = wheel_sample(i as f64 * 0.1, "aabbccddeeff", 100.0, wheel_hz, 0.0001);
            engine.update(i as f64 * 0.1, &[quiet], &metadata, circumference);
        }
        assert!(engine.sensor_trackers.values().any(|t| t.current_bucket.is_some()), "bucket should still be held during decay");

        // One more silent tick crosses the decay threshold.
        let still_quiet = wheel_sample(1.0, "aabbccddeeff", 100.0, wheel_hz, 0.0001);
        engine.update(1.0, &[still_quiet], &metadata, circumference);
        assert!(engine.sensor_trackers.values().all(|t| t.current_bucket.is_none()), "bucket should clear after LIVE_DECAY_TICKS silent ticks");
    }

    #[test]
    fn two_sensors_near_the_same_frequency_combine() {
        let mut engine = LiveDiagnosticsEngine::new();
        let (metadata, circumference) = wheel_metadata(2.0);
        let wheel_hz = (100.0 / 3.6) / 2.0;
        let a = wheel_sample(0.0, "aabbccddee01", 100.0, wheel_hz, 0.05);
        let b = wheel_sample(0.0, "aabbccddee02", 100.0, wheel_hz + 0.2, 0.05);
        let snapshot = engine.update(0.0, &[a, b], &metadata, circumference);
        assert!(snapshot.events.iter().any(|e| e.kind == "multi" && e.sensor_count == 2));
    }

    #[test]
    fn matrix_accumulates_seconds_while_active() {
        let mut engine = LiveDiagnosticsEngine::new();
        let (metadata, circumference) = wheel_metadata(2.0);
        let wheel_hz = (100.0 / 3.6) / 2.0;
        let sample = wheel_sample(0.0, "aabbccddeeff", 100.0, wheel_hz, 0.05);
        engine.update(0.0, &[sample.clone()], &metadata, circumference);
        let snapshot = engine.update(0.5, &[sample], &metadata, circumference);
        let total_seconds: f64 = snapshot.matrix["wheel"].values().map(|c| c.seconds).sum();
        assert!(total_seconds > 0.0);
    }
}
