//! Findings Builder — Residual Peaks (C8, spec §4.8).
//!
//! Bins every sample's `top_peaks` onto a 2 Hz frequency grid, skips bins
//! shadowed by a confident order finding, and classifies the remainder into
//! `baseline_noise` / `transient` / `patterned` / `persistent` buckets.

use std::collections::{HashMap, HashSet};

use crate::config::defaults::{
    BASELINE_NOISE_BURSTINESS, BASELINE_NOISE_BURSTINESS_MAX, BASELINE_NOISE_BURSTINESS_MIN, BASELINE_NOISE_PRESENCE,
    BASELINE_NOISE_PRESENCE_MAX, BASELINE_NOISE_PRESENCE_MIN, BASELINE_NOISE_SNR_THRESHOLD,
    BASELINE_NOISE_SPATIAL_UNIFORMITY, BASELINE_NOISE_SPATIAL_UNIFORMITY_MIN, BASELINE_NOISE_SPEED_UNIFORMITY_MAX,
    FREQ_BIN_HZ, MEMS_NOISE_FLOOR_G, ORDER_SUPPRESS_PERSISTENT_MIN_CONF, PATTERNED_MAX_BURSTINESS,
    PATTERNED_MIN_PRESENCE, PERSISTENT_PEAK_MAX_FINDINGS, PERSISTENT_PEAK_MIN_PRESENCE, SNR_LOG_DIVISOR,
    TRANSIENT_BURSTINESS_THRESHOLD,
};
use crate::processing::strength::{percentile, strength_db};
use crate::processing::strength_bands::negligible_strength_max_db;
use crate::types::{I18nRef, ProcessedSample};

use super::helpers::{location_label, speed_bin_label};
use super::{AmplitudeMetric, Evidence, EvidenceMetrics, Finding, LocationHotspot, MatchedPoint, PhaseEvidence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeakClass {
    BaselineNoise,
    Transient,
    Patterned,
    Persistent,
}

struct BinAccumulator {
    center_hz: f64,
    amps: Vec<f64>,
    floors: Vec<f64>,
    locations: Vec<String>,
    speed_bins: Vec<String>,
    by_location_hits: HashMap<String, usize>,
    by_location_samples: HashMap<String, usize>,
}

fn bin_center(hz: f64) -> f64 {
    (hz / FREQ_BIN_HZ).floor() * FREQ_BIN_HZ + FREQ_BIN_HZ / 2.0
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 { sorted[n / 2] } else { (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0 }
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Order-finding frequencies (in Hz) confident enough to shadow a peak bin,
/// per spec §4.8 ("only for order findings with confidence ≥ 0.40").
fn shadow_frequencies(order_findings: &[Finding]) -> Vec<f64> {
    order_findings
        .iter()
        .filter(|f| f.confidence_0_to_1 >= ORDER_SUPPRESS_PERSISTENT_MIN_CONF)
        .filter_map(|f| f.representative_hz)
        .collect()
}

fn is_shadowed(center_hz: f64, shadows: &[f64]) -> bool {
    shadows.iter().any(|s| (center_hz - s).abs() <= FREQ_BIN_HZ)
}

fn classify(presence_ratio: f64, burstiness: f64, spatial_uniformity: f64, speed_uniformity: f64, snr: f64) -> PeakClass {
    if snr < BASELINE_NOISE_SNR_THRESHOLD
        || (spatial_uniformity > BASELINE_NOISE_SPATIAL_UNIFORMITY
            && presence_ratio >= BASELINE_NOISE_PRESENCE
            && burstiness < BASELINE_NOISE_BURSTINESS)
    {
        return PeakClass::BaselineNoise;
    }
    // A uniform low-level hum: present almost everywhere, at a near-constant
    // rate regardless of speed bin, at moderate presence/burstiness.
    if spatial_uniformity >= BASELINE_NOISE_SPATIAL_UNIFORMITY_MIN
        && speed_uniformity <= BASELINE_NOISE_SPEED_UNIFORMITY_MAX
        && (BASELINE_NOISE_PRESENCE_MIN..=BASELINE_NOISE_PRESENCE_MAX).contains(&presence_ratio)
        && (BASELINE_NOISE_BURSTINESS_MIN..=BASELINE_NOISE_BURSTINESS_MAX).contains(&burstiness)
    {
        return PeakClass::BaselineNoise;
    }
    if presence_ratio < PERSISTENT_PEAK_MIN_PRESENCE || burstiness > TRANSIENT_BURSTINESS_THRESHOLD {
        return PeakClass::Transient;
    }
    if presence_ratio >= PATTERNED_MIN_PRESENCE && burstiness < PATTERNED_MAX_BURSTINESS {
        return PeakClass::Patterned;
    }
    PeakClass::Persistent
}

fn confidence_for(
    class: PeakClass,
    presence_ratio: f64,
    snr_score: f64,
    burstiness: f64,
    concentration: f64,
    strength_db_value: f64,
) -> f64 {
    match class {
        PeakClass::BaselineNoise => 0.05,
        PeakClass::Transient => (0.05 + 0.10 * presence_ratio + 0.07 * snr_score).clamp(0.05, 0.22),
        PeakClass::Patterned | PeakClass::Persistent => {
            let base = (0.10 + 0.35 * presence_ratio + 0.15 * snr_score + 0.15 * (1.0 - (burstiness / 10.0).min(1.0)))
                .clamp(0.10, 0.75);
            // Diffusely-spread peaks (low spatial concentration) score lower
            // than a peak concentrated at one location.
            let spatial_penalty = 0.35 + 0.65 * concentration;
            let mut conf = base * spatial_penalty;
            if concentration <= 0.35 {
                conf = conf.min(0.35);
            }
            if strength_db_value < negligible_strength_max_db() {
                conf = conf.min(0.40);
            }
            conf.clamp(0.05, 0.97)
        }
    }
}

/// Bins samples' `top_peaks` onto a 2 Hz grid (skipping bins shadowed by a
/// confident order finding), classifies each surviving bin, and returns up to
/// 3 `persistent` plus 3 `transient` findings (spec §4.8).
pub fn build_residual_peak_findings(
    samples: &[ProcessedSample],
    diagnostic_indices: &[usize],
    order_findings: &[Finding],
    connected_locations: &HashSet<String>,
) -> Vec<Finding> {
    if diagnostic_indices.is_empty() {
        return Vec::new();
    }
    let shadows = shadow_frequencies(order_findings);
    let n_samples = diagnostic_indices.len();
    let total_locations = connected_locations.len().max(1);

    let mut bins: HashMap<i64, BinAccumulator> = HashMap::new();
    let mut location_sample_counts: HashMap<String, usize> = HashMap::new();

    for &idx in diagnostic_indices {
        let sample = &samples[idx];
        let location = location_label(sample);
        *location_sample_counts.entry(location.clone()).or_insert(0) += 1;
        let speed_bin = sample.speed_kmh.map(speed_bin_label).unwrap_or_default();

        for peak in &sample.top_peaks {
            let center = bin_center(peak.hz);
            if is_shadowed(center, &shadows) {
                continue;
            }
            let key = (center * 1000.0).round() as i64;
            let acc = bins.entry(key).or_insert_with(|| BinAccumulator {
                center_hz: center,
                amps: Vec::new(),
                floors: Vec::new(),
                locations: Vec::new(),
                speed_bins: Vec::new(),
                by_location_hits: HashMap::new(),
                by_location_samples: HashMap::new(),
            });
            acc.amps.push(peak.amp);
            acc.floors.push(sample.strength_floor_amp_g.max(0.0));
            acc.locations.push(location.clone());
            acc.speed_bins.push(speed_bin.clone());
            *acc.by_location_hits.entry(location.clone()).or_insert(0) += 1;
        }
    }
    for acc in bins.values_mut() {
        acc.by_location_samples = location_sample_counts.clone();
    }

    let mut persistent: Vec<(f64, Finding)> = Vec::new();
    let mut transient: Vec<(f64, Finding)> = Vec::new();

    let mut bin_list: Vec<&BinAccumulator> = bins.values().collect();
    bin_list.sort_by(|a, b| a.center_hz.partial_cmp(&b.center_hz).unwrap_or(std::cmp::Ordering::Equal));

    for acc in bin_list {
        let hits = acc.amps.len();
        let global_presence = hits as f64 / n_samples as f64;

        let best_location_presence = acc
            .by_location_hits
            .iter()
            .filter(|(loc, _)| acc.by_location_samples.get(*loc).copied().unwrap_or(0) >= 3)
            .map(|(loc, &h)| h as f64 / acc.by_location_samples[loc] as f64)
            .fold(0.0_f64, f64::max);
        let presence_ratio = global_presence.max(best_location_presence);

        let max_amp = acc.amps.iter().cloned().fold(0.0_f64, f64::max);
        let median_amp = median(&acc.amps);
        let burstiness = if median_amp > 0.0 { max_amp / median_amp } else { max_amp / 1e-9 };

        let distinct_locations: HashSet<&str> = acc.locations.iter().map(|s| s.as_str()).collect();
        let spatial_uniformity = distinct_locations.len() as f64 / total_locations as f64;

        let mut by_speed_bin: HashMap<String, usize> = HashMap::new();
        for b in &acc.speed_bins {
            *by_speed_bin.entry(b.clone()).or_insert(0) += 1;
        }
        let rates: Vec<f64> = by_speed_bin.values().map(|&c| c as f64 / hits.max(1) as f64).collect();
        let speed_uniformity = stddev(&rates);

        let p95_amp = percentile(&acc.amps, 95.0);
        let mean_floor = if acc.floors.is_empty() { 0.0 } else { acc.floors.iter().sum::<f64>() / acc.floors.len() as f64 };
        let effective_floor = mean_floor.max(MEMS_NOISE_FLOOR_G);
        let (strength_db_value, _eps) = strength_db(p95_amp.max(effective_floor), effective_floor);
        let snr = p95_amp.max(1e-12) / effective_floor;
        let snr_score = (snr.ln_1p() / SNR_LOG_DIVISOR).clamp(0.0, 1.0);

        let class = classify(presence_ratio, burstiness, spatial_uniformity, speed_uniformity, snr);
        if class == PeakClass::BaselineNoise {
            continue;
        }

        let max_location_count = acc.by_location_hits.values().cloned().max().unwrap_or(0) as f64;
        let concentration = max_location_count / hits.max(1) as f64;

        let confidence = confidence_for(class, presence_ratio, snr_score, burstiness, concentration, strength_db_value);

        let top_location = acc
            .by_location_hits
            .iter()
            .max_by_key(|(_, &c)| c)
            .map(|(loc, _)| loc.clone())
            .unwrap_or_default();

        let matched_points: Vec<MatchedPoint> = acc
            .amps
            .iter()
            .zip(acc.locations.iter())
            .zip(acc.speed_bins.iter())
            .map(|((amp, loc), _bin)| MatchedPoint {
                t_s: 0.0,
                speed_kmh: None,
                predicted_hz: acc.center_hz,
                matched_hz: acc.center_hz,
                rel_error: 0.0,
                amp: *amp,
                location: loc.clone(),
                phase: None,
            })
            .collect();

        let (key_suffix, i18n_key) = match class {
            PeakClass::Persistent => ("persistent", "FINDING_RESIDUAL_PEAK_PERSISTENT"),
            PeakClass::Patterned => ("patterned", "FINDING_RESIDUAL_PEAK_PATTERNED"),
            PeakClass::Transient => ("transient", "FINDING_RESIDUAL_PEAK_TRANSIENT"),
            PeakClass::BaselineNoise => unreachable!(),
        };
        let center_hz = acc.center_hz;
        let evidence = Evidence::new(
            I18nRef::new(i18n_key)
                .with("freq_hz", center_hz)
                .with("presence_pct", (presence_ratio * 100.0).round()),
        )
        .with_suffix(if top_location.is_empty() { String::new() } else { format!(" near {top_location}") });

        let finding = Finding {
            finding_id: "F_RESIDUAL_PEAK".to_string(),
            finding_key: format!("residual_{key_suffix}_{center_hz:.0}hz"),
            suspected_source: "unclassified".to_string(),
            evidence_summary: evidence,
            frequency_hz_or_order: format!("{center_hz:.1}"),
            representative_hz: None,
            amplitude_metric: AmplitudeMetric::vibration_strength_db(strength_db_value),
            confidence_0_to_1: confidence,
            quick_checks: Vec::new(),
            matched_points,
            location_hotspot: LocationHotspot {
                location: top_location.clone(),
                speed_range: String::new(),
                dominance_ratio: 1.0,
                localization_confidence: spatial_uniformity,
                weak_spatial_separation: spatial_uniformity > BASELINE_NOISE_SPATIAL_UNIFORMITY,
                no_wheel_sensors: false,
            },
            strongest_location: if top_location.is_empty() { None } else { Some(top_location) },
            strongest_speed_band: None,
            dominant_phase: None,
            peak_speed_kmh: None,
            speed_window_kmh: None,
            dominance_ratio: None,
            localization_confidence: spatial_uniformity,
            weak_spatial_separation: spatial_uniformity > BASELINE_NOISE_SPATIAL_UNIFORMITY,
            corroborating_locations: distinct_locations.len(),
            diffuse_excitation: spatial_uniformity > BASELINE_NOISE_SPATIAL_UNIFORMITY,
            phase_evidence: Some(PhaseEvidence { cruise_fraction: 0.0, phases_detected: Vec::new() }),
            evidence_metrics: EvidenceMetrics {
                match_rate: presence_ratio,
                global_match_rate: global_presence,
                focused_speed_band: None,
                mean_relative_error: 0.0,
                mean_matched_intensity_db: strength_db_value,
                mean_noise_floor_db: strength_db(effective_floor.max(MEMS_NOISE_FLOOR_G), MEMS_NOISE_FLOOR_G).0,
                vibration_strength_db: strength_db_value,
                possible_samples: n_samples,
                matched_samples: hits,
                frequency_correlation: None,
                per_phase_confidence: None,
                phases_with_evidence: 0,
                diffuse_excitation: spatial_uniformity > BASELINE_NOISE_SPATIAL_UNIFORMITY,
            },
            next_sensor_move: I18nRef::new("NEXT_SENSOR_MOVE_DEFAULT"),
            actions: Vec::new(),
            ranking_score: confidence,
        };

        match class {
            PeakClass::Transient => transient.push((confidence, finding)),
            _ => persistent.push((confidence, finding)),
        }
    }

    persistent.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    transient.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    persistent.truncate(PERSISTENT_PEAK_MAX_FINDINGS);
    transient.truncate(PERSISTENT_PEAK_MAX_FINDINGS);

    let mut out: Vec<Finding> = persistent.into_iter().map(|(_, f)| f).collect();
    out.extend(transient.into_iter().map(|(_, f)| f));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn sample_with_peak(idx: usize, location: &str, hz: f64, amp: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", idx as f64 * 0.25, "aabbccddeeff", location);
        s.speed_kmh = Some(80.0);
        s.top_peaks = vec![Peak { hz, amp }];
        s
    }

    #[test]
    fn persistent_peak_survives_when_present_and_steady() {
        // Two sensors connected, but the tone only ever shows up on one of
        // them: spatial_uniformity stays low enough to escape the
        // "uniform everywhere" baseline-noise corner.
        let samples: Vec<ProcessedSample> = (0..40).map(|i| sample_with_peak(i, "Front Left", 37.0, 0.01)).collect();
        let indices: Vec<usize> = (0..40).collect();
        let connected: HashSet<String> = ["Front Left".to_string(), "Front Right".to_string()].into_iter().collect();
        let findings = build_residual_peak_findings(&samples, &indices, &[], &connected);
        assert!(!findings.is_empty(), "a steady off-order tone should survive as a peak finding");
    }

    #[test]
    fn shadowed_bin_near_confident_order_finding_is_suppressed() {
        let samples: Vec<ProcessedSample> = (0..40).map(|i| sample_with_peak(i, "Front Left", 12.0, 0.05)).collect();
        let indices: Vec<usize> = (0..40).collect();
        let connected: HashSet<String> = ["Front Left".to_string(), "Front Right".to_string()].into_iter().collect();

        let order_finding = Finding {
            finding_id: "F001".to_string(),
            finding_key: "wheel_1x".to_string(),
            suspected_source: "wheel/tire".to_string(),
            evidence_summary: Evidence::new(I18nRef::new("X")),
            frequency_hz_or_order: "1x wheel".to_string(),
            representative_hz: Some(12.0),
            amplitude_metric: AmplitudeMetric::vibration_strength_db(30.0),
            confidence_0_to_1: 0.80,
            quick_checks: Vec::new(),
            matched_points: Vec::new(),
            location_hotspot: LocationHotspot::default(),
            strongest_location: None,
            strongest_speed_band: None,
            dominant_phase: None,
            peak_speed_kmh: None,
            speed_window_kmh: None,
            dominance_ratio: None,
            localization_confidence: 0.5,
            weak_spatial_separation: false,
            corroborating_locations: 1,
            diffuse_excitation: false,
            phase_evidence: None,
            evidence_metrics: EvidenceMetrics {
                match_rate: 0.8,
                global_match_rate: 0.8,
                focused_speed_band: None,
                mean_relative_error: 0.01,
                mean_matched_intensity_db: 30.0,
                mean_noise_floor_db: 0.0,
                vibration_strength_db: 30.0,
                possible_samples: 40,
                matched_samples: 32,
                frequency_correlation: Some(0.9),
                per_phase_confidence: None,
                phases_with_evidence: 1,
                diffuse_excitation: false,
            },
            next_sensor_move: I18nRef::new("X"),
            actions: Vec::new(),
            ranking_score: 0.80,
        };

        let findings = build_residual_peak_findings(&samples, &indices, &[order_finding], &connected);
        assert!(
            findings.iter().all(|f| (f.frequency_hz_or_order.parse::<f64>().unwrap_or(0.0) - 12.0).abs() > FREQ_BIN_HZ),
            "a bin within freq_bin_hz of a confident order finding must be shadowed"
        );
    }

    #[test]
    fn uniform_low_level_noise_is_classified_away() {
        let samples: Vec<ProcessedSample> = (0..40)
            .map(|i| sample_with_peak(i, if i % 2 == 0 { "Front Left" } else { "Front Right" }, 55.0, 0.0016))
            .collect();
        let indices: Vec<usize> = (0..40).collect();
        let connected: HashSet<String> = ["Front Left".to_string(), "Front Right".to_string()].into_iter().collect();
        let findings = build_residual_peak_findings(&samples, &indices, &[], &connected);
        assert!(
            findings.is_empty(),
            "uniform near-floor amplitude spread evenly across all locations should be classified as baseline noise"
        );
    }
}
