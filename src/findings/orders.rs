//! Findings Builder — Orders (C7).
//!
//! Matches spectral peaks across a run's diagnostic samples against each
//! order hypothesis' predicted frequency (C5), scores the result, and
//! suppresses engine findings that are likely harmonic aliases of a wheel
//! finding (spec §4.7).

use std::collections::{HashMap, HashSet};

use crate::config::defaults::{
    CONFIDENCE_CEILING, CONFIDENCE_FLOOR, CONSTANT_SPEED_STDDEV_KMH, DIFFUSE_AMP_RATIO_THRESHOLD,
    DIFFUSE_MATCH_RATE_RANGE_THRESHOLD, DIFFUSE_MIN_MEAN_RATE, DIFFUSE_PENALTY_BASE,
    DIFFUSE_PENALTY_FLOOR, DIFFUSE_PENALTY_PER_SENSOR, DUAL_SENSOR_CONFIDENCE_SCALE,
    ENGINE_ALIAS_DEMOTION_FACTOR, HARMONIC_ALIAS_RATIO, MEMS_NOISE_FLOOR_G, ORDER_CONSTANT_SPEED_MIN_MATCH_RATE,
    ORDER_MIN_COVERAGE_POINTS, ORDER_MIN_CONFIDENCE, ORDER_MIN_MATCH_POINTS, ORDER_MIN_MATCH_RATE,
    ORDER_TOLERANCE_MIN_HZ, ORDER_TOLERANCE_REL, SINGLE_SENSOR_CONFIDENCE_SCALE, SNR_LOG_DIVISOR,
};
use crate::orders::{finding_actions_for_source, order_hypotheses, order_label};
use crate::processing::strength::strength_db;
use crate::processing::strength_bands::{light_strength_max_db, negligible_strength_max_db};
use crate::types::{I18nRef, Phase, ProcessedSample, RunMetadata};

use super::helpers::{
    corr_abs_clamped, location_label, location_speedbin_summary, speed_bin_label, speed_bin_sort_key,
    speed_profile_from_points,
};
use super::{AmplitudeMetric, EvidenceMetrics, Evidence, Finding, MatchedPoint, PhaseEvidence};

/// Everything the order-tracking builder needs about the run being analyzed.
pub struct OrderFindingsInput<'a> {
    pub metadata: &'a RunMetadata,
    pub samples: &'a [ProcessedSample],
    /// Indices into `samples` carrying diagnostic weight (spec §4.6's
    /// non-IDLE mask, already resolved by the phase segmenter).
    pub diagnostic_indices: &'a [usize],
    /// Per-sample phase label, same length and indexing as `samples`.
    pub phases: &'a [Option<Phase>],
    pub tire_circumference_m: Option<f64>,
    pub speed_sufficient: bool,
    pub steady_speed: bool,
    pub speed_stddev_kmh: Option<f64>,
    pub engine_ref_sufficient: bool,
    pub connected_locations: HashSet<String>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Rescue a below-threshold global match rate via focused high-speed
/// coverage or per-location dominance. Returns
/// `(effective_match_rate, focused_speed_band, per_location_dominant)`.
fn compute_effective_match_rate(
    match_rate: f64,
    min_match_rate: f64,
    possible_by_speed_bin: &HashMap<String, usize>,
    matched_by_speed_bin: &HashMap<String, usize>,
    possible_by_location: &HashMap<String, usize>,
    matched_by_location: &HashMap<String, usize>,
) -> (f64, Option<String>, bool) {
    let mut effective = match_rate;
    let mut focused_speed_band = None;

    if match_rate < min_match_rate && !possible_by_speed_bin.is_empty() {
        if let Some(highest) = possible_by_speed_bin
            .keys()
            .max_by(|a, b| speed_bin_sort_key(a).partial_cmp(&speed_bin_sort_key(b)).unwrap())
        {
            let focused_possible = *possible_by_speed_bin.get(highest).unwrap_or(&0);
            let focused_matched = *matched_by_speed_bin.get(highest).unwrap_or(&0);
            let focused_rate = focused_matched as f64 / focused_possible.max(1) as f64;
            let min_focused_possible = ORDER_MIN_MATCH_POINTS.max(ORDER_MIN_COVERAGE_POINTS / 2);
            if focused_possible >= min_focused_possible
                && focused_matched >= ORDER_MIN_MATCH_POINTS
                && focused_rate >= min_match_rate
            {
                focused_speed_band = Some(highest.clone());
                effective = focused_rate;
            }
        }
    }

    let mut per_location_dominant = false;
    if effective < min_match_rate && !possible_by_location.is_empty() {
        let mut best = 0.0;
        for (loc, &loc_possible) in possible_by_location {
            let loc_matched = *matched_by_location.get(loc).unwrap_or(&0);
            if loc_possible >= ORDER_MIN_COVERAGE_POINTS && loc_matched >= ORDER_MIN_MATCH_POINTS {
                let rate = loc_matched as f64 / loc_possible.max(1) as f64;
                if rate > best {
                    best = rate;
                }
            }
        }
        if best >= min_match_rate {
            effective = best;
            per_location_dominant = true;
        }
    }

    (effective, focused_speed_band, per_location_dominant)
}

/// Detect vibration that's uniformly present across multiple sensors rather
/// than localized to one (road noise, chassis-wide resonance). Returns
/// `(is_diffuse, penalty_factor)`; `penalty_factor` is `1.0` when not diffuse.
fn detect_diffuse_excitation(
    connected_locations: &HashSet<String>,
    possible_by_location: &HashMap<String, usize>,
    matched_by_location: &HashMap<String, usize>,
    matched_points: &[MatchedPoint],
) -> (bool, f64) {
    if connected_locations.len() < 2 || possible_by_location.is_empty() {
        return (false, 1.0);
    }
    let mut loc_rates = Vec::new();
    let mut loc_mean_amps: HashMap<String, f64> = HashMap::new();
    for loc in connected_locations {
        let loc_p = *possible_by_location.get(loc).unwrap_or(&0);
        let loc_m = *matched_by_location.get(loc).unwrap_or(&0);
        if loc_p >= 3usize.max(ORDER_MIN_MATCH_POINTS) {
            loc_rates.push(loc_m as f64 / loc_p.max(1) as f64);
            let amps: Vec<f64> = matched_points
                .iter()
                .filter(|p| &p.location == loc && p.amp > 0.0)
                .map(|p| p.amp)
                .collect();
            if !amps.is_empty() {
                loc_mean_amps.insert(loc.clone(), mean(&amps));
            }
        }
    }
    if loc_rates.len() < 2 {
        return (false, 1.0);
    }
    let rate_range = loc_rates.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - loc_rates.iter().cloned().fold(f64::INFINITY, f64::min);
    let mean_rate = mean(&loc_rates);
    let mut amp_uniform = true;
    if loc_mean_amps.len() >= 2 {
        let max_amp = loc_mean_amps.values().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_amp = loc_mean_amps.values().cloned().fold(f64::INFINITY, f64::min);
        if min_amp > 0.0 && max_amp / min_amp > DIFFUSE_AMP_RATIO_THRESHOLD {
            amp_uniform = false;
        }
    }
    if rate_range < DIFFUSE_MATCH_RATE_RANGE_THRESHOLD && mean_rate > DIFFUSE_MIN_MEAN_RATE && amp_uniform {
        let penalty =
            (DIFFUSE_PENALTY_BASE - DIFFUSE_PENALTY_PER_SENSOR * loc_rates.len() as f64).max(DIFFUSE_PENALTY_FLOOR);
        return (true, penalty);
    }
    (false, 1.0)
}

#[allow(clippy::too_many_arguments)]
fn compute_order_confidence(
    effective_match_rate: f64,
    error_score: f64,
    corr_val: f64,
    snr_score: f64,
    absolute_strength_db: f64,
    localization_confidence: f64,
    weak_spatial_separation: bool,
    dominance_ratio: Option<f64>,
    constant_speed: bool,
    steady_speed: bool,
    matched: usize,
    corroborating_locations: usize,
    phases_with_evidence: usize,
    is_diffuse_excitation: bool,
    diffuse_penalty: f64,
    n_connected_locations: usize,
    no_wheel_sensors: bool,
    path_compliance: f64,
) -> f64 {
    // Weight budget: correlation is lightest (peak wander/road noise degrade
    // it even for genuine faults), so compliant paths (wheel through
    // suspension) shift weight from correlation to match rate instead.
    let corr_shift = (0.10 * (path_compliance - 1.0)).min(0.05);
    let match_weight = 0.35 + corr_shift;
    let corr_weight = 0.10 - corr_shift;

    let mut confidence =
        0.10 + (match_weight * effective_match_rate) + (0.20 * error_score) + (corr_weight * corr_val) + (0.20 * snr_score);

    if absolute_strength_db < negligible_strength_max_db() {
        confidence = confidence.min(0.40);
    } else if absolute_strength_db < light_strength_max_db() {
        confidence *= 0.80;
    }

    confidence *= 0.70 + 0.30 * localization_confidence.clamp(0.0, 1.0);

    if weak_spatial_separation {
        if no_wheel_sensors && dominance_ratio.is_some_and(|d| d >= 1.5) {
            confidence *= 0.90;
        } else {
            confidence *= if dominance_ratio.is_some_and(|d| d < 1.05) { 0.70 } else { 0.80 };
        }
    }
    if no_wheel_sensors && !weak_spatial_separation {
        confidence *= 0.75;
    }

    if constant_speed {
        confidence *= 0.75;
    } else if steady_speed {
        confidence *= 0.82;
    }

    let sample_factor = (matched as f64 / 20.0).min(1.0);
    confidence *= 0.70 + 0.30 * sample_factor;

    if corroborating_locations >= 3 {
        confidence *= 1.08;
    } else if corroborating_locations >= 2 {
        confidence *= 1.04;
    }
    if phases_with_evidence >= 3 {
        confidence *= 1.06;
    } else if phases_with_evidence >= 2 {
        confidence *= 1.03;
    }
    if is_diffuse_excitation {
        confidence *= diffuse_penalty;
    }

    // Sensor-coverage scaling only applies above a localization-confidence
    // floor: below it, the localization term above and weak-spatial penalty
    // already account for the same underlying sparsity.
    if n_connected_locations <= 1 && localization_confidence >= 0.30 {
        confidence *= SINGLE_SENSOR_CONFIDENCE_SCALE;
    } else if n_connected_locations == 2 && localization_confidence >= 0.30 {
        confidence *= DUAL_SENSOR_CONFIDENCE_SCALE;
    }

    confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Demote engine findings that are likely 2x-order aliases of a wheel
/// finding, filter below `ORDER_MIN_CONFIDENCE`, and keep the top 5 by
/// ranking score.
fn suppress_engine_aliases(mut findings: Vec<(f64, Finding)>) -> Vec<Finding> {
    let best_wheel_conf = findings
        .iter()
        .filter(|(_, f)| f.suspected_source.eq_ignore_ascii_case("wheel/tire"))
        .map(|(_, f)| f.confidence_0_to_1)
        .fold(0.0_f64, f64::max);

    if best_wheel_conf > 0.0 {
        for (rs, f) in findings.iter_mut() {
            if f.suspected_source.eq_ignore_ascii_case("engine") && f.confidence_0_to_1 <= best_wheel_conf * HARMONIC_ALIAS_RATIO {
                f.confidence_0_to_1 *= ENGINE_ALIAS_DEMOTION_FACTOR;
                *rs *= ENGINE_ALIAS_DEMOTION_FACTOR;
                f.ranking_score = *rs;
            }
        }
    }

    findings.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    findings
        .into_iter()
        .filter(|(_, f)| f.confidence_0_to_1 >= ORDER_MIN_CONFIDENCE)
        .take(5)
        .map(|(_, f)| f)
        .collect()
}

/// Build one finding per order hypothesis that clears coverage, match-rate,
/// and confidence thresholds, then apply engine-alias suppression.
pub fn build_order_findings(input: &OrderFindingsInput<'_>) -> Vec<Finding> {
    let mut findings: Vec<(f64, Finding)> = Vec::new();

    for hypothesis in order_hypotheses() {
        if hypothesis.key.starts_with("wheel_") || hypothesis.key.starts_with("driveshaft_") {
            if !input.speed_sufficient || !input.tire_circumference_m.is_some_and(|c| c > 0.0) {
                continue;
            }
        }
        if (hypothesis.key.starts_with("engine_") || hypothesis.key == "driveshaft_engine_1x")
            && !input.engine_ref_sufficient
        {
            continue;
        }

        let mut possible = 0usize;
        let mut matched = 0usize;
        let mut matched_amp = Vec::new();
        let mut matched_floor = Vec::new();
        let mut rel_errors = Vec::new();
        let mut predicted_vals = Vec::new();
        let mut measured_vals = Vec::new();
        let mut matched_points: Vec<MatchedPoint> = Vec::new();
        let mut ref_sources: HashSet<&'static str> = HashSet::new();
        let mut possible_by_speed_bin: HashMap<String, usize> = HashMap::new();
        let mut matched_by_speed_bin: HashMap<String, usize> = HashMap::new();
        let mut possible_by_phase: HashMap<String, usize> = HashMap::new();
        let mut matched_by_phase: HashMap<String, usize> = HashMap::new();
        let mut possible_by_location: HashMap<String, usize> = HashMap::new();
        let mut matched_by_location: HashMap<String, usize> = HashMap::new();

        for &idx in input.diagnostic_indices {
            let sample = &input.samples[idx];
            if sample.top_peaks.is_empty() {
                continue;
            }
            let (predicted_hz, ref_source, uncertainty_pct) =
                hypothesis.predicted_hz(sample, input.metadata, input.tire_circumference_m);
            let predicted_hz = match predicted_hz {
                Some(hz) if hz > 0.0 => hz,
                _ => continue,
            };
            possible += 1;
            ref_sources.insert(ref_source);
            let location = location_label(sample);
            *possible_by_location.entry(location.clone()).or_insert(0) += 1;
            let speed_bin = match sample.speed_kmh {
                Some(s) if s > 0.0 => Some(speed_bin_label(s)),
                _ => None,
            };
            if let Some(sb) = &speed_bin {
                *possible_by_speed_bin.entry(sb.clone()).or_insert(0) += 1;
            }
            let phase_key = input.phases.get(idx).copied().flatten().map(|p| p.to_string());
            if let Some(pk) = &phase_key {
                *possible_by_phase.entry(pk.clone()).or_insert(0) += 1;
            }

            let compliance_scale = hypothesis.path_compliance.sqrt();
            // Base relative-bandwidth term and the propagated uncertainty
            // combined in quadrature (spec §4.5), then floored at the
            // absolute-Hz minimum.
            let rel_tolerance =
                ((ORDER_TOLERANCE_REL * compliance_scale).powi(2) + uncertainty_pct.powi(2)).sqrt();
            let tolerance_hz = (ORDER_TOLERANCE_MIN_HZ).max(predicted_hz * rel_tolerance);
            let (best_hz, best_amp) = sample
                .top_peaks
                .iter()
                .map(|p| (p.hz, p.amp))
                .min_by(|a, b| (a.0 - predicted_hz).abs().partial_cmp(&(b.0 - predicted_hz).abs()).unwrap())
                .unwrap();
            let delta_hz = (best_hz - predicted_hz).abs();
            if delta_hz > tolerance_hz {
                continue;
            }

            matched += 1;
            *matched_by_location.entry(location.clone()).or_insert(0) += 1;
            if let Some(sb) = &speed_bin {
                *matched_by_speed_bin.entry(sb.clone()).or_insert(0) += 1;
            }
            if let Some(pk) = &phase_key {
                *matched_by_phase.entry(pk.clone()).or_insert(0) += 1;
            }
            let rel_error = delta_hz / predicted_hz.max(1e-9);
            rel_errors.push(rel_error);
            matched_amp.push(best_amp);
            matched_floor.push(sample.strength_floor_amp_g.max(0.0));
            predicted_vals.push(predicted_hz);
            measured_vals.push(best_hz);
            matched_points.push(MatchedPoint {
                t_s: sample.t_s,
                speed_kmh: sample.speed_kmh,
                predicted_hz,
                matched_hz: best_hz,
                rel_error,
                amp: best_amp,
                location,
                phase: phase_key,
            });
        }

        if possible < ORDER_MIN_COVERAGE_POINTS || matched < ORDER_MIN_MATCH_POINTS {
            continue;
        }
        let match_rate = matched as f64 / possible.max(1) as f64;
        let constant_speed = input.speed_stddev_kmh.is_some_and(|s| s < CONSTANT_SPEED_STDDEV_KMH);
        let min_match_rate = if constant_speed { ORDER_CONSTANT_SPEED_MIN_MATCH_RATE } else { ORDER_MIN_MATCH_RATE };

        let (effective_match_rate, focused_speed_band, per_location_dominant) = compute_effective_match_rate(
            match_rate,
            min_match_rate,
            &possible_by_speed_bin,
            &matched_by_speed_bin,
            &possible_by_location,
            &matched_by_location,
        );
        if effective_match_rate < min_match_rate {
            continue;
        }

        let mut per_phase_confidence: Option<std::collections::BTreeMap<String, f64>> = None;
        let mut phases_with_evidence = 0usize;
        if !possible_by_phase.is_empty() {
            let mut map = std::collections::BTreeMap::new();
            for (ph_key, ph_possible) in &possible_by_phase {
                let ph_matched = *matched_by_phase.get(ph_key).unwrap_or(&0);
                let rate = ph_matched as f64 / (*ph_possible).max(1) as f64;
                map.insert(ph_key.clone(), rate);
                if ph_matched >= ORDER_MIN_MATCH_POINTS && rate >= min_match_rate {
                    phases_with_evidence += 1;
                }
            }
            per_phase_confidence = Some(map);
        }

        let mean_amp = mean(&matched_amp);
        let mean_floor = mean(&matched_floor);
        let mean_rel_err = if rel_errors.is_empty() { 1.0 } else { mean(&rel_errors) };
        let corr = if !constant_speed && matched_points.len() >= 3 {
            corr_abs_clamped(&predicted_vals, &measured_vals)
        } else {
            None
        };
        let corr_val = corr.unwrap_or(0.0);

        let relevant_speed_bins: Option<Vec<String>> = focused_speed_band.clone().map(|b| vec![b]);
        let (location_line, mut location_hotspot) = location_speedbin_summary(
            &matched_points,
            relevant_speed_bins.as_deref(),
            &input.connected_locations,
            hypothesis.suspected_source,
        );

        let unique_match_locations: HashSet<&str> = matched_points.iter().map(|p| p.location.as_str()).collect();
        let no_wheel_override = location_hotspot.no_wheel_sensors;
        if per_location_dominant
            && unique_match_locations.len() == 1
            && input.connected_locations.len() >= 2
            && !no_wheel_override
        {
            location_hotspot.localization_confidence = (0.50 + 0.15 * (input.connected_locations.len() - 1) as f64).min(1.0);
            location_hotspot.weak_spatial_separation = false;
        } else if unique_match_locations.len() == 1
            && input.connected_locations.len() >= 2
            && matched >= ORDER_MIN_MATCH_POINTS
            && !no_wheel_override
        {
            location_hotspot.localization_confidence = location_hotspot
                .localization_confidence
                .max((0.40 + 0.10 * (input.connected_locations.len() - 1) as f64).min(1.0));
            location_hotspot.weak_spatial_separation = false;
        }

        let corroborating_locations = unique_match_locations.len();

        let error_denominator = 0.25 * hypothesis.path_compliance;
        let error_score = (1.0 - (mean_rel_err / error_denominator).min(1.0)).max(0.0);
        let mut snr_score = ((mean_amp / mean_floor.max(MEMS_NOISE_FLOOR_G)).ln_1p() / SNR_LOG_DIVISOR).min(1.0);
        if mean_amp <= 2.0 * MEMS_NOISE_FLOOR_G {
            snr_score = snr_score.min(0.40);
        }
        let (absolute_strength_db, _) = strength_db(mean_amp, mean_floor.max(MEMS_NOISE_FLOOR_G));

        let (diffuse_excitation, diffuse_penalty) =
            detect_diffuse_excitation(&input.connected_locations, &possible_by_location, &matched_by_location, &matched_points);

        let confidence = compute_order_confidence(
            effective_match_rate,
            error_score,
            corr_val,
            snr_score,
            absolute_strength_db,
            location_hotspot.localization_confidence,
            location_hotspot.weak_spatial_separation,
            Some(location_hotspot.dominance_ratio),
            constant_speed,
            input.steady_speed,
            matched,
            corroborating_locations,
            phases_with_evidence,
            diffuse_excitation,
            diffuse_penalty,
            input.connected_locations.len(),
            location_hotspot.no_wheel_sensors,
            hypothesis.path_compliance,
        );

        let ranking_error_denom = 0.25 * hypothesis.path_compliance;
        let ranking_score = effective_match_rate
            * (mean_amp / mean_floor.max(MEMS_NOISE_FLOOR_G)).ln_1p()
            * (1.0 - (mean_rel_err / ranking_error_denom).min(1.0)).max(0.0);

        let mut ref_text: Vec<&str> = ref_sources.into_iter().collect();
        ref_text.sort_unstable();
        let order_label_text = order_label(hypothesis.order, hypothesis.order_label_base);
        let evidence_i18n = I18nRef::new("EVIDENCE_ORDER_TRACKED")
            .with("order_label", order_label_text.clone())
            .with("matched", matched as i64)
            .with("possible", possible as i64)
            .with("match_rate", effective_match_rate)
            .with("mean_rel_err", mean_rel_err)
            .with("ref_text", ref_text.join(", "));
        let mut evidence = Evidence::new(evidence_i18n);
        if let Some(line) = &location_line {
            evidence = evidence.with_suffix(format!(" {line}"));
        }

        let strongest_location = location_hotspot.location.clone();
        let mut speed_points = Vec::new();
        let mut speed_phase_weights = Vec::new();
        for point in &matched_points {
            let speed = match point.speed_kmh {
                Some(s) => s,
                None => continue,
            };
            speed_points.push((speed, point.amp));
            speed_phase_weights.push(crate::phase::phase_weight(
                point.phase.as_deref().and_then(parse_phase_str),
            ));
        }
        let (peak_speed_kmh, speed_window_kmh, mut strongest_speed_band) = speed_profile_from_points(
            &speed_points,
            relevant_speed_bins.as_deref(),
            if speed_phase_weights.is_empty() { None } else { Some(&speed_phase_weights) },
        );
        if strongest_speed_band.is_none() && !location_hotspot.speed_range.is_empty() {
            strongest_speed_band = Some(location_hotspot.speed_range.clone());
        }
        if strongest_speed_band.is_none() {
            strongest_speed_band = focused_speed_band.clone();
        }

        let actions = finding_actions_for_source(
            hypothesis.suspected_source,
            &strongest_location,
            strongest_speed_band.as_deref().unwrap_or(""),
            location_hotspot.weak_spatial_separation,
        );
        let quick_checks: Vec<I18nRef> = actions.iter().take(3).map(|a| a.what.clone()).collect();

        let matched_phase_strs: Vec<String> = matched_points.iter().filter_map(|p| p.phase.clone()).collect();
        let cruise_label = Phase::Cruise.to_string();
        let cruise_matched = matched_phase_strs.iter().filter(|p| **p == cruise_label).count();
        let phase_evidence = PhaseEvidence {
            cruise_fraction: if matched_phase_strs.is_empty() { 0.0 } else { cruise_matched as f64 / matched_phase_strs.len() as f64 },
            phases_detected: {
                let mut set = matched_phase_strs.clone();
                set.sort();
                set.dedup();
                set
            },
        };

        let onset_relevant = [Phase::Acceleration.to_string(), Phase::Deceleration.to_string(), Phase::CoastDown.to_string()];
        let onset_labels: Vec<&String> = matched_phase_strs.iter().filter(|p| onset_relevant.iter().any(|o| o == *p)).collect();
        let mut dominant_phase = None;
        if onset_labels.len() >= 2.max(matched_points.len() / 2) {
            let mut counts: HashMap<&String, usize> = HashMap::new();
            for p in &onset_labels {
                *counts.entry(p).or_insert(0) += 1;
            }
            if let Some((top_phase, top_count)) = counts.into_iter().max_by_key(|(_, c)| *c) {
                if top_count as f64 / matched_points.len() as f64 >= 0.50 {
                    dominant_phase = Some(top_phase.clone());
                }
            }
        }

        let mean_noise_floor_db = strength_db(mean_floor.max(MEMS_NOISE_FLOOR_G), MEMS_NOISE_FLOOR_G).0;
        let representative_hz = if matched_points.is_empty() {
            None
        } else {
            Some(matched_points.iter().map(|p| p.predicted_hz).sum::<f64>() / matched_points.len() as f64)
        };

        let finding = Finding {
            finding_id: "F_ORDER".to_string(),
            finding_key: hypothesis.key.to_string(),
            suspected_source: hypothesis.suspected_source.to_string(),
            evidence_summary: evidence,
            frequency_hz_or_order: order_label_text,
            representative_hz,
            amplitude_metric: AmplitudeMetric::vibration_strength_db(absolute_strength_db),
            confidence_0_to_1: confidence,
            quick_checks,
            matched_points,
            location_hotspot: location_hotspot.clone(),
            strongest_location: if strongest_location.is_empty() { None } else { Some(strongest_location) },
            strongest_speed_band: strongest_speed_band.filter(|s| !s.is_empty()),
            dominant_phase,
            peak_speed_kmh,
            speed_window_kmh,
            dominance_ratio: Some(location_hotspot.dominance_ratio),
            localization_confidence: location_hotspot.localization_confidence,
            weak_spatial_separation: location_hotspot.weak_spatial_separation,
            corroborating_locations,
            diffuse_excitation,
            phase_evidence: Some(phase_evidence),
            evidence_metrics: EvidenceMetrics {
                match_rate: effective_match_rate,
                global_match_rate: match_rate,
                focused_speed_band,
                mean_relative_error: mean_rel_err,
                mean_matched_intensity_db: absolute_strength_db,
                mean_noise_floor_db,
                vibration_strength_db: absolute_strength_db,
                possible_samples: possible,
                matched_samples: matched,
                frequency_correlation: corr,
                per_phase_confidence,
                phases_with_evidence,
                diffuse_excitation,
            },
            next_sensor_move: actions.first().map(|a| a.what.clone()).unwrap_or_else(|| I18nRef::new("NEXT_SENSOR_MOVE_DEFAULT")),
            actions,
            ranking_score,
        };
        findings.push((ranking_score, finding));
    }

    suppress_engine_aliases(findings)
}

fn parse_phase_str(s: &str) -> Option<Phase> {
    match s {
        "IDLE" => Some(Phase::Idle),
        "ACCELERATION" => Some(Phase::Acceleration),
        "CRUISE" => Some(Phase::Cruise),
        "DECELERATION" => Some(Phase::Deceleration),
        "COAST_DOWN" => Some(Phase::CoastDown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn sample_with_peak(idx: usize, run_id: &str, speed_kmh: f64, peak_hz: f64, amp: f64, location: &str) -> ProcessedSample {
        let mut s = ProcessedSample::new(run_id, idx as f64 * 0.25, "aabbccddeeff", location);
        s.speed_kmh = Some(speed_kmh);
        s.strength_floor_amp_g = 0.001;
        s.top_peaks = vec![Peak { hz: peak_hz, amp }];
        s.phase = Some(Phase::Cruise);
        s
    }

    #[test]
    fn wheel_finding_requires_minimum_coverage() {
        let metadata = RunMetadata::new("run-1");
        let samples: Vec<ProcessedSample> = (0..5)
            .map(|i| sample_with_peak(i, "run-1", 90.0, 8.0, 0.02, "Front Left"))
            .collect();
        let diagnostic_indices: Vec<usize> = (0..samples.len()).collect();
        let phases: Vec<Option<Phase>> = vec![Some(Phase::Cruise); samples.len()];
        let input = OrderFindingsInput {
            metadata: &metadata,
            samples: &samples,
            diagnostic_indices: &diagnostic_indices,
            phases: &phases,
            tire_circumference_m: Some(2.0),
            speed_sufficient: true,
            steady_speed: true,
            speed_stddev_kmh: Some(1.0),
            engine_ref_sufficient: false,
            connected_locations: ["Front Left".to_string()].into_iter().collect(),
        };
        let findings = build_order_findings(&input);
        assert!(findings.is_empty(), "too few samples should not clear ORDER_MIN_COVERAGE_POINTS");
    }

    #[test]
    fn strong_matching_wheel_signal_produces_a_finding() {
        let metadata = RunMetadata::new("run-1");
        let tire_circ = 2.0;
        let speed_kmh = 90.0;
        let wheel_hz = crate::orders::wheel_hz_from_speed_kmh(speed_kmh, tire_circ).unwrap();
        let samples: Vec<ProcessedSample> = (0..40)
            .map(|i| sample_with_peak(i, "run-1", speed_kmh, wheel_hz, 0.05, "Front Left"))
            .collect();
        let diagnostic_indices: Vec<usize> = (0..samples.len()).collect();
        let phases: Vec<Option<Phase>> = vec![Some(Phase::Cruise); samples.len()];
        let input = OrderFindingsInput {
            metadata: &metadata,
            samples: &samples,
            diagnostic_indices: &diagnostic_indices,
            phases: &phases,
            tire_circumference_m: Some(tire_circ),
            speed_sufficient: true,
            steady_speed: true,
            speed_stddev_kmh: Some(1.0),
            engine_ref_sufficient: false,
            connected_locations: ["Front Left".to_string()].into_iter().collect(),
        };
        let findings = build_order_findings(&input);
        assert!(!findings.is_empty());
        let f = &findings[0];
        assert_eq!(f.finding_key, "wheel_1x");
        assert!(f.confidence_0_to_1 >= CONFIDENCE_FLOOR && f.confidence_0_to_1 <= CONFIDENCE_CEILING);
    }

    #[test]
    fn engine_finding_suppressed_when_wheel_dominates() {
        // Two findings with near-equal scores: one wheel, one engine. The
        // engine one should be demoted below the wheel's confidence.
        let wheel_finding = Finding {
            finding_id: "F_ORDER".into(),
            finding_key: "wheel_1x".into(),
            suspected_source: "wheel/tire".into(),
            evidence_summary: Evidence::new(I18nRef::new("X")),
            frequency_hz_or_order: "1x wheel".into(),
            representative_hz: Some(12.0),
            amplitude_metric: AmplitudeMetric::vibration_strength_db(20.0),
            confidence_0_to_1: 0.80,
            quick_checks: vec![],
            matched_points: vec![],
            location_hotspot: Default::default(),
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
                match_rate: 0.9,
                global_match_rate: 0.9,
                focused_speed_band: None,
                mean_relative_error: 0.01,
                mean_matched_intensity_db: 20.0,
                mean_noise_floor_db: 0.0,
                vibration_strength_db: 20.0,
                possible_samples: 40,
                matched_samples: 36,
                frequency_correlation: None,
                per_phase_confidence: None,
                phases_with_evidence: 0,
                diffuse_excitation: false,
            },
            next_sensor_move: I18nRef::new("X"),
            actions: vec![],
            ranking_score: 0.9,
        };
        let mut engine_finding = wheel_finding.clone();
        engine_finding.finding_key = "engine_2x".into();
        engine_finding.suspected_source = "engine".into();
        engine_finding.confidence_0_to_1 = 0.78;
        engine_finding.ranking_score = 0.78;

        let findings = vec![(0.9, wheel_finding), (0.78, engine_finding)];
        let result = suppress_engine_aliases(findings);
        let engine = result.iter().find(|f| f.suspected_source == "engine");
        assert!(engine.is_none() || engine.unwrap().confidence_0_to_1 < 0.78);
    }
}
