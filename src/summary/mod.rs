//! Summary Assembler (C10).
//!
//! Pulls together everything the earlier stages produced — normalized
//! samples, phase segments, the C7/C8 findings, and the C9 localization
//! table — into the single `RunSummary` the History UI renders (spec
//! §4.10). Pure aggregation: no new diagnostic judgment is made here beyond
//! grouping, ranking, and reference-completeness bookkeeping.

mod plot_data;

pub use plot_data::{build_plot_data, PlotData};

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::config::defaults::{
    ORDER_MIN_CONFIDENCE, OUTLIER_ZSCORE_THRESHOLD, SPEED_COVERAGE_MIN_PCT, SPEED_MIN_POINTS,
    TOP_CAUSE_DROPOFF, TOP_CAUSE_MAX,
};
use crate::findings::helpers::weak_spatial_dominance_threshold;
use crate::findings::Finding;
use crate::localization::{build_test_plan, location_intensity_rows, LocationRow};
use crate::orders::Action;
use crate::phase::PhaseSegment;
use crate::processing::strength_bands::negligible_strength_max_db;
use crate::types::{I18nRef, Phase, ProcessedSample, RunMetadata};

/// (label_key, tone, pct_text) for a 0-1 confidence value (spec §4.10). A
/// `negligible` overall strength band caps a would-be "high" label down to
/// "medium" — a strong order match is still only medium-confidence evidence
/// of a real fault if the vibration itself barely clears the noise floor.
pub fn confidence_label(conf_0_to_1: f64, strength_band_key: Option<&str>) -> (&'static str, &'static str, String) {
    let pct = conf_0_to_1.clamp(0.0, 1.0) * 100.0;
    let pct_text = format!("{pct:.0}%");
    let (mut label_key, mut tone) = if conf_0_to_1 >= 0.70 {
        ("CONFIDENCE_HIGH", "success")
    } else if conf_0_to_1 >= 0.40 {
        ("CONFIDENCE_MEDIUM", "warn")
    } else {
        ("CONFIDENCE_LOW", "neutral")
    };
    if strength_band_key == Some("negligible") && label_key == "CONFIDENCE_HIGH" {
        label_key = "CONFIDENCE_MEDIUM";
        tone = "warn";
    }
    (label_key, tone, pct_text)
}

// ---------------------------------------------------------------------------
// Reference completeness (spec §7 MissingReference)
// ---------------------------------------------------------------------------

pub(crate) fn effective_tire_circumference_m(metadata: &RunMetadata) -> Option<f64> {
    metadata.tire_circumference_m.or_else(|| metadata.tire.map(|t| t.circumference_m()))
}

pub(crate) fn has_engine_reference(metadata: &RunMetadata, samples: &[ProcessedSample]) -> bool {
    samples.iter().any(|s| s.engine_rpm.is_some_and(|rpm| rpm > 0.0))
        || (metadata.final_drive_ratio.is_some_and(|v| v > 0.0) && metadata.current_gear_ratio.is_some_and(|v| v > 0.0))
}

/// `REF_*` findings for each missing-reference condition that blocks a whole
/// hypothesis class, plus whether the run is fully reference-complete.
pub fn reference_findings(
    metadata: &RunMetadata,
    samples: &[ProcessedSample],
    speed_non_null_pct: f64,
    speed_point_count: usize,
) -> (Vec<Finding>, bool) {
    let mut findings = Vec::new();

    let sample_rate_ok = metadata.raw_sample_rate_hz > 0.0;
    if !sample_rate_ok {
        findings.push(Finding::reference(
            "REF_SAMPLE_RATE",
            "unknown",
            I18nRef::new("REF_SAMPLE_RATE_MISSING"),
            vec![I18nRef::new("QUICK_CHECK_CONFIRM_SAMPLE_RATE")],
        ));
    }

    let tire_ok = effective_tire_circumference_m(metadata).is_some();
    if !tire_ok {
        findings.push(Finding::reference(
            "REF_WHEEL",
            "wheel/tire",
            I18nRef::new("REF_TIRE_SPEC_MISSING"),
            vec![I18nRef::new("QUICK_CHECK_RECORD_TIRE_SPEC")],
        ));
    }

    let engine_ok = has_engine_reference(metadata, samples);
    if !engine_ok {
        findings.push(Finding::reference(
            "REF_ENGINE",
            "engine",
            I18nRef::new("REF_ENGINE_RPM_MISSING"),
            vec![I18nRef::new("QUICK_CHECK_CONNECT_OBD_RPM")],
        ));
    }

    let speed_ok = speed_non_null_pct >= SPEED_COVERAGE_MIN_PCT && speed_point_count >= SPEED_MIN_POINTS;
    if !speed_ok {
        findings.push(Finding::reference(
            "REF_SPEED",
            "unknown",
            I18nRef::new("REF_SPEED_COVERAGE_INSUFFICIENT"),
            vec![I18nRef::new("QUICK_CHECK_RECORD_LONGER_OR_FASTER_RUN")],
        ));
    }

    let complete = sample_rate_ok && tire_ok && engine_ok && speed_ok;
    (findings, complete)
}

/// Renumbers a findings list in place: `REF_*` entries keep their fixed IDs
/// and sort first; every other finding is renumbered `F001, F002, …` in
/// confidence-descending order (spec §8 invariant 2).
pub fn assign_finding_ids(findings: &mut Vec<Finding>) {
    findings.sort_by(|a, b| {
        let a_ref = a.is_reference();
        let b_ref = b.is_reference();
        a_ref.cmp(&b_ref).reverse().then_with(|| b.confidence_0_to_1.partial_cmp(&a.confidence_0_to_1).unwrap_or(std::cmp::Ordering::Equal))
    });
    let mut next = 1;
    for finding in findings.iter_mut() {
        if !finding.is_reference() {
            finding.finding_id = format!("F{next:03}");
            next += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Top-cause selection (spec §4.10)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TopCause {
    pub finding_id: String,
    pub source: String,
    pub confidence: f64,
    pub confidence_label_key: &'static str,
    pub confidence_tone: &'static str,
    pub confidence_pct: String,
    pub order: String,
    pub signatures_observed: Vec<String>,
    pub grouped_count: usize,
    pub strongest_location: Option<String>,
    pub dominance_ratio: Option<f64>,
    pub strongest_speed_band: Option<String>,
    pub weak_spatial_separation: bool,
    pub diffuse_excitation: bool,
}

/// Boosts findings with strong CRUISE-phase evidence (steady driving gives
/// the most reliable signature) by up to 15%; findings with no phase
/// evidence get a neutral 0.85 multiplier (spec §4.6/§4.10).
fn phase_ranking_score(finding: &Finding) -> f64 {
    let cruise_fraction = finding.phase_evidence.as_ref().map(|p| p.cruise_fraction).unwrap_or(0.0);
    finding.confidence_0_to_1 * (0.85 + 0.15 * cruise_fraction)
}

/// Groups findings by `suspected_source`, keeps the highest phase-adjusted
/// scorer per group as that group's representative, then applies the
/// drop-off rule: a group more than `TOP_CAUSE_DROPOFF` (percentage points,
/// as a fraction) below the leader is dropped, up to `TOP_CAUSE_MAX` causes.
pub fn select_top_causes(findings: &[Finding], strength_band_key: Option<&str>) -> Vec<TopCause> {
    let diagnostic: Vec<&Finding> = findings.iter().filter(|f| !f.is_reference() && f.confidence_0_to_1 >= ORDER_MIN_CONFIDENCE).collect();
    if diagnostic.is_empty() {
        return Vec::new();
    }

    let mut groups: BTreeMap<String, Vec<&Finding>> = BTreeMap::new();
    for f in &diagnostic {
        groups.entry(f.suspected_source.to_lowercase()).or_default().push(f);
    }

    let mut representatives: Vec<(&Finding, Vec<String>, usize)> = groups
        .into_values()
        .map(|mut members| {
            members.sort_by(|a, b| phase_ranking_score(b).partial_cmp(&phase_ranking_score(a)).unwrap_or(std::cmp::Ordering::Equal));
            let mut signatures = Vec::new();
            for m in &members {
                let sig = m.frequency_hz_or_order.trim().to_string();
                if !sig.is_empty() && !signatures.contains(&sig) {
                    signatures.push(sig);
                }
            }
            (members[0], signatures, members.len())
        })
        .collect();
    representatives.sort_by(|a, b| phase_ranking_score(b.0).partial_cmp(&phase_ranking_score(a.0)).unwrap_or(std::cmp::Ordering::Equal));

    let best_score_pct = phase_ranking_score(representatives[0].0) * 100.0;
    let threshold_pct = best_score_pct - TOP_CAUSE_DROPOFF * 100.0;

    let mut selected = Vec::new();
    for rep in representatives {
        let score_pct = phase_ranking_score(rep.0) * 100.0;
        if score_pct >= threshold_pct || selected.is_empty() {
            selected.push(rep);
        }
        if selected.len() >= TOP_CAUSE_MAX {
            break;
        }
    }

    selected
        .into_iter()
        .map(|(rep, signatures, grouped_count)| {
            let (label_key, tone, pct_text) = confidence_label(rep.confidence_0_to_1, strength_band_key);
            TopCause {
                finding_id: rep.finding_id.clone(),
                source: rep.suspected_source.clone(),
                confidence: rep.confidence_0_to_1,
                confidence_label_key: label_key,
                confidence_tone: tone,
                confidence_pct: pct_text,
                order: rep.frequency_hz_or_order.clone(),
                signatures_observed: signatures,
                grouped_count,
                strongest_location: rep.strongest_location.clone(),
                dominance_ratio: rep.dominance_ratio,
                strongest_speed_band: rep.strongest_speed_band.clone(),
                weak_spatial_separation: rep.weak_spatial_separation,
                diffuse_excitation: rep.diffuse_excitation,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Most-likely-origin block (spec §4.9/§4.10)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MostLikelyOrigin {
    pub location: String,
    pub alternative_locations: Vec<String>,
    pub source: String,
    pub dominance_ratio: Option<f64>,
    pub weak_spatial_separation: bool,
    pub spatial_disagreement: bool,
    pub speed_band: Option<String>,
    pub dominant_phase: Option<String>,
    pub explanation: Vec<I18nRef>,
}

const UNKNOWN: &str = "unknown";

/// `diagnostic_findings` must already be sorted confidence-descending (the
/// same order the findings list carries after [`assign_finding_ids`]).
pub fn most_likely_origin_summary(diagnostic_findings: &[Finding]) -> MostLikelyOrigin {
    let Some(top) = diagnostic_findings.first() else {
        return MostLikelyOrigin {
            location: UNKNOWN.to_string(),
            alternative_locations: Vec::new(),
            source: UNKNOWN.to_string(),
            dominance_ratio: None,
            weak_spatial_separation: true,
            spatial_disagreement: false,
            speed_band: None,
            dominant_phase: None,
            explanation: vec![I18nRef::new("ORIGIN_NO_RANKED_FINDING_AVAILABLE")],
        };
    };

    let primary_location = top.strongest_location.clone().unwrap_or_else(|| UNKNOWN.to_string());
    let mut alternative_locations: Vec<String> = Vec::new();

    let adaptive_threshold = weak_spatial_dominance_threshold(Some(top.corroborating_locations.max(1)));
    let mut weak = top.weak_spatial_separation || top.dominance_ratio.is_some_and(|d| d < adaptive_threshold);

    let mut spatial_disagreement = false;
    if let Some(second) = diagnostic_findings.get(1) {
        let second_loc = second.strongest_location.clone().unwrap_or_default();
        let top_conf = top.confidence_0_to_1;
        if !second_loc.is_empty() && second_loc != primary_location && top_conf > 0.0 && second.confidence_0_to_1 / top_conf >= 0.70 {
            spatial_disagreement = true;
            weak = true;
            if !alternative_locations.contains(&second_loc) {
                alternative_locations.push(second_loc);
            }
        }
    }

    let location = if weak && top.dominance_ratio.is_some_and(|d| d < adaptive_threshold) {
        let mut display = vec![primary_location.clone()];
        for loc in &alternative_locations {
            if !display.contains(loc) {
                display.push(loc.clone());
            }
        }
        display.join(" / ")
    } else {
        primary_location.clone()
    };

    let mut explanation = vec![I18nRef::new("ORIGIN_EXPLANATION_FINDING_1")
        .with("source", top.suspected_source.clone())
        .with("speed_band", top.strongest_speed_band.clone().unwrap_or_else(|| UNKNOWN.to_string()))
        .with("location", location.clone())
        .with("dominance", top.dominance_ratio.map(|d| format!("{d:.2}x")).unwrap_or_else(|| "n/a".to_string()))];
    if weak {
        explanation.push(I18nRef::new("WEAK_SPATIAL_SEPARATION_INSPECT_NEARBY"));
    }
    if let Some(phase) = &top.dominant_phase {
        if matches!(phase.as_str(), "ACCELERATION" | "DECELERATION" | "COAST_DOWN") {
            explanation.push(I18nRef::new("ORIGIN_PHASE_ONSET_NOTE").with("phase", phase.clone()));
        }
    }

    MostLikelyOrigin {
        location,
        alternative_locations,
        source: top.suspected_source.clone(),
        dominance_ratio: top.dominance_ratio,
        weak_spatial_separation: weak,
        spatial_disagreement,
        speed_band: top.strongest_speed_band.clone(),
        dominant_phase: top.dominant_phase.clone(),
        explanation,
    }
}

// ---------------------------------------------------------------------------
// Phase timeline (spec §4.10)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTimelineEntry {
    pub phase: String,
    pub start_t_s: f64,
    pub end_t_s: f64,
    pub speed_min_kmh: f64,
    pub speed_max_kmh: f64,
    pub has_fault_evidence: bool,
}

pub fn build_phase_timeline(phase_segments: &[PhaseSegment], findings: &[Finding]) -> Vec<PhaseTimelineEntry> {
    let mut finding_phases: HashSet<String> = HashSet::new();
    for f in findings {
        if f.is_reference() || f.confidence_0_to_1 < ORDER_MIN_CONFIDENCE {
            continue;
        }
        if let Some(ev) = &f.phase_evidence {
            finding_phases.extend(ev.phases_detected.iter().cloned());
        }
    }

    phase_segments
        .iter()
        .map(|seg| PhaseTimelineEntry {
            phase: seg.phase.to_string(),
            start_t_s: seg.start_t_s,
            end_t_s: seg.end_t_s,
            speed_min_kmh: seg.speed_min_kmh,
            speed_max_kmh: seg.speed_max_kmh,
            has_fault_evidence: finding_phases.contains(&seg.phase.to_string()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Run suitability & data quality (spec §4.10, ambient per SPEC_FULL.md §E)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SuitabilityCheck {
    pub check_key: &'static str,
    pub state: &'static str,
    pub explanation: I18nRef,
}

pub fn build_run_suitability(
    steady_speed: bool,
    speed_sufficient: bool,
    sensor_count: usize,
    reference_complete: bool,
    frames_dropped_delta: u64,
    queue_overflow_delta: u64,
) -> Vec<SuitabilityCheck> {
    let speed_variation_ok = speed_sufficient && !steady_speed;
    let sensor_coverage_ok = sensor_count >= 3;
    let frame_issues = frames_dropped_delta + queue_overflow_delta;

    vec![
        SuitabilityCheck {
            check_key: "SUITABILITY_CHECK_SPEED_VARIATION",
            state: if speed_variation_ok { "pass" } else { "warn" },
            explanation: I18nRef::new(if speed_variation_ok { "SUITABILITY_SPEED_VARIATION_PASS" } else { "SUITABILITY_SPEED_VARIATION_WARN" }),
        },
        SuitabilityCheck {
            check_key: "SUITABILITY_CHECK_SENSOR_COVERAGE",
            state: if sensor_coverage_ok { "pass" } else { "warn" },
            explanation: I18nRef::new(if sensor_coverage_ok { "SUITABILITY_SENSOR_COVERAGE_PASS" } else { "SUITABILITY_SENSOR_COVERAGE_WARN" }),
        },
        SuitabilityCheck {
            check_key: "SUITABILITY_CHECK_REFERENCE_COMPLETENESS",
            state: if reference_complete { "pass" } else { "warn" },
            explanation: I18nRef::new(if reference_complete { "SUITABILITY_REFERENCE_COMPLETENESS_PASS" } else { "SUITABILITY_REFERENCE_COMPLETENESS_WARN" }),
        },
        SuitabilityCheck {
            check_key: "SUITABILITY_CHECK_FRAME_INTEGRITY",
            state: if frame_issues == 0 { "pass" } else { "warn" },
            explanation: if frame_issues == 0 {
                I18nRef::new("SUITABILITY_FRAME_INTEGRITY_PASS")
            } else {
                I18nRef::new("SUITABILITY_FRAME_INTEGRITY_WARN")
                    .with("total_dropped", frames_dropped_delta)
                    .with("total_overflow", queue_overflow_delta)
            },
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeedCoverage {
    pub non_null_pct: f64,
    pub min_kmh: Option<f64>,
    pub max_kmh: Option<f64>,
    pub mean_kmh: Option<f64>,
    pub stddev_kmh: Option<f64>,
    pub count_non_null: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlierSummary {
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var.sqrt())
}

fn outlier_summary(values: &[f64]) -> OutlierSummary {
    let (mean, stddev) = mean_stddev(values);
    let count = if stddev > 0.0 {
        values.iter().filter(|v| ((*v - mean) / stddev).abs() > OUTLIER_ZSCORE_THRESHOLD).count()
    } else {
        0
    };
    OutlierSummary { count, mean, stddev }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccelSanity {
    pub x_mean: f64,
    pub x_variance: f64,
    pub y_mean: f64,
    pub y_variance: f64,
    pub z_mean: f64,
    pub z_variance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataQuality {
    pub required_missing_pct: BTreeMap<&'static str, f64>,
    pub speed_coverage: SpeedCoverage,
    pub accel_sanity: AccelSanity,
    pub outliers_vibration_strength_db: OutlierSummary,
}

fn percent_missing<F: Fn(&ProcessedSample) -> bool>(samples: &[ProcessedSample], is_missing: F) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    100.0 * samples.iter().filter(|s| is_missing(s)).count() as f64 / samples.len() as f64
}

fn build_data_quality(samples: &[ProcessedSample], speed_values: &[f64], speed_non_null_pct: f64) -> DataQuality {
    let mut required_missing_pct = BTreeMap::new();
    required_missing_pct.insert("speed_kmh", percent_missing(samples, |s| s.speed_kmh.is_none()));

    let (mean_kmh, stddev_kmh) = if speed_values.is_empty() { (None, None) } else { let (m, s) = mean_stddev(speed_values); (Some(m), Some(s)) };
    let speed_coverage = SpeedCoverage {
        non_null_pct: speed_non_null_pct,
        min_kmh: speed_values.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v)))),
        max_kmh: speed_values.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v)))),
        mean_kmh,
        stddev_kmh,
        count_non_null: speed_values.len(),
    };

    let xs: Vec<f64> = samples.iter().map(|s| s.accel_x_g).collect();
    let ys: Vec<f64> = samples.iter().map(|s| s.accel_y_g).collect();
    let zs: Vec<f64> = samples.iter().map(|s| s.accel_z_g).collect();
    let (x_mean, x_sd) = mean_stddev(&xs);
    let (y_mean, y_sd) = mean_stddev(&ys);
    let (z_mean, z_sd) = mean_stddev(&zs);

    let strengths: Vec<f64> = samples.iter().map(|s| s.vibration_strength_db).collect();

    DataQuality {
        required_missing_pct,
        speed_coverage,
        accel_sanity: AccelSanity { x_mean, x_variance: x_sd * x_sd, y_mean, y_variance: y_sd * y_sd, z_mean, z_variance: z_sd * z_sd },
        outliers_vibration_strength_db: outlier_summary(&strengths),
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub duration_s: f64,
    pub rows: usize,
    pub findings: Vec<Finding>,
    pub top_causes: Vec<TopCause>,
    pub most_likely_origin: MostLikelyOrigin,
    pub test_plan: Vec<Action>,
    pub phase_timeline: Vec<PhaseTimelineEntry>,
    pub sensor_intensity_by_location: Vec<LocationRow>,
    pub run_suitability: Vec<SuitabilityCheck>,
    pub data_quality: DataQuality,
    pub reference_complete: bool,
    pub plots: PlotData,
}

/// Assembles the full run summary from every stage's output (spec §4.10).
/// `samples` must already carry `phase` labels (C6) and be in `t_s` order;
/// `order_and_peak_findings` is the concatenation of the C7 and C8 builders'
/// raw output, unordered and not yet IDed.
pub fn build_run_summary(
    metadata: &RunMetadata,
    samples: &[ProcessedSample],
    phase_segments: &[PhaseSegment],
    mut order_and_peak_findings: Vec<Finding>,
    speed_non_null_pct: f64,
) -> RunSummary {
    let speed_values: Vec<f64> = samples.iter().filter_map(|s| s.speed_kmh).filter(|v| *v > 0.0).collect();
    let (_, speed_stddev) = mean_stddev(&speed_values);
    let steady_speed = speed_stddev < crate::config::defaults::CONSTANT_SPEED_STDDEV_KMH;

    let (reference_findings_list, reference_complete) = reference_findings(metadata, samples, speed_non_null_pct, speed_values.len());

    let mut findings = reference_findings_list;
    findings.append(&mut order_and_peak_findings);
    assign_finding_ids(&mut findings);

    let diagnostic_only: Vec<Finding> = findings.iter().filter(|f| !f.is_reference()).cloned().collect();

    let amp_values: Vec<f64> = samples.iter().map(|s| s.vibration_strength_db).collect();
    let median_db = if amp_values.is_empty() { None } else { Some(crate::processing::strength::percentile(&amp_values, 50.0)) };
    let overall_band_key = median_db.filter(|db| *db <= negligible_strength_max_db()).map(|_| "negligible");

    let top_causes = select_top_causes(&findings, overall_band_key);
    let most_likely_origin = most_likely_origin_summary(&diagnostic_only);
    let test_plan = build_test_plan(&findings);
    let phase_timeline = build_phase_timeline(phase_segments, &findings);

    let total_run_samples = samples.len();
    let phases: Vec<Option<Phase>> = samples.iter().map(|s| s.phase).collect();
    let sensor_intensity_by_location = location_intensity_rows(samples, &phases, total_run_samples);

    let sensor_count = sensor_intensity_by_location.len();
    let frames_dropped_delta = sensor_intensity_by_location.iter().map(|r| r.frames_dropped_delta).sum();
    let queue_overflow_delta = sensor_intensity_by_location.iter().map(|r| r.queue_overflow_delta).sum();
    let speed_sufficient = speed_non_null_pct >= SPEED_COVERAGE_MIN_PCT && speed_values.len() >= SPEED_MIN_POINTS;
    let run_suitability =
        build_run_suitability(steady_speed, speed_sufficient, sensor_count, reference_complete, frames_dropped_delta, queue_overflow_delta);

    let data_quality = build_data_quality(samples, &speed_values, speed_non_null_pct);
    let plots = build_plot_data(samples, phase_segments, &findings);

    let duration_s = samples.last().map(|s| s.t_s).unwrap_or(0.0);

    RunSummary {
        run_id: metadata.run_id.clone(),
        duration_s,
        rows: samples.len(),
        findings,
        top_causes,
        most_likely_origin,
        test_plan,
        phase_timeline,
        sensor_intensity_by_location,
        run_suitability,
        data_quality,
        reference_complete,
        plots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::{AmplitudeMetric, Evidence, EvidenceMetrics, LocationHotspot, MatchedPoint, PhaseEvidence};

    fn sample(t_s: f64, speed_kmh: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", t_s, "aabbccddeeff", "Front Left");
        s.speed_kmh = Some(speed_kmh);
        s
    }

    fn diagnostic_finding(source: &str, confidence: f64, location: &str) -> Finding {
        Finding {
            finding_id: "F_ORDER".to_string(),
            finding_key: "wheel_1x".to_string(),
            suspected_source: source.to_string(),
            evidence_summary: Evidence::new(I18nRef::new("X")),
            frequency_hz_or_order: "1x wheel".to_string(),
            representative_hz: Some(12.0),
            amplitude_metric: AmplitudeMetric::vibration_strength_db(20.0),
            confidence_0_to_1: confidence,
            quick_checks: vec![],
            matched_points: vec![MatchedPoint {
                t_s: 0.0,
                speed_kmh: Some(90.0),
                predicted_hz: 12.0,
                matched_hz: 12.1,
                rel_error: 0.01,
                amp: 0.05,
                location: location.to_string(),
                phase: Some("CRUISE".to_string()),
            }],
            location_hotspot: LocationHotspot::default(),
            strongest_location: Some(location.to_string()),
            strongest_speed_band: Some("80-100".to_string()),
            dominant_phase: None,
            peak_speed_kmh: Some(90.0),
            speed_window_kmh: None,
            dominance_ratio: Some(1.5),
            localization_confidence: 0.5,
            weak_spatial_separation: false,
            corroborating_locations: 2,
            diffuse_excitation: false,
            phase_evidence: Some(PhaseEvidence { cruise_fraction: 1.0, phases_detected: vec!["CRUISE".to_string()] }),
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
                phases_with_evidence: 1,
                diffuse_excitation: false,
            },
            next_sensor_move: I18nRef::new("X"),
            actions: vec![],
            ranking_score: confidence,
        }
    }

    #[test]
    fn reference_findings_flag_missing_tire_spec() {
        let metadata = RunMetadata::new("run-1");
        let samples = vec![sample(0.0, 50.0)];
        let (refs, complete) = reference_findings(&metadata, &samples, 100.0, 20);
        assert!(refs.iter().any(|f| f.finding_id == "REF_WHEEL"));
        assert!(!complete);
    }

    #[test]
    fn reference_complete_when_all_inputs_present() {
        let mut metadata = RunMetadata::new("run-1");
        metadata.tire_circumference_m = Some(2.0);
        metadata.final_drive_ratio = Some(3.08);
        metadata.current_gear_ratio = Some(1.0);
        let samples: Vec<ProcessedSample> = (0..20).map(|i| sample(i as f64, 50.0)).collect();
        let (refs, complete) = reference_findings(&metadata, &samples, 100.0, 20);
        assert!(refs.is_empty());
        assert!(complete);
    }

    #[test]
    fn assign_finding_ids_orders_ref_before_numbered_and_by_confidence() {
        let mut findings = vec![
            diagnostic_finding("wheel/tire", 0.4, "Front Left"),
            Finding::reference("REF_WHEEL", "wheel/tire", I18nRef::new("X"), vec![]),
            diagnostic_finding("engine", 0.8, "Engine"),
        ];
        assign_finding_ids(&mut findings);
        assert_eq!(findings[0].finding_id, "REF_WHEEL");
        assert_eq!(findings[1].finding_id, "F001");
        assert_eq!(findings[1].suspected_source, "engine");
        assert_eq!(findings[2].finding_id, "F002");
    }

    #[test]
    fn top_causes_drop_weak_groups_beyond_dropoff() {
        let findings = vec![diagnostic_finding("wheel/tire", 0.80, "Front Left"), diagnostic_finding("engine", 0.30, "Engine")];
        let causes = select_top_causes(&findings, None);
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].source, "wheel/tire");
    }

    #[test]
    fn most_likely_origin_falls_back_when_no_findings() {
        let origin = most_likely_origin_summary(&[]);
        assert_eq!(origin.location, "unknown");
        assert!(origin.weak_spatial_separation);
    }

    #[test]
    fn most_likely_origin_flags_spatial_disagreement() {
        let findings = vec![diagnostic_finding("wheel/tire", 0.80, "Front Left"), diagnostic_finding("engine", 0.60, "Engine")];
        let origin = most_likely_origin_summary(&findings);
        assert!(origin.spatial_disagreement);
        assert!(origin.location.contains("Front Left"));
    }

    #[test]
    fn build_run_summary_produces_ided_findings_and_plots() {
        let metadata = RunMetadata::new("run-1");
        let samples: Vec<ProcessedSample> = (0..20).map(|i| sample(i as f64 * 0.25, 50.0 + i as f64)).collect();
        let summary = build_run_summary(&metadata, &samples, &[], vec![diagnostic_finding("wheel/tire", 0.5, "Front Left")], 100.0);
        assert!(summary.findings.iter().any(|f| f.finding_id == "REF_WHEEL"));
        assert!(summary.findings.iter().any(|f| f.finding_id == "F001"));
        assert_eq!(summary.rows, 20);
    }
}
