//! Localization & Test-Plan Engine (C9, spec §4.9).
//!
//! Two independent outputs, both derived from the normalized sample list and
//! the findings C7/C8 already produced:
//!
//! - a per-location intensity table (`LocationRow`), used by the summary's
//!   "sensor intensity" view;
//! - a deduplicated, confidence-ordered test plan merging every finding's
//!   recommended actions.

use std::collections::HashMap;

use crate::config::defaults::SAMPLE_COVERAGE_WARNING_RATIO;
use crate::findings::Finding;
use crate::orders::Action;
use crate::processing::strength::percentile;
use crate::types::{Phase, ProcessedSample, StrengthBucket};

/// Per-location vibration-intensity summary (spec §4.9).
#[derive(Debug, Clone, serde::Serialize)]
pub struct LocationRow {
    pub location: String,
    pub sample_count: usize,
    pub mean_strength_db: f64,
    pub p50_strength_db: f64,
    pub p95_strength_db: f64,
    pub max_strength_db: f64,
    pub frames_dropped_delta: u64,
    pub queue_overflow_delta: u64,
    /// Percent of this location's samples in each bucket, `l1`..`l5`.
    pub bucket_distribution_pct: HashMap<&'static str, f64>,
    /// Mean `vibration_strength_db` per phase label this location saw.
    pub per_phase_intensity_db: HashMap<String, f64>,
    pub partial_coverage: bool,
    pub sample_coverage_warning: bool,
}

/// Builds one [`LocationRow`] per distinct `client_name`, sorted so
/// fully-covered locations with the highest P95 lead (spec §4.9).
pub fn location_intensity_rows(samples: &[ProcessedSample], phases: &[Option<Phase>], total_run_samples: usize) -> Vec<LocationRow> {
    let mut by_location: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, s) in samples.iter().enumerate() {
        by_location.entry(s.client_name.clone()).or_default().push(i);
    }

    let max_count = by_location.values().map(Vec::len).max().unwrap_or(0);

    let mut rows: Vec<LocationRow> = by_location
        .into_iter()
        .map(|(location, indices)| {
            let dbs: Vec<f64> = indices.iter().map(|&i| samples[i].vibration_strength_db).collect();
            let mean = if dbs.is_empty() { 0.0 } else { dbs.iter().sum::<f64>() / dbs.len() as f64 };

            let mut bucket_counts: HashMap<&'static str, usize> = HashMap::new();
            for &i in &indices {
                if let Some(bucket) = samples[i].strength_bucket {
                    *bucket_counts.entry(bucket.as_key()).or_insert(0) += 1;
                }
            }
            let bucket_distribution_pct: HashMap<&'static str, f64> = bucket_counts
                .into_iter()
                .map(|(k, c)| (k, 100.0 * c as f64 / indices.len().max(1) as f64))
                .collect();

            let mut phase_dbs: HashMap<String, Vec<f64>> = HashMap::new();
            for &i in &indices {
                if let Some(Some(phase)) = phases.get(i) {
                    phase_dbs.entry(phase.to_string()).or_default().push(samples[i].vibration_strength_db);
                }
            }
            let per_phase_intensity_db: HashMap<String, f64> = phase_dbs
                .into_iter()
                .map(|(phase, vals)| (phase, vals.iter().sum::<f64>() / vals.len() as f64))
                .collect();

            let frames_dropped_delta = indices
                .first()
                .zip(indices.last())
                .map(|(&first, &last)| samples[last].frames_dropped.saturating_sub(samples[first].frames_dropped))
                .unwrap_or(0);
            let queue_overflow_delta = indices
                .first()
                .zip(indices.last())
                .map(|(&first, &last)| samples[last].queue_overflow.saturating_sub(samples[first].queue_overflow))
                .unwrap_or(0);

            LocationRow {
                location,
                sample_count: indices.len(),
                mean_strength_db: mean,
                p50_strength_db: percentile(&dbs, 50.0),
                p95_strength_db: percentile(&dbs, 95.0),
                max_strength_db: dbs.iter().cloned().fold(f64::NEG_INFINITY, f64::max).max(0.0),
                frames_dropped_delta,
                queue_overflow_delta,
                bucket_distribution_pct,
                per_phase_intensity_db,
                partial_coverage: total_run_samples > 0 && indices.len() < total_run_samples,
                sample_coverage_warning: max_count > 0 && (indices.len() as f64) <= SAMPLE_COVERAGE_WARNING_RATIO * max_count as f64,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.partial_coverage
            .cmp(&b.partial_coverage)
            .then(b.p95_strength_db.partial_cmp(&a.p95_strength_db).unwrap_or(std::cmp::Ordering::Equal))
    });
    rows
}

/// Merges every finding's recommended actions into one deduplicated,
/// priority-ordered test plan (spec §4.9). Findings are assumed already
/// sorted by confidence descending (the Findings Builders' own output
/// order); the top finding's actions lead, and later duplicates
/// (by `action_id`) are dropped.
pub fn build_test_plan(findings: &[Finding]) -> Vec<Action> {
    let mut seen = std::collections::HashSet::new();
    let mut plan = Vec::new();
    for finding in findings {
        for action in &finding.actions {
            if seen.insert(action.action_id) {
                plan.push(action.clone());
            }
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(location: &str, db: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", 0.0, "aabbccddeeff", location);
        s.vibration_strength_db = db;
        s
    }

    #[test]
    fn rows_group_by_location_and_compute_percentiles() {
        let samples = vec![sample("Front Left", 10.0), sample("Front Left", 20.0), sample("Front Right", 5.0)];
        let phases = vec![None; 3];
        let rows = location_intensity_rows(&samples, &phases, 3);
        let fl = rows.iter().find(|r| r.location == "Front Left").unwrap();
        assert_eq!(fl.sample_count, 2);
        assert!((fl.mean_strength_db - 15.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_location_flagged_with_coverage_warning() {
        let mut samples: Vec<ProcessedSample> = (0..20).map(|_| sample("Front Left", 10.0)).collect();
        samples.push(sample("Trunk", 5.0));
        let phases = vec![None; samples.len()];
        let rows = location_intensity_rows(&samples, &phases, samples.len());
        let trunk = rows.iter().find(|r| r.location == "Trunk").unwrap();
        assert!(trunk.sample_coverage_warning);
    }

    #[test]
    fn fully_covered_locations_with_higher_p95_lead() {
        let mut samples: Vec<ProcessedSample> = (0..10).map(|_| sample("Front Left", 30.0)).collect();
        samples.extend((0..10).map(|_| sample("Front Right", 10.0)));
        let phases = vec![None; samples.len()];
        let rows = location_intensity_rows(&samples, &phases, samples.len());
        assert_eq!(rows[0].location, "Front Left");
    }

    #[test]
    fn test_plan_deduplicates_actions_across_findings() {
        use crate::findings::{AmplitudeMetric, Evidence, EvidenceMetrics, LocationHotspot};
        use crate::orders::finding_actions_for_source;
        use crate::types::I18nRef;

        let actions = finding_actions_for_source("wheel/tire", "Front Left Wheel", "80-100 km/h", false);
        let make_finding = |id: &str| Finding {
            finding_id: id.to_string(),
            finding_key: "wheel_1x".to_string(),
            suspected_source: "wheel/tire".to_string(),
            evidence_summary: Evidence::new(I18nRef::new("X")),
            frequency_hz_or_order: "1x wheel".to_string(),
            representative_hz: Some(12.0),
            amplitude_metric: AmplitudeMetric::vibration_strength_db(20.0),
            confidence_0_to_1: 0.8,
            quick_checks: vec![],
            matched_points: vec![],
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
            actions: actions.clone(),
            ranking_score: 0.8,
        };
        let findings = vec![make_finding("F001"), make_finding("F002")];
        let plan = build_test_plan(&findings);
        assert_eq!(plan.len(), actions.len(), "identical actions across findings must be deduplicated");
    }
}
