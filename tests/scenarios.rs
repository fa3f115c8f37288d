//! Scenario tests for the offline analysis pipeline (spec §8): feeds
//! synthetic `ProcessedSample` runs — the same shape the recorder task
//! would have written — through phase segmentation, order/residual-peak
//! findings, and summary assembly, mirroring the black-box sensor
//! scenarios without needing a live UDP/WebSocket harness.

use std::collections::HashSet;

use vibesensor::findings::orders::{build_order_findings, OrderFindingsInput};
use vibesensor::findings::peaks::build_residual_peak_findings;
use vibesensor::phase::{classify_phases, diagnostic_mask, segment_phases};
use vibesensor::summary::build_run_summary;
use vibesensor::types::{Peak, ProcessedSample, RunMetadata, TireSpec};

const TIRE: TireSpec = TireSpec { width_mm: 205.0, aspect_pct: 55.0, rim_in: 16.0 };

fn wheel_hz(speed_kmh: f64, circumference_m: f64) -> f64 {
    (speed_kmh / 3.6) / circumference_m
}

fn make_sample(t_s: f64, location: &str, speed_kmh: f64, peaks: Vec<Peak>) -> ProcessedSample {
    let mut sample = ProcessedSample::new("test-run", t_s, location.to_string(), location.to_string());
    sample.speed_kmh = Some(speed_kmh);
    sample.vibration_strength_db = -10.0;
    sample.strength_floor_amp_g = 0.002;
    sample.top_peaks = peaks;
    sample
}

/// Runs samples through the same stages `pipeline::analysis::process_job`
/// does, without going through the queue.
fn analyze(
    metadata: &RunMetadata,
    mut samples: Vec<ProcessedSample>,
    connected_locations: HashSet<String>,
) -> vibesensor::summary::RunSummary {
    samples.sort_by(|a, b| a.t_s.total_cmp(&b.t_s));
    let labels = classify_phases(&samples);
    for (sample, label) in samples.iter_mut().zip(labels.iter()) {
        sample.phase = *label;
    }
    let phase_segments = segment_phases(&samples, &labels);
    let diagnostic_indices = diagnostic_mask(&labels);

    let speed_values: Vec<f64> = samples.iter().filter_map(|s| s.speed_kmh).filter(|v| *v > 0.0).collect();
    let speed_non_null_pct =
        samples.iter().filter(|s| s.speed_kmh.is_some()).count() as f64 / samples.len() as f64 * 100.0;

    let order_input = OrderFindingsInput {
        metadata,
        samples: &samples,
        diagnostic_indices: &diagnostic_indices,
        phases: &labels,
        tire_circumference_m: metadata.tire_circumference_m,
        speed_sufficient: speed_values.len() >= 8,
        steady_speed: true,
        speed_stddev_kmh: Some(0.5),
        engine_ref_sufficient: samples.iter().any(|s| s.engine_rpm.is_some_and(|rpm| rpm > 0.0))
            || (metadata.final_drive_ratio.is_some_and(|v| v > 0.0)
                && metadata.current_gear_ratio.is_some_and(|v| v > 0.0)),
        connected_locations: connected_locations.clone(),
    };
    let order_findings = build_order_findings(&order_input);
    let peak_findings =
        build_residual_peak_findings(&samples, &diagnostic_indices, &order_findings, &connected_locations);

    let mut findings = order_findings;
    findings.extend(peak_findings);
    build_run_summary(metadata, &samples, &phase_segments, findings, speed_non_null_pct)
}

/// S1: a strong wheel-imbalance tone on the front-left sensor at a constant
/// 100 km/h should be localized to "front-left" with a wheel/tire finding.
#[test]
fn s1_front_left_wheel_imbalance_is_localized() {
    let circumference_m = TIRE.circumference_m();
    let speed_kmh = 100.0;
    let f_wheel = wheel_hz(speed_kmh, circumference_m);

    let mut metadata = RunMetadata::new("s1-run");
    metadata.tire = Some(TIRE);
    metadata.tire_circumference_m = Some(circumference_m);

    let locations = ["front-left", "front-right", "rear-left", "rear-right"];
    let mut samples = Vec::new();
    for i in 0..40 {
        let t_s = i as f64 * 0.25;
        for &loc in &locations {
            let peaks = if loc == "front-left" {
                vec![Peak { hz: f_wheel, amp: 0.3 }]
            } else {
                vec![Peak { hz: 11.0, amp: 0.003 }]
            };
            samples.push(make_sample(t_s, loc, speed_kmh, peaks));
        }
    }

    let connected: HashSet<String> = locations.iter().map(|s| s.to_string()).collect();
    let summary = analyze(&metadata, samples, connected);

    let wheel_finding = summary
        .findings
        .iter()
        .find(|f| f.suspected_source.eq_ignore_ascii_case("wheel/tire"))
        .expect("expected a wheel/tire finding");
    assert_eq!(wheel_finding.strongest_location.as_deref(), Some("front-left"));
}

/// S2: broadband road noise on every sensor, no coherent rotating-order
/// match anywhere, should not produce a wheel/driveline finding.
#[test]
fn s2_rough_road_is_diffuse_not_localized_to_an_order() {
    let circumference_m = TIRE.circumference_m();
    let mut metadata = RunMetadata::new("s2-run");
    metadata.tire = Some(TIRE);
    metadata.tire_circumference_m = Some(circumference_m);

    let locations = ["front-left", "front-right", "rear-left", "rear-right"];
    let mut samples = Vec::new();
    for i in 0..40 {
        let t_s = i as f64 * 0.25;
        for (j, &loc) in locations.iter().enumerate() {
            // Broadband peaks that drift well away from any predicted order
            // frequency, with amplitude comparable across all four sensors.
            let peaks = vec![Peak { hz: 17.0 + j as f64 * 3.0 + (i % 5) as f64, amp: 0.05 }];
            samples.push(make_sample(t_s, loc, 80.0, peaks));
        }
    }

    let connected: HashSet<String> = locations.iter().map(|s| s.to_string()).collect();
    let summary = analyze(&metadata, samples, connected);

    assert!(
        !summary.findings.iter().any(|f| f.suspected_source.eq_ignore_ascii_case("wheel/tire")),
        "rough-road run should not produce a confident wheel/tire order match"
    );
}

/// S3: two independent faults on two different corners at once — a
/// front-left wheel imbalance and a rear-right driveshaft tone — should
/// both surface as distinct findings, each localized to its own corner.
#[test]
fn s3_dual_fault_produces_two_localized_findings() {
    let circumference_m = TIRE.circumference_m();
    let speed_kmh = 100.0;
    let final_drive_ratio = 3.9;
    let f_wheel = wheel_hz(speed_kmh, circumference_m);
    let f_driveshaft = f_wheel * final_drive_ratio;

    let mut metadata = RunMetadata::new("s3-run");
    metadata.tire = Some(TIRE);
    metadata.tire_circumference_m = Some(circumference_m);
    metadata.final_drive_ratio = Some(final_drive_ratio);

    let locations = ["front-left", "front-right", "rear-left", "rear-right"];
    let mut samples = Vec::new();
    for i in 0..40 {
        let t_s = i as f64 * 0.25;
        for &loc in &locations {
            let peaks = match loc {
                "front-left" => vec![Peak { hz: f_wheel, amp: 0.3 }],
                "rear-right" => vec![Peak { hz: f_driveshaft, amp: 0.25 }],
                _ => vec![Peak { hz: 11.0, amp: 0.003 }],
            };
            samples.push(make_sample(t_s, loc, speed_kmh, peaks));
        }
    }

    let connected: HashSet<String> = locations.iter().map(|s| s.to_string()).collect();
    let summary = analyze(&metadata, samples, connected);

    let wheel_finding = summary
        .findings
        .iter()
        .find(|f| f.suspected_source.eq_ignore_ascii_case("wheel/tire"))
        .expect("expected a wheel/tire finding");
    assert_eq!(wheel_finding.strongest_location.as_deref(), Some("front-left"));

    let driveline_finding = summary
        .findings
        .iter()
        .find(|f| f.suspected_source.eq_ignore_ascii_case("driveline"))
        .expect("expected a driveline finding");
    assert_eq!(driveline_finding.strongest_location.as_deref(), Some("rear-right"));
}

/// S4: a constant 100 km/h, single-sensor run with a wheel 1x tone for 20 s.
/// With only one sensor connected, match rate must clear the tighter
/// `ORDER_CONSTANT_SPEED_MIN_MATCH_RATE` (not the lower non-constant
/// threshold), the confidence carries the ×0.75 constant-speed penalty, and
/// `weak_spatial_separation` stays true (a single sensor can never
/// disambiguate location).
#[test]
fn s4_constant_speed_single_sensor_wheel_tone() {
    let circumference_m = TIRE.circumference_m();
    let speed_kmh = 100.0;
    let f_wheel = wheel_hz(speed_kmh, circumference_m);

    let mut metadata = RunMetadata::new("s4-run");
    metadata.tire = Some(TIRE);
    metadata.tire_circumference_m = Some(circumference_m);

    let mut samples = Vec::new();
    for i in 0..80 {
        let t_s = i as f64 * 0.25; // 20 s at 4 Hz
        samples.push(make_sample(t_s, "front-left", speed_kmh, vec![Peak { hz: f_wheel, amp: 0.3 }]));
    }

    let connected: HashSet<String> = ["front-left".to_string()].into_iter().collect();
    let summary = analyze(&metadata, samples, connected);

    let wheel_finding = summary
        .findings
        .iter()
        .find(|f| f.suspected_source.eq_ignore_ascii_case("wheel/tire"))
        .expect("a steady single-sensor wheel tone at constant speed should still surface a finding");
    assert!(
        wheel_finding.weak_spatial_separation,
        "a single connected sensor can never disambiguate location"
    );
    assert!(
        wheel_finding.evidence_metrics.match_rate >= vibesensor::config::defaults::ORDER_CONSTANT_SPEED_MIN_MATCH_RATE,
        "constant-speed match rate must clear the tighter constant-speed threshold"
    );
}

/// S5: a run recorded without a tire spec. Expected: a `REF_WHEEL` reference
/// finding is present, no wheel-order finding is emitted (no tire spec means
/// no wheel/drive Hz can be predicted), but engine findings are still allowed
/// since engine RPM is available independently of tire geometry.
#[test]
fn s5_missing_tire_spec_suppresses_wheel_findings_only() {
    let mut metadata = RunMetadata::new("s5-run");
    // No tire/tire_circumference_m set.

    let mut samples = Vec::new();
    for i in 0..40 {
        let t_s = i as f64 * 0.25;
        let mut sample = make_sample(t_s, "front-left", 90.0, vec![Peak { hz: 45.0, amp: 0.2 }]);
        sample.engine_rpm = Some(45.0 * 60.0);
        samples.push(sample);
    }

    let connected: HashSet<String> = ["front-left".to_string()].into_iter().collect();
    let summary = analyze(&metadata, samples, connected);

    assert!(
        summary.findings.iter().any(|f| f.finding_id == "REF_WHEEL"),
        "a run with no tire spec should surface a REF_WHEEL reference finding"
    );
    assert!(
        !summary.findings.iter().any(|f| f.suspected_source.eq_ignore_ascii_case("wheel/tire")),
        "no tire spec means no wheel-order finding can be computed"
    );
    assert!(
        summary.findings.iter().any(|f| f.suspected_source.eq_ignore_ascii_case("engine")),
        "engine findings do not require a tire spec when engine RPM is measured directly"
    );
}

/// S6: three sequential 20-second recording sessions through `/api/history`
/// equivalents. Expected: three distinct `run_id`s each reach `status=complete`
/// with their own analysis, and deleting one leaves the other two intact.
#[test]
fn s6_three_runs_listed_and_one_deletion_leaves_others_intact() {
    if !vibesensor::config::is_initialized() {
        vibesensor::config::init(vibesensor::config::Config::default());
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let history = vibesensor::storage::HistoryStore::open(dir.path()).expect("open history store");

    let mut run_ids = Vec::new();
    for i in 0..3 {
        let run_id = format!("s6-run-{i}");
        let mut metadata = RunMetadata::new(run_id.clone());
        metadata.status = vibesensor::types::RunStatus::Complete;
        let samples = vec![make_sample(0.0, "front-left", 80.0, vec![])];
        let connected: HashSet<String> = ["front-left".to_string()].into_iter().collect();
        let summary = analyze(&metadata, samples, connected);
        history.save_run_metadata(&metadata).expect("save_run_metadata should succeed");
        history.save_run_summary(&summary).expect("save_run_summary should succeed");
        run_ids.push(run_id);
    }

    let listed = history.list_runs().expect("list_runs should succeed");
    assert_eq!(listed.len(), 3);
    let listed_ids: HashSet<String> = listed.iter().map(|r| r.run_id.clone()).collect();
    assert_eq!(listed_ids, run_ids.iter().cloned().collect());
    assert!(listed.iter().all(|r| r.status == vibesensor::types::RunStatus::Complete));

    history.delete_run(&run_ids[1]).expect("delete_run should succeed");
    let remaining = history.list_runs().expect("list_runs should succeed");
    let remaining_ids: HashSet<String> = remaining.iter().map(|r| r.run_id.clone()).collect();
    assert_eq!(remaining_ids, [run_ids[0].clone(), run_ids[2].clone()].into_iter().collect());
}
