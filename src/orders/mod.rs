//! Order Reference Engine (C5).
//!
//! Converts a sample's speed/drivetrain context into the predicted
//! frequency of each candidate rotating-order source (wheel, driveshaft,
//! engine) at 1x/2x, and carries the small fixed catalog of mechanical
//! "suspected source" taxonomy (hypotheses, action plans, wheel-focus
//! labels) that the findings builders match against.

use crate::config::defaults::{
    FINAL_DRIVE_UNCERTAINTY_PCT, GEAR_UNCERTAINTY_PCT, ORDER_FUSION_OVERLAP_MIN, SPEED_UNCERTAINTY_PCT,
    TIRE_DIAMETER_UNCERTAINTY_PCT,
};
use crate::types::{I18nRef, ProcessedSample, RunMetadata};

/// `speed_kmh -> wheel rotation Hz`, given a tire circumference in meters.
pub fn wheel_hz_from_speed_kmh(speed_kmh: f64, tire_circumference_m: f64) -> Option<f64> {
    if speed_kmh <= 0.0 || tire_circumference_m <= 0.0 {
        return None;
    }
    let speed_mps = speed_kmh / 3.6;
    Some(speed_mps / tire_circumference_m)
}

fn wheel_hz(sample: &ProcessedSample, tire_circumference_m: Option<f64>) -> Option<f64> {
    let speed_kmh = sample.speed_kmh?;
    let circ = tire_circumference_m?;
    wheel_hz_from_speed_kmh(speed_kmh, circ)
}

fn driveshaft_hz(sample: &ProcessedSample, metadata: &RunMetadata, tire_circumference_m: Option<f64>) -> Option<f64> {
    let base = wheel_hz(sample, tire_circumference_m)?;
    let fd = sample.final_drive_ratio.or(metadata.final_drive_ratio)?;
    if fd <= 0.0 {
        return None;
    }
    Some(base * fd)
}

/// How the engine RPM used to seed `engine_hz` was obtained: a direct sensor
/// reading is preferred; failing that, it's derived from the wheel speed
/// through the known gear/final-drive ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRpmSource {
    Measured,
    EstimatedFromGearRatio,
    Missing,
}

/// Best-effort engine RPM for a sample: prefer a direct reading, else derive
/// it from wheel speed through the current gear ratio and final drive ratio.
fn effective_engine_rpm(
    sample: &ProcessedSample,
    metadata: &RunMetadata,
    tire_circumference_m: Option<f64>,
) -> (Option<f64>, EngineRpmSource) {
    if let Some(rpm) = sample.engine_rpm {
        if rpm > 0.0 {
            return (Some(rpm), EngineRpmSource::Measured);
        }
    }
    let whz = match wheel_hz(sample, tire_circumference_m) {
        Some(v) => v,
        None => return (None, EngineRpmSource::Missing),
    };
    let gear = sample.current_gear_ratio.or(metadata.current_gear_ratio);
    let fd = sample.final_drive_ratio.or(metadata.final_drive_ratio);
    match (gear, fd) {
        (Some(gear), Some(fd)) if gear > 0.0 && fd > 0.0 => {
            let rpm = whz * 60.0 * gear * fd;
            (Some(rpm), EngineRpmSource::EstimatedFromGearRatio)
        }
        _ => (None, EngineRpmSource::Missing),
    }
}

fn engine_hz(sample: &ProcessedSample, metadata: &RunMetadata, tire_circumference_m: Option<f64>) -> (Option<f64>, EngineRpmSource) {
    let (rpm, src) = effective_engine_rpm(sample, metadata, tire_circumference_m);
    match rpm {
        Some(rpm) if rpm > 0.0 => (Some(rpm / 60.0), src),
        _ => (None, src),
    }
}

/// Quadrature-combine of one or more fractional uncertainties (non-positive
/// parts are ignored, matching an unset/unknown input).
pub fn combined_relative_uncertainty(parts: &[f64]) -> f64 {
    parts.iter().filter(|p| **p > 0.0).map(|p| p * p).sum::<f64>().sqrt()
}

fn uncertainty_fraction(value: Option<f64>, default_pct: f64) -> f64 {
    value.unwrap_or(default_pct).max(0.0) / 100.0
}

/// Propagated fractional uncertainty (spec §4.5) for the wheel, drive
/// (wheel + final-drive), and engine (drive + gear) predicted Hz, combined
/// in quadrature from the run's speed/tire/final-drive/gear uncertainty
/// inputs (or their vehicle-spec defaults when unset).
#[derive(Debug, Clone, Copy)]
pub struct OrderUncertainty {
    pub wheel_pct: f64,
    pub drive_pct: f64,
    pub engine_pct: f64,
}

pub fn propagated_uncertainty(metadata: &RunMetadata) -> OrderUncertainty {
    let speed = uncertainty_fraction(metadata.speed_uncertainty_pct, SPEED_UNCERTAINTY_PCT);
    let tire = uncertainty_fraction(metadata.tire_diameter_uncertainty_pct, TIRE_DIAMETER_UNCERTAINTY_PCT);
    let final_drive = uncertainty_fraction(metadata.final_drive_uncertainty_pct, FINAL_DRIVE_UNCERTAINTY_PCT);
    let gear = uncertainty_fraction(metadata.gear_uncertainty_pct, GEAR_UNCERTAINTY_PCT);

    let wheel_pct = combined_relative_uncertainty(&[speed, tire]);
    let drive_pct = combined_relative_uncertainty(&[wheel_pct, final_drive]);
    let engine_pct = combined_relative_uncertainty(&[drive_pct, gear]);
    OrderUncertainty { wheel_pct, drive_pct, engine_pct }
}

/// Whether drive Hz and (1x) engine Hz sit close enough, relative to their
/// combined propagated uncertainty, that they should be reported as one
/// `driveshaft_engine_1x` hypothesis instead of two independent ones.
fn drive_engine_fused(drive_hz: f64, engine_hz: f64, uncertainty: &OrderUncertainty) -> bool {
    if engine_hz <= 0.0 {
        return false;
    }
    let overlap_tol = (uncertainty.drive_pct + uncertainty.engine_pct).max(ORDER_FUSION_OVERLAP_MIN);
    (drive_hz - engine_hz).abs() / engine_hz < overlap_tol
}

/// The mechanical "suspected source" taxonomy an order finding is matched
/// against: wheel/tire, driveline, or engine, each at 1x/2x.
#[derive(Debug, Clone, Copy)]
pub struct OrderHypothesis {
    pub key: &'static str,
    pub suspected_source: &'static str,
    pub order_label_base: &'static str,
    pub order: u32,
    /// Models how much the mechanical path between source and sensor
    /// dampens/broadens the frequency peak. 1.0 = stiff direct coupling
    /// (driveshaft/engine); higher = softer compliant path (wheel through
    /// suspension bushings). Widens match tolerance for compliant paths.
    pub path_compliance: f64,
}

impl OrderHypothesis {
    /// Predicted frequency (Hz) for this hypothesis given one sample's
    /// speed/drivetrain context, a short source tag describing which inputs
    /// fed the prediction ("speed+tire", "speed+tire+final_drive", a
    /// measured/estimated engine-rpm tag, or "missing"), and the propagated
    /// fractional uncertainty (spec §4.5) of the predicted Hz.
    ///
    /// `driveshaft_1x`/`engine_1x` are suppressed (return `None`) whenever
    /// drive Hz and engine Hz overlap within their combined uncertainty —
    /// that case is reported once, as `driveshaft_engine_1x`, instead.
    pub fn predicted_hz(
        &self,
        sample: &ProcessedSample,
        metadata: &RunMetadata,
        tire_circumference_m: Option<f64>,
    ) -> (Option<f64>, &'static str, f64) {
        let uncertainty = propagated_uncertainty(metadata);

        if self.key.starts_with("wheel_") {
            return match wheel_hz(sample, tire_circumference_m) {
                Some(base) => (Some(base * self.order as f64), "speed+tire", uncertainty.wheel_pct),
                None => (None, "missing", 0.0),
            };
        }

        let drive_hz = driveshaft_hz(sample, metadata, tire_circumference_m);
        let (engine_base_hz, engine_src) = engine_hz(sample, metadata, tire_circumference_m);
        let fused = match (drive_hz, engine_base_hz) {
            (Some(d), Some(e)) => drive_engine_fused(d, e, &uncertainty),
            _ => false,
        };

        if self.key == "driveshaft_engine_1x" {
            return match (drive_hz, fused) {
                (Some(d), true) => {
                    (Some(d), "speed+tire+final_drive+engine_fused", uncertainty.drive_pct.max(uncertainty.engine_pct))
                }
                _ => (None, "missing", 0.0),
            };
        }
        if self.key.starts_with("driveshaft_") {
            if self.order == 1 && fused {
                return (None, "missing", 0.0);
            }
            return match drive_hz {
                Some(base) => (Some(base * self.order as f64), "speed+tire+final_drive", uncertainty.drive_pct),
                None => (None, "missing", 0.0),
            };
        }
        if self.key.starts_with("engine_") {
            if self.order == 1 && fused {
                return (None, "missing", 0.0);
            }
            let src_tag = match engine_src {
                EngineRpmSource::Measured => "measured_rpm",
                EngineRpmSource::EstimatedFromGearRatio => "speed+gear_ratio+final_drive",
                EngineRpmSource::Missing => "missing",
            };
            return match engine_base_hz {
                Some(base) => (Some(base * self.order as f64), src_tag, uncertainty.engine_pct),
                None => (None, src_tag, 0.0),
            };
        }
        (None, "missing", 0.0)
    }
}

pub fn order_hypotheses() -> Vec<OrderHypothesis> {
    vec![
        OrderHypothesis { key: "wheel_1x", suspected_source: "wheel/tire", order_label_base: "wheel", order: 1, path_compliance: 1.5 },
        OrderHypothesis { key: "wheel_2x", suspected_source: "wheel/tire", order_label_base: "wheel", order: 2, path_compliance: 1.5 },
        OrderHypothesis { key: "driveshaft_1x", suspected_source: "driveline", order_label_base: "driveshaft", order: 1, path_compliance: 1.0 },
        OrderHypothesis { key: "driveshaft_2x", suspected_source: "driveline", order_label_base: "driveshaft", order: 2, path_compliance: 1.0 },
        OrderHypothesis { key: "engine_1x", suspected_source: "engine", order_label_base: "engine", order: 1, path_compliance: 1.0 },
        OrderHypothesis { key: "engine_2x", suspected_source: "engine", order_label_base: "engine", order: 2, path_compliance: 1.0 },
        // Fused only when drive Hz and engine Hz land within their combined
        // propagated uncertainty of each other (spec §4.5) — see
        // `predicted_hz`'s fusion check.
        OrderHypothesis {
            key: "driveshaft_engine_1x",
            suspected_source: "driveline",
            order_label_base: "driveshaft/engine",
            order: 1,
            path_compliance: 1.0,
        },
    ]
}

/// A language-neutral order label like `"1x wheel"`.
pub fn order_label(order: u32, base: &str) -> String {
    format!("{order}x {base}")
}

/// i18n reference for the wheel-focus hint keyed off a free-text location.
pub fn wheel_focus_from_location(location: &str) -> I18nRef {
    let token = location.trim().to_lowercase().replace(['-', '_'], " ");
    if token.contains("front left wheel") {
        return I18nRef::new("WHEEL_FOCUS_FRONT_LEFT");
    }
    if token.contains("front right wheel") {
        return I18nRef::new("WHEEL_FOCUS_FRONT_RIGHT");
    }
    if token.contains("rear left wheel") {
        return I18nRef::new("WHEEL_FOCUS_REAR_LEFT");
    }
    if token.contains("rear right wheel") {
        return I18nRef::new("WHEEL_FOCUS_REAR_RIGHT");
    }
    if token.contains("rear") || token.contains("trunk") {
        return I18nRef::new("WHEEL_FOCUS_REAR");
    }
    if token.contains("front") || token.contains("engine") {
        return I18nRef::new("WHEEL_FOCUS_FRONT");
    }
    I18nRef::new("WHEEL_FOCUS_ALL")
}

/// One actionable diagnostic step: every free-text field is an [`I18nRef`]
/// resolved by the (out-of-scope) render layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Action {
    pub action_id: &'static str,
    pub what: I18nRef,
    pub why: I18nRef,
    pub confirm: I18nRef,
    pub falsify: I18nRef,
    pub eta: &'static str,
}

/// The fixed action-plan catalog keyed by suspected source (spec §4.4/4.7
/// "action plan"). `strongest_location`/`strongest_speed_band` feed
/// parameters into the i18n hints; `weak_spatial_separation` swaps in a
/// softer fallback rationale when locations didn't clearly distinguish.
pub fn finding_actions_for_source(
    source: &str,
    strongest_location: &str,
    strongest_speed_band: &str,
    weak_spatial_separation: bool,
) -> Vec<Action> {
    let location = strongest_location.trim();
    let speed_band = strongest_speed_band.trim();
    let speed_hint = if speed_band.is_empty() {
        None
    } else {
        Some(I18nRef::new("SPEED_HINT_FOCUS").with("speed_band", speed_band))
    };

    match source {
        "wheel/tire" => {
            let wheel_focus = wheel_focus_from_location(location);
            let location_hint = if location.is_empty() {
                I18nRef::new("LOCATION_HINT_AT_WHEEL_CORNERS")
            } else {
                I18nRef::new("LOCATION_HINT_NEAR").with("location", location)
            };
            let mut what = I18nRef::new("ACTION_WHEEL_BALANCE_WHAT")
                .with("wheel_focus", serde_json::to_value(&wheel_focus).unwrap());
            if let Some(hint) = &speed_hint {
                what = what.with("speed_hint", serde_json::to_value(hint).unwrap());
            }
            vec![
                Action {
                    action_id: "wheel_balance_and_runout",
                    what,
                    why: I18nRef::new("ACTION_WHEEL_BALANCE_WHY").with("location_hint", serde_json::to_value(&location_hint).unwrap()),
                    confirm: I18nRef::new("ACTION_WHEEL_BALANCE_CONFIRM"),
                    falsify: I18nRef::new("ACTION_WHEEL_BALANCE_FALSIFY"),
                    eta: "20-45 min",
                },
                Action {
                    action_id: "wheel_tire_condition",
                    what: I18nRef::new("ACTION_TIRE_CONDITION_WHAT").with("wheel_focus", serde_json::to_value(&wheel_focus).unwrap()),
                    why: I18nRef::new("ACTION_TIRE_CONDITION_WHY"),
                    confirm: I18nRef::new("ACTION_TIRE_CONDITION_CONFIRM"),
                    falsify: I18nRef::new("ACTION_TIRE_CONDITION_FALSIFY"),
                    eta: "10-20 min",
                },
            ]
        }
        "driveline" => {
            let driveline_focus = if location.is_empty() {
                I18nRef::new("LOCATION_HINT_ALONG_DRIVELINE")
            } else {
                I18nRef::new("LOCATION_HINT_NEAR_SHORT").with("location", location)
            };
            vec![
                Action {
                    action_id: "driveline_inspection",
                    what: I18nRef::new("ACTION_DRIVELINE_INSPECTION_WHAT").with("driveline_focus", serde_json::to_value(&driveline_focus).unwrap()),
                    why: I18nRef::new("ACTION_DRIVELINE_INSPECTION_WHY"),
                    confirm: I18nRef::new("ACTION_DRIVELINE_INSPECTION_CONFIRM"),
                    falsify: I18nRef::new("ACTION_DRIVELINE_INSPECTION_FALSIFY"),
                    eta: "20-35 min",
                },
                Action {
                    action_id: "driveline_mounts_and_fasteners",
                    what: I18nRef::new("ACTION_DRIVELINE_MOUNTS_WHAT"),
                    why: I18nRef::new("ACTION_DRIVELINE_MOUNTS_WHY"),
                    confirm: I18nRef::new("ACTION_DRIVELINE_MOUNTS_CONFIRM"),
                    falsify: I18nRef::new("ACTION_DRIVELINE_MOUNTS_FALSIFY"),
                    eta: "10-20 min",
                },
            ]
        }
        "engine" => vec![
            Action {
                action_id: "engine_mounts_and_accessories",
                what: I18nRef::new("ACTION_ENGINE_MOUNTS_WHAT"),
                why: I18nRef::new("ACTION_ENGINE_MOUNTS_WHY"),
                confirm: I18nRef::new("ACTION_ENGINE_MOUNTS_CONFIRM"),
                falsify: I18nRef::new("ACTION_ENGINE_MOUNTS_FALSIFY"),
                eta: "15-30 min",
            },
            Action {
                action_id: "engine_combustion_quality",
                what: I18nRef::new("ACTION_ENGINE_COMBUSTION_WHAT"),
                why: I18nRef::new("ACTION_ENGINE_COMBUSTION_WHY"),
                confirm: I18nRef::new("ACTION_ENGINE_COMBUSTION_CONFIRM"),
                falsify: I18nRef::new("ACTION_ENGINE_COMBUSTION_FALSIFY"),
                eta: "10-20 min",
            },
        ],
        _ => {
            let why = if weak_spatial_separation {
                I18nRef::new("ACTION_GENERAL_WEAK_SPATIAL_WHY")
            } else {
                I18nRef::new("ACTION_GENERAL_FALLBACK_WHY")
            };
            vec![Action {
                action_id: "general_mechanical_inspection",
                what: I18nRef::new("ACTION_GENERAL_INSPECTION_WHAT"),
                why,
                confirm: I18nRef::new("ACTION_GENERAL_INSPECTION_CONFIRM"),
                falsify: I18nRef::new("ACTION_GENERAL_INSPECTION_FALSIFY"),
                eta: "20-35 min",
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(speed_kmh: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", 0.0, "aabbccddeeff", "Front Left");
        s.speed_kmh = Some(speed_kmh);
        s
    }

    #[test]
    fn wheel_hz_matches_physical_formula() {
        let hz = wheel_hz_from_speed_kmh(100.0, 2.0).unwrap();
        let expected = (100.0 / 3.6) / 2.0;
        assert!((hz - expected).abs() < 1e-9);
    }

    #[test]
    fn wheel_hz_none_below_zero_speed() {
        assert!(wheel_hz_from_speed_kmh(0.0, 2.0).is_none());
    }

    #[test]
    fn driveshaft_hz_applies_final_drive() {
        let mut sample = sample_at(100.0);
        sample.final_drive_ratio = Some(3.08);
        let metadata = RunMetadata::new("run-1");
        let hz = driveshaft_hz(&sample, &metadata, Some(2.0)).unwrap();
        let wheel = wheel_hz(&sample, Some(2.0)).unwrap();
        assert!((hz - wheel * 3.08).abs() < 1e-9);

        // Without a final_drive_ratio on sample or metadata it should be None:
        assert!(driveshaft_hz(&sample_at(100.0), &RunMetadata::new("x"), Some(2.0)).is_none());
    }

    #[test]
    fn engine_hz_prefers_measured_rpm() {
        let mut sample = sample_at(100.0);
        sample.engine_rpm = Some(3000.0);
        let metadata = RunMetadata::new("run-1");
        let (hz, src) = engine_hz(&sample, &metadata, Some(2.0));
        assert!((hz.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(src, EngineRpmSource::Measured);
    }

    #[test]
    fn engine_hz_falls_back_to_gear_ratio_estimate() {
        let mut sample = sample_at(100.0);
        sample.current_gear_ratio = Some(0.64);
        sample.final_drive_ratio = Some(3.08);
        let metadata = RunMetadata::new("run-1");
        let (hz, src) = engine_hz(&sample, &metadata, Some(2.0));
        assert!(hz.is_some());
        assert_eq!(src, EngineRpmSource::EstimatedFromGearRatio);
    }

    #[test]
    fn order_hypotheses_has_seven_entries() {
        assert_eq!(order_hypotheses().len(), 7);
    }

    #[test]
    fn combined_relative_uncertainty_ignores_nonpositive_parts() {
        let u = combined_relative_uncertainty(&[0.03, -1.0, 0.0, 0.04]);
        assert!((u - 0.05).abs() < 1e-9);
    }

    #[test]
    fn propagated_uncertainty_uses_metadata_overrides() {
        let mut metadata = RunMetadata::new("run-1");
        metadata.speed_uncertainty_pct = Some(0.0);
        metadata.tire_diameter_uncertainty_pct = Some(0.0);
        metadata.final_drive_uncertainty_pct = Some(0.0);
        metadata.gear_uncertainty_pct = Some(0.0);
        let u = propagated_uncertainty(&metadata);
        assert_eq!(u.wheel_pct, 0.0);
        assert_eq!(u.drive_pct, 0.0);
        assert_eq!(u.engine_pct, 0.0);
    }

    #[test]
    fn drive_engine_fused_hypothesis_wins_when_close() {
        let mut sample = sample_at(100.0);
        sample.final_drive_ratio = Some(1.0);
        sample.current_gear_ratio = Some(1.0);
        sample.engine_rpm = None;
        let metadata = RunMetadata::new("run-1");

        let fused = order_hypotheses().into_iter().find(|h| h.key == "driveshaft_engine_1x").unwrap();
        let (hz, src, uncertainty_pct) = fused.predicted_hz(&sample, &metadata, Some(2.0));
        assert!(hz.is_some());
        assert_eq!(src, "speed+tire+final_drive+engine_fused");
        assert!(uncertainty_pct > 0.0);

        let driveshaft_1x = order_hypotheses().into_iter().find(|h| h.key == "driveshaft_1x").unwrap();
        let (hz, src, _) = driveshaft_1x.predicted_hz(&sample, &metadata, Some(2.0));
        assert!(hz.is_none());
        assert_eq!(src, "missing");

        let engine_1x = order_hypotheses().into_iter().find(|h| h.key == "engine_1x").unwrap();
        let (hz, src, _) = engine_1x.predicted_hz(&sample, &metadata, Some(2.0));
        assert!(hz.is_none());
        assert_eq!(src, "missing");
    }

    #[test]
    fn order_label_formats_as_expected() {
        assert_eq!(order_label(2, "wheel"), "2x wheel");
    }

    #[test]
    fn wheel_focus_matches_front_left() {
        let r = wheel_focus_from_location("Front-Left Wheel");
        assert_eq!(r.key, "WHEEL_FOCUS_FRONT_LEFT");
    }

    #[test]
    fn action_catalog_has_two_entries_for_wheel_source() {
        let actions = finding_actions_for_source("wheel/tire", "Front Left Wheel", "80-100 km/h", false);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_id, "wheel_balance_and_runout");
    }

    #[test]
    fn unknown_source_falls_back_to_general_inspection() {
        let actions = finding_actions_for_source("mystery", "", "", true);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].why.key, "ACTION_GENERAL_WEAK_SPATIAL_WHY");
    }
}
