//! Findings Builder (C7 order-tracking matches, C8 residual peaks).
//!
//! Both sub-builders emit the same `Finding` envelope so the Summary
//! Assembler (C10) can rank and group them without caring which engine
//! produced a given entry.

pub mod helpers;
pub mod orders;
pub mod peaks;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::orders::Action;
use crate::types::I18nRef;

/// An i18n-keyed evidence sentence, with an optional plain-text suffix
/// (e.g. a location hint) appended by the builder that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    #[serde(flatten)]
    pub i18n: I18nRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl Evidence {
    pub fn new(i18n: I18nRef) -> Self {
        Self { i18n, suffix: None }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AmplitudeMetric {
    pub name: &'static str,
    pub value: f64,
    pub units: &'static str,
    pub definition: I18nRef,
}

impl AmplitudeMetric {
    pub fn vibration_strength_db(value: f64) -> Self {
        Self {
            name: "vibration_strength_db",
            value,
            units: "dB",
            definition: I18nRef::new("METRIC_VIBRATION_STRENGTH_DB"),
        }
    }
}

/// One matched (or candidate) sample point carried in a finding's evidence
/// trail, used downstream by the plot-data bundle (C10).
#[derive(Debug, Clone, Serialize)]
pub struct MatchedPoint {
    pub t_s: f64,
    pub speed_kmh: Option<f64>,
    pub predicted_hz: f64,
    pub matched_hz: f64,
    pub rel_error: f64,
    pub amp: f64,
    pub location: String,
    pub phase: Option<String>,
}

/// The spatial localization summary computed for a finding's matched points.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationHotspot {
    pub location: String,
    pub speed_range: String,
    pub dominance_ratio: f64,
    pub localization_confidence: f64,
    pub weak_spatial_separation: bool,
    pub no_wheel_sensors: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseEvidence {
    pub cruise_fraction: f64,
    pub phases_detected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceMetrics {
    pub match_rate: f64,
    pub global_match_rate: f64,
    pub focused_speed_band: Option<String>,
    pub mean_relative_error: f64,
    pub mean_matched_intensity_db: f64,
    pub mean_noise_floor_db: f64,
    pub vibration_strength_db: f64,
    pub possible_samples: usize,
    pub matched_samples: usize,
    pub frequency_correlation: Option<f64>,
    pub per_phase_confidence: Option<BTreeMap<String, f64>>,
    pub phases_with_evidence: usize,
    pub diffuse_excitation: bool,
}

/// The common finding envelope emitted by both the order-tracking (C7) and
/// residual-peak (C8) builders.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub finding_id: String,
    pub finding_key: String,
    pub suspected_source: String,
    pub evidence_summary: Evidence,
    pub frequency_hz_or_order: String,
    /// Mean matched Hz across `matched_points`, in plain numeric form — the
    /// basis for the order/peak frequency-space disjointness invariant
    /// (spec §8.5). `None` for a residual-peak finding (it never shadows
    /// itself).
    pub representative_hz: Option<f64>,
    pub amplitude_metric: AmplitudeMetric,
    pub confidence_0_to_1: f64,
    pub quick_checks: Vec<I18nRef>,
    pub matched_points: Vec<MatchedPoint>,
    pub location_hotspot: LocationHotspot,
    pub strongest_location: Option<String>,
    pub strongest_speed_band: Option<String>,
    pub dominant_phase: Option<String>,
    pub peak_speed_kmh: Option<f64>,
    pub speed_window_kmh: Option<(f64, f64)>,
    pub dominance_ratio: Option<f64>,
    pub localization_confidence: f64,
    pub weak_spatial_separation: bool,
    pub corroborating_locations: usize,
    pub diffuse_excitation: bool,
    pub phase_evidence: Option<PhaseEvidence>,
    pub evidence_metrics: EvidenceMetrics,
    pub next_sensor_move: I18nRef,
    pub actions: Vec<Action>,
    #[serde(rename = "_ranking_score")]
    pub ranking_score: f64,
}

impl Finding {
    /// A non-diagnostic finding flagging a missing reference input (spec §7
    /// `MissingReference`) — analysis continues, but the affected hypothesis
    /// class (wheel order, engine order, speed-gated views) is skipped.
    /// `finding_id` is one of the fixed `REF_*` keys; the Summary Assembler
    /// (C10) places these ahead of the numbered diagnostic findings.
    pub fn reference(finding_id: &'static str, suspected_source: &str, evidence: I18nRef, quick_checks: Vec<I18nRef>) -> Self {
        Self {
            finding_id: finding_id.to_string(),
            finding_key: finding_id.to_lowercase(),
            suspected_source: suspected_source.to_string(),
            evidence_summary: Evidence::new(evidence),
            frequency_hz_or_order: String::new(),
            representative_hz: None,
            amplitude_metric: AmplitudeMetric {
                name: "not_available",
                value: 0.0,
                units: "n/a",
                definition: I18nRef::new("REFERENCE_MISSING_ORDER_SPECIFIC_AMPLITUDE_RANKING_SKIPPED"),
            },
            confidence_0_to_1: 0.0,
            quick_checks: quick_checks.into_iter().take(3).collect(),
            matched_points: Vec::new(),
            location_hotspot: LocationHotspot::default(),
            strongest_location: None,
            strongest_speed_band: None,
            dominant_phase: None,
            peak_speed_kmh: None,
            speed_window_kmh: None,
            dominance_ratio: None,
            localization_confidence: 0.0,
            weak_spatial_separation: true,
            corroborating_locations: 0,
            diffuse_excitation: false,
            phase_evidence: None,
            evidence_metrics: EvidenceMetrics {
                match_rate: 0.0,
                global_match_rate: 0.0,
                focused_speed_band: None,
                mean_relative_error: 0.0,
                mean_matched_intensity_db: 0.0,
                mean_noise_floor_db: 0.0,
                vibration_strength_db: 0.0,
                possible_samples: 0,
                matched_samples: 0,
                frequency_correlation: None,
                per_phase_confidence: None,
                phases_with_evidence: 0,
                diffuse_excitation: false,
            },
            next_sensor_move: I18nRef::new("NO_ACTION_REFERENCE_MISSING"),
            actions: Vec::new(),
            ranking_score: 0.0,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.finding_id.starts_with("REF_")
    }
}
