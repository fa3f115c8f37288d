//! Phase Segmenter (C6).
//!
//! Labels every sample with a driving phase from a smoothed speed signal
//! and hysteresis thresholds, then groups the labels into contiguous
//! segments (spec §4.6).

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    PHASE_ACCEL_THRESHOLD_KMH_PER_S, PHASE_COASTDOWN_RATIO_DEVIATION, PHASE_IDLE_SPEED_KMH,
    PHASE_SPEED_SMOOTHING_WINDOW, PHASE_WEIGHT_CRUISE, PHASE_WEIGHT_DEFAULT, PHASE_WEIGHT_TRANSIENT,
};
use crate::types::{Phase, ProcessedSample};

/// A contiguous run of samples sharing one phase label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSegment {
    pub phase: Phase,
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_t_s: f64,
    pub end_t_s: f64,
    pub speed_min_kmh: f64,
    pub speed_max_kmh: f64,
}

/// Centered moving average over `speed_kmh`, skipping `None` entries; a
/// sample with no neighbors carries its own value forward (or `None`).
fn smooth_speed(samples: &[ProcessedSample], window: usize) -> Vec<Option<f64>> {
    let half = window / 2;
    (0..samples.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(samples.len());
            let vals: Vec<f64> = samples[lo..hi].iter().filter_map(|s| s.speed_kmh).collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        })
        .collect()
}

/// Engine-Hz / wheel-Hz ratio for one sample, when both are derivable.
fn drivetrain_ratio(sample: &ProcessedSample) -> Option<f64> {
    let speed = sample.speed_kmh?;
    let rpm = sample.engine_rpm?;
    if speed <= 0.0 || rpm <= 0.0 {
        return None;
    }
    Some(rpm / speed)
}

/// Per-sample phase labels (spec §4.6). `None` only when speed is entirely
/// unknown for that sample and its smoothing neighborhood.
pub fn classify_phases(samples: &[ProcessedSample]) -> Vec<Option<Phase>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let smoothed = smooth_speed(samples, PHASE_SPEED_SMOOTHING_WINDOW);

    let mut labels = Vec::with_capacity(samples.len());
    let mut baseline_ratio: Option<f64> = None;

    for i in 0..samples.len() {
        let speed = match smoothed[i] {
            Some(v) => v,
            None => {
                labels.push(None);
                continue;
            }
        };

        if speed <= PHASE_IDLE_SPEED_KMH {
            labels.push(Some(Phase::Idle));
            baseline_ratio = None;
            continue;
        }

        let dt_speed = match (i.checked_sub(1), smoothed.get(i.wrapping_sub(1)).copied().flatten()) {
            (Some(_), Some(prev)) => {
                let dt = samples[i].t_s - samples[i - 1].t_s;
                if dt > 0.0 { Some((speed - prev) / dt) } else { None }
            }
            _ => None,
        };

        let phase = match dt_speed {
            Some(d) if d > PHASE_ACCEL_THRESHOLD_KMH_PER_S => {
                baseline_ratio = None;
                Phase::Acceleration
            }
            Some(d) if d < -PHASE_ACCEL_THRESHOLD_KMH_PER_S => {
                let ratio = drivetrain_ratio(&samples[i]);
                let base = baseline_ratio.or(ratio);
                let coasting = match (ratio, base) {
                    (Some(r), Some(b)) if b > 0.0 => ((r - b) / b).abs() > PHASE_COASTDOWN_RATIO_DEVIATION,
                    (None, _) => true,
                    _ => false,
                };
                if baseline_ratio.is_none() {
                    baseline_ratio = ratio;
                }
                if coasting {
                    Phase::CoastDown
                } else {
                    Phase::Deceleration
                }
            }
            _ => {
                baseline_ratio = None;
                Phase::Cruise
            }
        };
        labels.push(Some(phase));
    }

    labels
}

/// Group per-sample labels into contiguous segments, skipping samples with
/// an unknown phase.
pub fn segment_phases(samples: &[ProcessedSample], labels: &[Option<Phase>]) -> Vec<PhaseSegment> {
    let mut segments = Vec::new();
    let mut current: Option<(Phase, usize)> = None;

    for (i, label) in labels.iter().enumerate() {
        match (label, current) {
            (Some(phase), Some((cur_phase, start))) if *phase == cur_phase => {
                current = Some((cur_phase, start));
            }
            (Some(phase), Some((cur_phase, start))) => {
                segments.push(build_segment(samples, cur_phase, start, i - 1));
                current = Some((*phase, i));
            }
            (Some(phase), None) => {
                current = Some((*phase, i));
            }
            (None, Some((cur_phase, start))) => {
                segments.push(build_segment(samples, cur_phase, start, i - 1));
                current = None;
            }
            (None, None) => {}
        }
    }
    if let Some((cur_phase, start)) = current {
        segments.push(build_segment(samples, cur_phase, start, samples.len() - 1));
    }
    segments
}

fn build_segment(samples: &[ProcessedSample], phase: Phase, start: usize, end: usize) -> PhaseSegment {
    let speeds: Vec<f64> = samples[start..=end].iter().filter_map(|s| s.speed_kmh).collect();
    let speed_min = speeds.iter().cloned().fold(f64::INFINITY, f64::min);
    let speed_max = speeds.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    PhaseSegment {
        phase,
        start_idx: start,
        end_idx: end,
        start_t_s: samples[start].t_s,
        end_t_s: samples[end].t_s,
        speed_min_kmh: if speed_min.is_finite() { speed_min } else { 0.0 },
        speed_max_kmh: if speed_max.is_finite() { speed_max } else { 0.0 },
    }
}

/// The amplitude-weighted speed-band estimate up-weights CRUISE samples and
/// down-weights transient phases (spec §4.6).
pub fn phase_weight(phase: Option<Phase>) -> f64 {
    match phase {
        Some(Phase::Cruise) => PHASE_WEIGHT_CRUISE,
        Some(Phase::Acceleration) | Some(Phase::Deceleration) | Some(Phase::CoastDown) => PHASE_WEIGHT_TRANSIENT,
        _ => PHASE_WEIGHT_DEFAULT,
    }
}

/// Non-IDLE sample indexes, for use as the order-findings diagnostic mask.
/// Falls back to every index if fewer than `PHASE_MIN_DIAGNOSTIC_SAMPLES`
/// non-IDLE samples remain.
pub fn diagnostic_mask(labels: &[Option<Phase>]) -> Vec<usize> {
    let non_idle: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, p)| !matches!(p, Some(Phase::Idle)))
        .map(|(i, _)| i)
        .collect();
    if non_idle.len() < crate::config::defaults::PHASE_MIN_DIAGNOSTIC_SAMPLES {
        (0..labels.len()).collect()
    } else {
        non_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t_s: f64, speed_kmh: Option<f64>) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", t_s, "aabbccddeeff", "Front Left");
        s.speed_kmh = speed_kmh;
        s
    }

    #[test]
    fn idle_when_speed_near_zero() {
        let samples: Vec<ProcessedSample> = (0..10).map(|i| sample(i as f64 * 0.25, Some(0.5))).collect();
        let labels = classify_phases(&samples);
        assert!(labels.iter().all(|l| matches!(l, Some(Phase::Idle))));
    }

    #[test]
    fn cruise_at_steady_speed() {
        let samples: Vec<ProcessedSample> = (0..20).map(|i| sample(i as f64 * 0.25, Some(100.0))).collect();
        let labels = classify_phases(&samples);
        assert!(labels[10..].iter().all(|l| matches!(l, Some(Phase::Cruise))));
    }

    #[test]
    fn acceleration_detected_on_ramp() {
        let samples: Vec<ProcessedSample> = (0..20).map(|i| sample(i as f64 * 0.25, Some(i as f64 * 5.0))).collect();
        let labels = classify_phases(&samples);
        assert!(labels[10..].iter().any(|l| matches!(l, Some(Phase::Acceleration))));
    }

    #[test]
    fn segments_group_contiguous_same_phase_runs() {
        let mut samples: Vec<ProcessedSample> = (0..10).map(|i| sample(i as f64 * 0.25, Some(0.0))).collect();
        for (i, s) in samples.iter_mut().enumerate().skip(10 - 5) {
            s.speed_kmh = Some(100.0);
            let _ = i;
        }
        let labels = classify_phases(&samples);
        let segments = segment_phases(&samples, &labels);
        assert!(segments.len() >= 1);
    }

    #[test]
    fn diagnostic_mask_falls_back_when_too_few_non_idle() {
        let labels = vec![Some(Phase::Idle); 10];
        let mask = diagnostic_mask(&labels);
        assert_eq!(mask.len(), 10);
    }

    #[test]
    fn phase_weight_up_weights_cruise() {
        assert_eq!(phase_weight(Some(Phase::Cruise)), PHASE_WEIGHT_CRUISE);
        assert_eq!(phase_weight(Some(Phase::Acceleration)), PHASE_WEIGHT_TRANSIENT);
    }
}
