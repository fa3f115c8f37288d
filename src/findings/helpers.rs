//! Shared utilities for the order-tracking (C7) and residual-peak (C8)
//! builders: location/speed-bin labeling, correlation, the amplitude-weighted
//! speed profile, and per-finding spatial localization.

use std::collections::{HashMap, HashSet};

use crate::types::ProcessedSample;

use super::{LocationHotspot, MatchedPoint};

/// A sensor's `client_name` doubles as its human-readable location label.
pub fn location_label(sample: &ProcessedSample) -> String {
    sample.client_name.clone()
}

const SPEED_BINS: &[(f64, f64, &str)] = &[
    (0.0, 20.0, "0-20"),
    (20.0, 40.0, "20-40"),
    (40.0, 60.0, "40-60"),
    (60.0, 80.0, "60-80"),
    (80.0, 100.0, "80-100"),
    (100.0, 120.0, "100-120"),
    (120.0, 140.0, "120-140"),
    (140.0, f64::INFINITY, "140+"),
];

/// 20 km/h-wide speed bucket label for a given speed.
pub fn speed_bin_label(speed_kmh: f64) -> String {
    for (lo, hi, label) in SPEED_BINS {
        if speed_kmh >= *lo && speed_kmh < *hi {
            return (*label).to_string();
        }
    }
    "unknown".to_string()
}

/// Sort key so speed bins order low-to-high rather than lexically.
pub fn speed_bin_sort_key(label: &str) -> f64 {
    SPEED_BINS
        .iter()
        .find(|(_, _, l)| *l == label)
        .map(|(lo, _, _)| *lo)
        .unwrap_or(f64::MAX)
}

/// Whether `location` names one of the four wheel corners, by either an
/// explicit "wheel" mention or the usual front/rear + left/right corner
/// naming (`front_left`, `FL`, `rear-right`, `RR`, ...).
fn is_wheel_corner(location: &str) -> bool {
    let token = location.trim().to_lowercase().replace(['-', '_'], " ");
    if token.contains("wheel") {
        return true;
    }
    let has_side = token.contains("front") || token.contains("rear");
    let has_corner = token.contains("left") || token.contains("right");
    if has_side && has_corner {
        return true;
    }
    matches!(token.as_str(), "fl" | "fr" | "rl" | "rr")
}

/// Dominance ratio below which two candidate locations are too close to call
/// (spec §4.9/§4.10). Scales with how many sensors were connected: more
/// sensors raise the bar, since chance imbalance grows with location count.
pub fn weak_spatial_dominance_threshold(location_count: Option<usize>) -> f64 {
    let n = location_count.unwrap_or(2).max(1) as f64;
    (1.2 + 0.1 * (n - 2.0).max(0.0)).min(2.0)
}

/// Pearson correlation magnitude, clamped to `[0, 1]`. `None` when either
/// series is degenerate (fewer than 2 points, or zero variance).
pub fn corr_abs_clamped(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    Some(r.abs().clamp(0.0, 1.0))
}

/// Amplitude-weighted speed profile over a finding's matched (speed, amp)
/// points: the weighted-centroid peak speed, the observed speed window, and
/// the speed bin carrying the most weighted amplitude. `phase_weights`
/// up-weights CRUISE points and down-weights transient phases (spec §4.6);
/// `allowed_speed_bins`, when set, restricts the estimate to those bins
/// (used when a hypothesis was only rescued via a focused high-speed band).
pub fn speed_profile_from_points(
    points: &[(f64, f64)],
    allowed_speed_bins: Option<&[String]>,
    phase_weights: Option<&[f64]>,
) -> (Option<f64>, Option<(f64, f64)>, Option<String>) {
    if points.is_empty() {
        return (None, None, None);
    }
    let mut filtered: Vec<(f64, f64, f64)> = Vec::new();
    for (i, (speed, amp)) in points.iter().enumerate() {
        if let Some(allowed) = allowed_speed_bins {
            let bin = speed_bin_label(*speed);
            if !allowed.iter().any(|b| b == &bin) {
                continue;
            }
        }
        let w = phase_weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0);
        filtered.push((*speed, *amp, w));
    }
    if filtered.is_empty() {
        filtered = points.iter().map(|(s, a)| (*s, *a, 1.0)).collect();
    }

    let total_weight: f64 = filtered.iter().map(|(_, a, w)| a * w).sum();
    let peak_speed = if total_weight > 0.0 {
        Some(filtered.iter().map(|(s, a, w)| s * a * w).sum::<f64>() / total_weight)
    } else {
        None
    };

    let speeds_lo = filtered.iter().map(|(s, _, _)| *s).fold(f64::INFINITY, f64::min);
    let speeds_hi = filtered.iter().map(|(s, _, _)| *s).fold(f64::NEG_INFINITY, f64::max);
    let window = if speeds_lo.is_finite() && speeds_hi.is_finite() {
        Some((speeds_lo, speeds_hi))
    } else {
        None
    };

    let mut bin_weight: HashMap<String, f64> = HashMap::new();
    for (s, a, w) in &filtered {
        *bin_weight.entry(speed_bin_label(*s)).or_insert(0.0) += a * w;
    }
    let strongest_band = bin_weight
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(k, _)| k);

    (peak_speed, window, strongest_band)
}

/// Spatial localization summary for a finding: which location carries the
/// matched evidence, how dominant it is over the runner-up, and whether that
/// dominance is strong enough to call the separation clear (spec §4.9).
/// `relevant_speed_bins`, when set, restricts which matched points count
/// (used to keep low-speed road noise from diluting a high-speed hotspot).
pub fn location_speedbin_summary(
    matched_points: &[MatchedPoint],
    relevant_speed_bins: Option<&[String]>,
    connected_locations: &HashSet<String>,
    suspected_source: &str,
) -> (Option<String>, LocationHotspot) {
    let restricted: Vec<&MatchedPoint> = matched_points
        .iter()
        .filter(|p| match relevant_speed_bins {
            Some(bins) => p
                .speed_kmh
                .map(|s| bins.iter().any(|b| b == &speed_bin_label(s)))
                .unwrap_or(false),
            None => true,
        })
        .collect();
    let source: Vec<&MatchedPoint> = if restricted.is_empty() {
        matched_points.iter().collect()
    } else {
        restricted
    };

    let mut by_location: HashMap<String, Vec<f64>> = HashMap::new();
    for p in &source {
        by_location.entry(p.location.clone()).or_default().push(p.amp);
    }
    let mut ranked: Vec<(String, f64)> = by_location
        .into_iter()
        .map(|(loc, amps)| (loc, amps.iter().sum::<f64>() / amps.len() as f64))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let no_wheel_sensors =
        suspected_source == "wheel/tire" && !connected_locations.iter().any(|l| is_wheel_corner(l));

    let (top_location, top_amp) = ranked.first().cloned().unwrap_or_default();
    let dominance_ratio = if ranked.len() >= 2 {
        top_amp / ranked[1].1.max(1e-9)
    } else {
        1.0
    };
    let threshold = weak_spatial_dominance_threshold(Some(connected_locations.len()));
    let mut weak_spatial_separation = ranked.len() < 2 || dominance_ratio < threshold;
    let localization_confidence = if ranked.len() < 2 {
        0.05
    } else {
        (0.10 + 0.15 * (dominance_ratio - 1.0)).clamp(0.05, 1.0)
    };
    if no_wheel_sensors {
        weak_spatial_separation = true;
    }

    let (lo, hi) = source
        .iter()
        .filter_map(|p| p.speed_kmh)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
    let speed_range = if lo.is_finite() { format!("{lo:.0}-{hi:.0} km/h") } else { String::new() };

    let hotspot = LocationHotspot {
        location: top_location.clone(),
        speed_range: speed_range.clone(),
        dominance_ratio,
        localization_confidence,
        weak_spatial_separation,
        no_wheel_sensors,
    };
    let location_line = if top_location.is_empty() {
        None
    } else {
        Some(format!("near {top_location} ({speed_range})"))
    };
    (location_line, hotspot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_bin_labels_are_ordered_correctly() {
        assert_eq!(speed_bin_label(45.0), "40-60");
        assert_eq!(speed_bin_label(150.0), "140+");
        assert!(speed_bin_sort_key("0-20") < speed_bin_sort_key("100-120"));
    }

    #[test]
    fn corr_none_when_degenerate() {
        assert!(corr_abs_clamped(&[1.0], &[1.0]).is_none());
        assert!(corr_abs_clamped(&[1.0, 1.0, 1.0], &[2.0, 3.0, 4.0]).is_none());
    }

    #[test]
    fn corr_detects_perfect_linear_relationship() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0];
        let r = corr_abs_clamped(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn speed_profile_weights_toward_cruise() {
        let points = vec![(50.0, 1.0), (90.0, 1.0)];
        let weights = vec![0.3, 3.0];
        let (peak, _, band) = speed_profile_from_points(&points, None, Some(&weights));
        assert!(peak.unwrap() > 70.0);
        assert_eq!(band.unwrap(), "80-100");
    }

    #[test]
    fn single_location_has_low_localization_confidence() {
        let points = vec![MatchedPoint {
            t_s: 0.0,
            speed_kmh: Some(90.0),
            predicted_hz: 10.0,
            matched_hz: 10.1,
            rel_error: 0.01,
            amp: 0.02,
            location: "Front Left".to_string(),
            phase: None,
        }];
        let connected: HashSet<String> = ["Front Left".to_string()].into_iter().collect();
        let (_, hotspot) = location_speedbin_summary(&points, None, &connected, "wheel/tire");
        assert!(hotspot.localization_confidence < 0.10);
    }

    #[test]
    fn dominant_location_wins_over_weaker_second() {
        let points = vec![
            MatchedPoint {
                t_s: 0.0,
                speed_kmh: Some(90.0),
                predicted_hz: 10.0,
                matched_hz: 10.1,
                rel_error: 0.01,
                amp: 0.05,
                location: "Front Left".to_string(),
                phase: None,
            },
            MatchedPoint {
                t_s: 0.1,
                speed_kmh: Some(91.0),
                predicted_hz: 10.0,
                matched_hz: 10.0,
                rel_error: 0.0,
                amp: 0.01,
                location: "Front Right".to_string(),
                phase: None,
            },
        ];
        let connected: HashSet<String> = ["Front Left".to_string(), "Front Right".to_string()].into_iter().collect();
        let (_, hotspot) = location_speedbin_summary(&points, None, &connected, "wheel/tire");
        assert_eq!(hotspot.location, "Front Left");
        assert!(hotspot.dominance_ratio > 1.0);
    }

    #[test]
    fn no_wheel_sensors_forces_weak_spatial_separation() {
        let points = vec![MatchedPoint {
            t_s: 0.0,
            speed_kmh: Some(90.0),
            predicted_hz: 10.0,
            matched_hz: 10.0,
            rel_error: 0.0,
            amp: 0.05,
            location: "Trunk".to_string(),
            phase: None,
        }];
        let connected: HashSet<String> = ["Trunk".to_string(), "Cabin".to_string()].into_iter().collect();
        let (_, hotspot) = location_speedbin_summary(&points, None, &connected, "wheel/tire");
        assert!(hotspot.no_wheel_sensors);
        assert!(hotspot.weak_spatial_separation);
    }
}
