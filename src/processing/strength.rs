//! Strength-metric extraction from a combined tri-axial spectrum
//! (spec §4.2 steps 4-5), ported from `strength_metrics.py`.

use serde::{Deserialize, Serialize};

use super::FrequencySpectrum;
use crate::config::defaults::{
    PEAK_FLOOR_EXCLUSION_MAX, PEAK_SEPARATION_HZ, PEAK_THRESHOLD_FLOOR_RATIO, STRENGTH_EPSILON_FLOOR_RATIO,
    STRENGTH_EPSILON_MIN_G, TOP_PEAKS_MAX,
};
use crate::types::{Peak, StrengthBucket};

/// Full strength-metric output for one sensor's tick (spec §4.2 "Outputs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthMetrics {
    pub noise_floor_amp_p20_g: f64,
    pub strength_floor_amp_g: f64,
    pub strength_peak_band_rms_amp_g: f64,
    pub strength_db: f64,
    pub strength_bucket: Option<StrengthBucket>,
    pub top_strength_peaks: Vec<Peak>,
}

/// Everything C4/C6/C7/C8 need from one sensor's processing tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorMetrics {
    pub combined_frequencies: Vec<f64>,
    pub combined_magnitudes: Vec<f64>,
    pub axis_rms: (f64, f64, f64),
    pub dominant_freq_hz: Option<f64>,
    pub dominant_peak_amp_g: f64,
    pub strength: StrengthMetrics,
}

/// `sqrt(mean(axis_amp^2))` per bin across the three axes (spec §4.2 step 4).
pub fn combined_spectrum(x: &FrequencySpectrum, y: &FrequencySpectrum, z: &FrequencySpectrum) -> Vec<f64> {
    let n = x.magnitudes.len().min(y.magnitudes.len()).min(z.magnitudes.len());
    (0..n)
        .map(|i| {
            let mean_sq = (x.magnitudes[i].powi(2) + y.magnitudes[i].powi(2) + z.magnitudes[i].powi(2)) / 3.0;
            mean_sq.sqrt()
        })
        .collect()
}

/// Linear-interpolated percentile over a slice (order-independent; sorts a copy).
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// 20th percentile of the combined spectrum excluding bin 0 (DC).
pub fn noise_floor_amp_p20_g(combined: &[f64]) -> f64 {
    if combined.len() <= 1 {
        return 0.0;
    }
    percentile(&combined[1..], 20.0)
}

/// Local maxima above `max(p20 * PEAK_THRESHOLD_FLOOR_RATIO, p20 + epsilon)`.
/// Never considers bin 0 (DC).
fn detect_peak_indexes(combined: &[f64], p20: f64) -> Vec<usize> {
    if combined.len() < 3 {
        return Vec::new();
    }
    let epsilon = (STRENGTH_EPSILON_MIN_G).max(p20 * STRENGTH_EPSILON_FLOOR_RATIO);
    let threshold = (p20 * PEAK_THRESHOLD_FLOOR_RATIO).max(p20 + epsilon);
    let mut peaks = Vec::new();
    for i in 1..combined.len() - 1 {
        if i == 0 {
            continue;
        }
        let prev = combined[i - 1];
        let curr = combined[i];
        let next = combined[i + 1];
        if curr > prev && curr >= next && curr > threshold {
            peaks.push(i);
        }
    }
    peaks
}

/// Median of the combined spectrum outside `±peak_separation_hz` of any peak.
fn strength_floor_amp_g(frequencies: &[f64], combined: &[f64], peak_indexes: &[usize], peak_separation_hz: f64) -> f64 {
    if peak_indexes.is_empty() {
        return median(&combined[1.min(combined.len())..]);
    }
    let peak_hz: Vec<f64> = peak_indexes.iter().map(|&i| frequencies[i]).collect();
    let outside: Vec<f64> = frequencies
        .iter()
        .zip(combined.iter())
        .skip(1)
        .filter(|(f, _)| peak_hz.iter().all(|p| (*f - p).abs() > peak_separation_hz))
        .map(|(_, a)| *a)
        .collect();
    if outside.is_empty() {
        median(&combined[1.min(combined.len())..])
    } else {
        median(&outside)
    }
}

/// `sqrt(mean(combined^2))` within `±bandwidth_hz` of `center_hz`.
fn band_rms_amp_g(frequencies: &[f64], combined: &[f64], center_hz: f64, bandwidth_hz: f64) -> f64 {
    let in_band: Vec<f64> = frequencies
        .iter()
        .zip(combined.iter())
        .filter(|(f, _)| (*f - center_hz).abs() <= bandwidth_hz)
        .map(|(_, a)| *a)
        .collect();
    if in_band.is_empty() {
        return 0.0;
    }
    (in_band.iter().map(|a| a.powi(2)).sum::<f64>() / in_band.len() as f64).sqrt()
}

pub fn strength_db(band_rms_g: f64, floor_g: f64) -> (f64, f64) {
    let epsilon = STRENGTH_EPSILON_MIN_G.max(floor_g * STRENGTH_EPSILON_FLOOR_RATIO);
    let db = 20.0 * ((band_rms_g + epsilon) / (floor_g + epsilon)).log10();
    (db, epsilon)
}

/// Compute the full strength-metric block for one sensor's combined spectrum.
pub fn compute_strength_metrics(
    frequencies: &[f64],
    combined: &[f64],
    peak_bandwidth_hz: f64,
    peak_separation_hz: f64,
) -> StrengthMetrics {
    let p20 = noise_floor_amp_p20_g(combined);
    let peak_idx = detect_peak_indexes(combined, p20);

    // Cap the floor-exclusion set to the top-N local maxima by amplitude;
    // every local maximum still stands as a final-peak candidate below.
    let mut floor_exclusion_idx = peak_idx.clone();
    floor_exclusion_idx.sort_by(|&a, &b| combined[b].partial_cmp(&combined[a]).unwrap_or(std::cmp::Ordering::Equal));
    floor_exclusion_idx.truncate(PEAK_FLOOR_EXCLUSION_MAX);
    let floor = strength_floor_amp_g(frequencies, combined, &floor_exclusion_idx, peak_separation_hz);

    // Candidate peaks with their band-rms and strength_db, strongest first,
    // enforcing pairwise separation >= peak_separation_hz while selecting.
    let mut candidates: Vec<(f64, f64, f64)> = peak_idx
        .iter()
        .map(|&i| {
            let hz = frequencies[i];
            let rms = band_rms_amp_g(frequencies, combined, hz, peak_bandwidth_hz);
            let (db, _) = strength_db(rms, floor);
            (hz, rms, db)
        })
        .collect();
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut top_peaks: Vec<Peak> = Vec::new();
    for (hz, rms, _) in &candidates {
        if top_peaks.iter().any(|p| (p.hz - hz).abs() < peak_separation_hz) {
            continue;
        }
        top_peaks.push(Peak { hz: *hz, amp: *rms });
        if top_peaks.len() >= TOP_PEAKS_MAX {
            break;
        }
    }

    let (peak_band_rms, strength_db_value) = if let Some((hz, _, _)) = candidates.first() {
        let rms = band_rms_amp_g(frequencies, combined, *hz, peak_bandwidth_hz);
        let (db, _) = strength_db(rms, floor);
        (rms, db)
    } else {
        (0.0, crate::config::defaults::SILENCE_DB)
    };

    let bucket = if peak_band_rms <= 0.0 {
        None
    } else {
        super::strength_bands::bucket_for(strength_db_value, peak_band_rms)
    };

    StrengthMetrics {
        noise_floor_amp_p20_g: p20,
        strength_floor_amp_g: floor,
        strength_peak_band_rms_amp_g: peak_band_rms,
        strength_db: strength_db_value,
        strength_bucket: bucket,
        top_strength_peaks: top_peaks,
    }
}

fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v.powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn compute_sensor_metrics(x: &FrequencySpectrum, y: &FrequencySpectrum, z: &FrequencySpectrum) -> SensorMetrics {
    let combined = combined_spectrum(x, y, z);
    let frequencies = x.frequencies.clone();
    let cfg = crate::config::get();
    let strength = compute_strength_metrics(&frequencies, &combined, cfg.peak_bandwidth_hz, cfg.peak_separation_hz);

    let dominant = strength.top_strength_peaks.first().copied();

    SensorMetrics {
        combined_frequencies: frequencies,
        combined_magnitudes: combined,
        axis_rms: (rms(&x.magnitudes), rms(&y.magnitudes), rms(&z.magnitudes)),
        dominant_freq_hz: dominant.map(|p| p.hz),
        dominant_peak_amp_g: dominant.map(|p| p.amp).unwrap_or(0.0),
        strength,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_sorted_values() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&v, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&v, 100.0) - 5.0).abs() < 1e-9);
        assert!((percentile(&v, 50.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn noise_floor_ignores_dc_bin() {
        let combined = vec![100.0, 0.01, 0.02, 0.01, 0.02, 0.01];
        let floor = noise_floor_amp_p20_g(&combined);
        assert!(floor < 1.0, "dc bin at index 0 must not pollute the p20 floor");
    }

    #[test]
    fn strength_db_is_zero_when_band_equals_floor() {
        let (db, _eps) = strength_db(0.01, 0.01);
        assert!(db.abs() < 1e-6);
    }

    #[test]
    fn compute_strength_metrics_detects_injected_tone() {
        let frequencies: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
        let mut combined = vec![0.003; 100];
        // Inject a strong tone around 12 Hz (bin 24).
        combined[24] = 0.05;
        combined[23] = 0.02;
        combined[25] = 0.02;

        let metrics = compute_strength_metrics(&frequencies, &combined, 1.2, 1.2);
        assert!(!metrics.top_strength_peaks.is_empty());
        let top = metrics.top_strength_peaks[0];
        assert!((top.hz - 12.0).abs() < 1.0);
        assert!(metrics.strength_bucket.is_some());
    }

    #[test]
    fn bucket_is_none_when_band_rms_is_zero() {
        let frequencies: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let combined = vec![0.0; 10];
        let metrics = compute_strength_metrics(&frequencies, &combined, 1.2, 1.2);
        assert_eq!(metrics.strength_peak_band_rms_amp_g, 0.0);
        assert!(metrics.strength_bucket.is_none());
    }

    #[test]
    fn top_peaks_respect_pairwise_separation() {
        let frequencies: Vec<f64> = (0..200).map(|i| i as f64 * 0.5).collect();
        let mut combined = vec![0.003; 200];
        // Two close peaks within peak_separation_hz of each other.
        combined[40] = 0.05; // 20 Hz
        combined[41] = 0.048; // 20.5 Hz, too close to 20 Hz
        combined[120] = 0.04; // 60 Hz, far away

        let metrics = compute_strength_metrics(&frequencies, &combined, 1.2, 1.2);
        for i in 0..metrics.top_strength_peaks.len() {
            for j in (i + 1)..metrics.top_strength_peaks.len() {
                let d = (metrics.top_strength_peaks[i].hz - metrics.top_strength_peaks[j].hz).abs();
                assert!(d >= 1.2, "peaks {} and {} are too close: {d}", i, j);
            }
        }
    }
}
