//! Plot-data bundle (spec §4.10, supplemental per SPEC_FULL.md §E): the
//! series and tables the History UI charts directly, derived from what the
//! pipeline already persists per sample — `top_peaks`, `dominant_freq_hz`,
//! `vibration_strength_db` — rather than from a retained raw spectrum.
//!
//! The pipeline keeps only each tick's top peaks (C2), not its full combined
//! spectrum, so a continuous FFT/spectrogram surface isn't reconstructable
//! after the fact; this bundle covers everything that is.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::defaults::PEAK_TABLE_MAX_ROWS;
use crate::findings::{Finding, MatchedPoint};
use crate::phase::PhaseSegment;
use crate::types::ProcessedSample;

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub t_s: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeakTableRow {
    pub frequency_hz: f64,
    pub mean_amp_g: f64,
    pub occurrences: usize,
    pub persistence: f64,
    pub order_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmpBin {
    pub bin_label: String,
    pub mean_strength_db: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingCurve {
    pub finding_id: String,
    pub matched_points: Vec<MatchedPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotData {
    pub vibration_magnitude_series: Vec<SeriesPoint>,
    pub dominant_freq_series: Vec<SeriesPoint>,
    pub peaks_table: Vec<PeakTableRow>,
    pub amp_vs_speed_bins: Vec<AmpBin>,
    pub amp_vs_phase_bins: Vec<AmpBin>,
    pub finding_curves: Vec<FindingCurve>,
    pub phase_segments: Vec<PhaseSegment>,
}

const SPEED_BIN_WIDTH_KMH: f64 = 20.0;

fn speed_bin_label(speed_kmh: f64) -> String {
    let lo = (speed_kmh / SPEED_BIN_WIDTH_KMH).floor() * SPEED_BIN_WIDTH_KMH;
    format!("{lo:.0}-{:.0}", lo + SPEED_BIN_WIDTH_KMH)
}

/// Top peaks across the run, binned to 2 Hz and ranked by persistence ×
/// mean amplitude (same frequency-bin granularity as the residual-peaks
/// builder, spec §4.8), annotated with any order finding that matches
/// within 2 Hz (mirroring the original report's peak-table/order-label
/// post-processing step).
fn build_peaks_table(samples: &[ProcessedSample], findings: &[Finding]) -> Vec<PeakTableRow> {
    const BIN_HZ: f64 = 2.0;
    let mut bins: HashMap<i64, (f64, Vec<f64>)> = HashMap::new();
    for s in samples {
        for p in &s.top_peaks {
            let key = (p.hz / BIN_HZ).round() as i64;
            let entry = bins.entry(key).or_insert((key as f64 * BIN_HZ, Vec::new()));
            entry.1.push(p.amp);
        }
    }
    let total_ticks = samples.len().max(1) as f64;

    let order_labels: Vec<(f64, String)> = findings
        .iter()
        .filter(|f| f.finding_id.starts_with('F') && !f.is_reference())
        .filter_map(|f| {
            if f.matched_points.is_empty() {
                return None;
            }
            let mean_hz = f.matched_points.iter().map(|p| p.matched_hz).sum::<f64>() / f.matched_points.len() as f64;
            Some((mean_hz, f.frequency_hz_or_order.clone()))
        })
        .collect();

    let mut rows: Vec<PeakTableRow> = bins
        .into_values()
        .map(|(center_hz, amps)| {
            let mean_amp_g = amps.iter().sum::<f64>() / amps.len() as f64;
            let persistence = amps.len() as f64 / total_ticks;
            let order_label = order_labels
                .iter()
                .filter(|(hz, _)| (hz - center_hz).abs() <= BIN_HZ)
                .min_by(|a, b| (a.0 - center_hz).abs().partial_cmp(&(b.0 - center_hz).abs()).unwrap())
                .map(|(_, label)| label.clone());
            PeakTableRow { frequency_hz: center_hz, mean_amp_g, occurrences: amps.len(), persistence, order_label }
        })
        .collect();
    rows.sort_by(|a, b| (b.persistence * b.mean_amp_g).partial_cmp(&(a.persistence * a.mean_amp_g)).unwrap_or(std::cmp::Ordering::Equal));
    rows.truncate(PEAK_TABLE_MAX_ROWS);
    rows
}

fn build_amp_vs_speed_bins(samples: &[ProcessedSample]) -> Vec<AmpBin> {
    let mut by_bin: HashMap<String, Vec<f64>> = HashMap::new();
    for s in samples {
        if let Some(speed) = s.speed_kmh {
            by_bin.entry(speed_bin_label(speed)).or_default().push(s.vibration_strength_db);
        }
    }
    let mut bins: Vec<AmpBin> = by_bin
        .into_iter()
        .map(|(bin_label, vals)| AmpBin { mean_strength_db: vals.iter().sum::<f64>() / vals.len() as f64, sample_count: vals.len(), bin_label })
        .collect();
    bins.sort_by(|a, b| a.bin_label.cmp(&b.bin_label));
    bins
}

fn build_amp_vs_phase_bins(samples: &[ProcessedSample]) -> Vec<AmpBin> {
    let mut by_phase: HashMap<String, Vec<f64>> = HashMap::new();
    for s in samples {
        if let Some(phase) = s.phase {
            by_phase.entry(phase.to_string()).or_default().push(s.vibration_strength_db);
        }
    }
    by_phase
        .into_iter()
        .map(|(bin_label, vals)| AmpBin { mean_strength_db: vals.iter().sum::<f64>() / vals.len() as f64, sample_count: vals.len(), bin_label })
        .collect()
}

pub fn build_plot_data(samples: &[ProcessedSample], phase_segments: &[PhaseSegment], findings: &[Finding]) -> PlotData {
    let vibration_magnitude_series = samples.iter().map(|s| SeriesPoint { t_s: s.t_s, value: s.vibration_strength_db }).collect();
    let dominant_freq_series =
        samples.iter().filter_map(|s| s.dominant_freq_hz.map(|hz| SeriesPoint { t_s: s.t_s, value: hz })).collect();
    let peaks_table = build_peaks_table(samples, findings);
    let amp_vs_speed_bins = build_amp_vs_speed_bins(samples);
    let amp_vs_phase_bins = build_amp_vs_phase_bins(samples);
    let finding_curves = findings
        .iter()
        .filter(|f| !f.matched_points.is_empty())
        .map(|f| FindingCurve { finding_id: f.finding_id.clone(), matched_points: f.matched_points.clone() })
        .collect();

    PlotData {
        vibration_magnitude_series,
        dominant_freq_series,
        peaks_table,
        amp_vs_speed_bins,
        amp_vs_phase_bins,
        finding_curves,
        phase_segments: phase_segments.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn sample_with_peak(t_s: f64, hz: f64, amp: f64) -> ProcessedSample {
        let mut s = ProcessedSample::new("run-1", t_s, "aabbccddeeff", "Front Left");
        s.top_peaks = vec![Peak { hz, amp }];
        s.dominant_freq_hz = Some(hz);
        s.vibration_strength_db = 20.0;
        s
    }

    #[test]
    fn peaks_table_groups_by_2hz_bin_and_ranks_by_persistence() {
        let samples: Vec<ProcessedSample> = (0..10).map(|i| sample_with_peak(i as f64 * 0.25, 12.0, 0.02)).collect();
        let rows = build_peaks_table(&samples, &[]);
        assert_eq!(rows[0].occurrences, 10);
        assert!((rows[0].frequency_hz - 12.0).abs() < 1e-9);
    }

    #[test]
    fn amp_vs_speed_bins_group_into_20kmh_buckets() {
        let mut samples = vec![sample_with_peak(0.0, 12.0, 0.02)];
        samples[0].speed_kmh = Some(85.0);
        let bins = build_amp_vs_speed_bins(&samples);
        assert_eq!(bins[0].bin_label, "80-100");
    }

    #[test]
    fn plot_data_carries_phase_segments_through_unchanged() {
        let samples: Vec<ProcessedSample> = (0..5).map(|i| sample_with_peak(i as f64, 12.0, 0.02)).collect();
        let segments = vec![PhaseSegment {
            phase: crate::types::Phase::Cruise,
            start_idx: 0,
            end_idx: 4,
            start_t_s: 0.0,
            end_t_s: 4.0,
            speed_min_kmh: 50.0,
            speed_max_kmh: 60.0,
        }];
        let plots = build_plot_data(&samples, &segments, &[]);
        assert_eq!(plots.phase_segments.len(), 1);
    }
}
