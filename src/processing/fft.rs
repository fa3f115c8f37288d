//! Windowed FFT using rustfft, pre-planned for repeated per-tick use.

use ndarray::Array1;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::{FrequencySpectrum, ProcessingError};

/// FFT processor with a pre-planned transform, one per sensor (spec §9:
/// "an owned `FFTPlanCache` member of the processor", here folded directly
/// into one processor instance per sensor rather than a separate cache
/// keyed by sample rate).
pub struct FftProcessor {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    size: usize,
    sampling_rate: f64,
}

impl FftProcessor {
    /// `size` is used exactly (the caller, C2, is responsible for passing
    /// `fft_window_size`; this processor does not round up to a power of
    /// two beyond what rustfft itself requires internally).
    pub fn new(size: usize, sampling_rate: f64) -> Result<Self, ProcessingError> {
        if sampling_rate <= 0.0 {
            return Err(ProcessingError::InvalidSamplingRate(sampling_rate));
        }
        if size == 0 {
            return Err(ProcessingError::InsufficientData { needed: 1, available: 0 });
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let window = hann_window(size);

        Ok(Self { fft, window, size, sampling_rate })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn frequency_resolution(&self) -> f64 {
        self.sampling_rate / self.size as f64
    }

    /// Apply the Hann window, compute the real FFT, magnitude-normalize by
    /// `2 / sum(window)` (halving DC and Nyquist), then clip to
    /// `[min_hz, max_hz]` (spec §4.2 steps 2-3).
    pub fn compute(
        &self,
        signal: &[f64],
        min_hz: f64,
        max_hz: f64,
    ) -> Result<FrequencySpectrum, ProcessingError> {
        if signal.len() < self.size {
            return Err(ProcessingError::InsufficientData {
                needed: self.size,
                available: signal.len(),
            });
        }

        let window_sum: f64 = self.window.iter().sum();
        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .take(self.size)
            .zip(self.window.iter())
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let n_positive = self.size / 2 + 1;
        let freq_resolution = self.frequency_resolution();

        let all_frequencies: Vec<f64> = (0..n_positive).map(|i| i as f64 * freq_resolution).collect();
        let all_magnitudes: Vec<f64> = buffer
            .iter()
            .take(n_positive)
            .enumerate()
            .map(|(i, c)| {
                let scale = if i == 0 || i == n_positive - 1 {
                    1.0 / window_sum
                } else {
                    2.0 / window_sum
                };
                c.norm() * scale
            })
            .collect();

        let mut frequencies = Vec::new();
        let mut magnitudes = Vec::new();
        for (f, m) in all_frequencies.into_iter().zip(all_magnitudes.into_iter()) {
            if f >= min_hz && f <= max_hz {
                frequencies.push(f);
                magnitudes.push(m);
            }
        }

        let rms = (magnitudes.iter().map(|x| x.powi(2)).sum::<f64>() / magnitudes.len().max(1) as f64).sqrt();
        let peak_idx = magnitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let peak_frequency = frequencies.get(peak_idx).copied().unwrap_or(0.0);

        Ok(FrequencySpectrum {
            frequencies,
            magnitudes,
            rms,
            peak_frequency,
            sample_rate: self.sampling_rate,
        })
    }
}

fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size as f64 - 1.0)).cos()))
        .collect()
}

/// Unused by `FftProcessor::compute` but kept for callers that already have
/// a full `Array1` (e.g. tests porting fixtures from an ndarray-based
/// pipeline).
pub fn to_array1(signal: &[f64]) -> Array1<f64> {
    Array1::from_vec(signal.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn fft_processor_rejects_bad_sampling_rate() {
        assert!(FftProcessor::new(1024, 0.0).is_err());
    }

    #[test]
    fn fft_finds_known_sine_frequency() {
        let processor = FftProcessor::new(2048, 800.0).unwrap();
        let signal: Vec<f64> = (0..2048).map(|i| (2.0 * PI * 50.0 * i as f64 / 800.0).sin()).collect();
        let spectrum = processor.compute(&signal, 0.0, 200.0).unwrap();
        let peak_idx = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let peak_freq = spectrum.frequencies[peak_idx];
        assert!((peak_freq - 50.0).abs() < 1.0, "peak at {peak_freq}, expected ~50 Hz");
    }

    #[test]
    fn compute_clips_to_requested_band() {
        let processor = FftProcessor::new(2048, 800.0).unwrap();
        let signal: Vec<f64> = (0..2048).map(|i| (2.0 * PI * 50.0 * i as f64 / 800.0).sin()).collect();
        let spectrum = processor.compute(&signal, 0.0, 40.0).unwrap();
        assert!(spectrum.frequencies.iter().all(|&f| f <= 40.0));
    }

    #[test]
    fn dc_and_nyquist_bins_are_halved() {
        let processor = FftProcessor::new(16, 16.0).unwrap();
        // DC-only input: a constant signal.
        let signal = vec![1.0; 16];
        let spectrum = processor.compute(&signal, 0.0, 8.0).unwrap();
        // Scale for bin 0 is 1/window_sum, not 2/window_sum, so its
        // magnitude shouldn't be double the "non-edge" scaling would imply.
        assert!(spectrum.magnitudes[0] > 0.0);
    }
}
