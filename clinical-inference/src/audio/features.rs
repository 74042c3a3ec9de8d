//! Kaldi-compatible log mel filterbank features
//!
//! Frames are 25 ms every 10 ms without edge padding. Each frame has its DC
//! offset removed, is pre-emphasized and weighted by a Povey window, then
//! passes through a 512-point power spectrum and triangular mel filters on
//! the `1127 ln(1 + f / 700)` scale.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::InferenceResult;
use crate::runtime::FeatureMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct FbankConfig {
    pub sample_rate: u32,
    pub num_mel_bins: usize,
    pub frame_length_ms: f32,
    pub frame_shift_ms: f32,
    pub preemphasis: f32,
    pub low_freq: f32,
    /// Zero or negative values are offsets from Nyquist
    pub high_freq: f32,
}

impl Default for FbankConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            num_mel_bins: 128,
            frame_length_ms: 25.0,
            frame_shift_ms: 10.0,
            preemphasis: 0.97,
            low_freq: 20.0,
            high_freq: 0.0,
        }
    }
}

fn mel_scale(freq: f32) -> f32 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

pub struct FbankExtractor {
    config: FbankConfig,
    frame_length: usize,
    frame_shift: usize,
    fft_size: usize,
    window: Vec<f32>,
    /// `num_mel_bins` rows over `fft_size / 2 + 1` power bins
    filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for FbankExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FbankExtractor")
            .field("config", &self.config)
            .field("frame_length", &self.frame_length)
            .field("frame_shift", &self.frame_shift)
            .field("fft_size", &self.fft_size)
            .finish_non_exhaustive()
    }
}

impl FbankExtractor {
    pub fn new(config: FbankConfig) -> Self {
        let rate = config.sample_rate as f32;
        let frame_length = ((rate * config.frame_length_ms / 1000.0).round() as usize).max(1);
        let frame_shift = ((rate * config.frame_shift_ms / 1000.0).round() as usize).max(1);
        let fft_size = frame_length.next_power_of_two();

        let window = povey_window(frame_length);
        let filters = mel_filters(&config, fft_size);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        Self {
            config,
            frame_length,
            frame_shift,
            fft_size,
            window,
            filters,
            fft,
        }
    }

    pub fn num_mel_bins(&self) -> usize {
        self.config.num_mel_bins
    }

    /// Frames produced for `num_samples`; short signals still give one
    pub fn num_frames(&self, num_samples: usize) -> usize {
        if num_samples <= self.frame_length {
            1
        } else {
            1 + (num_samples - self.frame_length) / self.frame_shift
        }
    }

    /// Log mel energies, one row per frame
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InferenceError::Runtime`] if the output shape
    /// is inconsistent, which indicates a bug.
    pub fn extract(&self, samples: &[f32]) -> InferenceResult<FeatureMatrix> {
        let num_frames = self.num_frames(samples.len());
        let num_bins = self.config.num_mel_bins;
        let mut data = Vec::with_capacity(num_frames * num_bins);

        let mut frame = vec![0.0f32; self.frame_length];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); self.fft_size];
        let mut power = vec![0.0f32; self.fft_size / 2 + 1];

        for index in 0..num_frames {
            let start = index * self.frame_shift;
            frame.fill(0.0);
            let available = samples.len().saturating_sub(start).min(self.frame_length);
            frame[..available].copy_from_slice(&samples[start..start + available]);

            self.prepare_frame(&mut frame);

            for (slot, value) in spectrum.iter_mut().zip(frame.iter().chain(std::iter::repeat(&0.0))) {
                *slot = Complex::new(*value, 0.0);
            }
            self.fft.process(&mut spectrum);
            for (bin, value) in power.iter_mut().zip(&spectrum) {
                *bin = value.norm_sqr();
            }

            for filter in &self.filters {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                data.push(energy.max(f32::EPSILON).ln());
            }
        }

        FeatureMatrix::new(num_frames, num_bins, data)
    }

    fn prepare_frame(&self, frame: &mut [f32]) {
        let mean = frame.iter().sum::<f32>() / frame.len() as f32;
        frame.iter_mut().for_each(|s| *s -= mean);

        let coeff = self.config.preemphasis;
        for i in (1..frame.len()).rev() {
            frame[i] -= coeff * frame[i - 1];
        }
        if let Some(first) = frame.first_mut() {
            *first -= coeff * *first;
        }

        frame.iter_mut().zip(&self.window).for_each(|(s, w)| *s *= w);
    }
}

/// Hann window raised to 0.85
fn povey_window(length: usize) -> Vec<f32> {
    if length == 1 {
        return vec![1.0];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f32 / denom).cos()).powf(0.85))
        .collect()
}

fn mel_filters(config: &FbankConfig, fft_size: usize) -> Vec<Vec<f32>> {
    let nyquist = config.sample_rate as f32 / 2.0;
    let high_freq = if config.high_freq <= 0.0 {
        nyquist + config.high_freq
    } else {
        config.high_freq
    };
    let num_fft_bins = fft_size / 2;
    let bin_width = config.sample_rate as f32 / fft_size as f32;

    let mel_low = mel_scale(config.low_freq);
    let mel_high = mel_scale(high_freq);
    let mel_delta = (mel_high - mel_low) / (config.num_mel_bins + 1) as f32;

    (0..config.num_mel_bins)
        .map(|bin| {
            let left = mel_low + bin as f32 * mel_delta;
            let center = left + mel_delta;
            let right = center + mel_delta;

            let mut weights = vec![0.0f32; num_fft_bins + 1];
            for (i, weight) in weights.iter_mut().take(num_fft_bins).enumerate() {
                let mel = mel_scale(bin_width * i as f32);
                if mel > left && mel < right {
                    *weight = if mel <= center {
                        (mel - left) / (center - left)
                    } else {
                        (right - mel) / (right - center)
                    };
                }
            }
            weights
        })
        .collect()
}

/// Per-dimension mean/variance normalization: `(x - mean) / (std + epsilon)`
pub fn cmvn(features: &mut FeatureMatrix, epsilon: f32) {
    let frames = features.frames();
    let dims = features.dims();
    if frames == 0 || dims == 0 {
        return;
    }

    let mut mean = vec![0.0f64; dims];
    for row in features.rows() {
        for (acc, &value) in mean.iter_mut().zip(row) {
            *acc += f64::from(value);
        }
    }
    mean.iter_mut().for_each(|m| *m /= frames as f64);

    let mut variance = vec![0.0f64; dims];
    for row in features.rows() {
        for ((acc, &value), m) in variance.iter_mut().zip(row).zip(&mean) {
            *acc += (f64::from(value) - m).powi(2);
        }
    }
    let std: Vec<f64> = variance.iter().map(|v| (v / frames as f64).sqrt()).collect();

    for row in features.rows_mut() {
        for ((value, m), s) in row.iter_mut().zip(&mean).zip(&std) {
            *value = ((f64::from(*value) - m) / (s + f64::from(epsilon))) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (16_000.0 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 16_000.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_frame_geometry() {
        let extractor = FbankExtractor::new(FbankConfig::default());
        assert_eq!(extractor.frame_length, 400);
        assert_eq!(extractor.frame_shift, 160);
        assert_eq!(extractor.fft_size, 512);
        assert_eq!(extractor.num_frames(16_000), 98);
        assert_eq!(extractor.num_frames(100), 1);
    }

    #[test]
    fn test_extract_shape_and_finite() {
        let extractor = FbankExtractor::new(FbankConfig::default());
        let features = extractor.extract(&tone(440.0, 1.0)).unwrap();
        assert_eq!(features.frames(), 98);
        assert_eq!(features.dims(), 128);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_tone_energy_lands_in_matching_band() {
        let extractor = FbankExtractor::new(FbankConfig {
            num_mel_bins: 40,
            ..FbankConfig::default()
        });
        let low = extractor.extract(&tone(300.0, 0.5)).unwrap();
        let high = extractor.extract(&tone(4000.0, 0.5)).unwrap();

        let peak = |features: &FeatureMatrix| {
            let row = features.rows().nth(5).unwrap();
            crate::runtime::argmax(row).unwrap()
        };
        assert!(peak(&low) < peak(&high));
    }

    #[test]
    fn test_empty_signal_gives_one_frame() {
        let extractor = FbankExtractor::new(FbankConfig::default());
        let features = extractor.extract(&[]).unwrap();
        assert_eq!(features.frames(), 1);
    }

    #[test]
    fn test_cmvn_zero_mean_unit_variance() {
        let mut features = FeatureMatrix::new(4, 2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]).unwrap();
        cmvn(&mut features, 1e-6);

        for dim in 0..2 {
            let column: Vec<f32> = (0..4).map(|f| features.get(f, dim).unwrap()).collect();
            let mean: f32 = column.iter().sum::<f32>() / 4.0;
            let var: f32 = column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_cmvn_single_frame_is_zero() {
        let mut features = FeatureMatrix::new(1, 3, vec![5.0, -2.0, 0.5]).unwrap();
        cmvn(&mut features, 1e-6);
        assert!(features.as_slice().iter().all(|v| v.abs() < 1e-6));
    }
}
