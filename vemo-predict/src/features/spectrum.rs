//! Short-time Fourier transform
//!
//! Centered frames (zero padding of `N_FFT / 2` on both sides), periodic Hann
//! window, one-sided spectrum of `N_FFT / 2 + 1` bins.

use std::sync::Arc;

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{HOP_LENGTH, N_FFT, N_FREQ_BINS};

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Number of centered frames for a signal of `len` samples
pub fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

/// Frequency of each one-sided FFT bin (Hz)
pub fn fft_frequencies(sample_rate: u32) -> Vec<f64> {
    (0..N_FREQ_BINS)
        .map(|k| k as f64 * sample_rate as f64 / N_FFT as f64)
        .collect()
}

/// Reusable STFT plan
#[derive(Clone)]
pub struct Stft {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
}

impl Stft {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(N_FFT),
            window: hann_window(N_FFT),
        }
    }

    /// Magnitude spectrogram, shape `(N_FREQ_BINS, frames)`
    pub fn magnitude(&self, samples: &[f32]) -> Array2<f64> {
        let pad = N_FFT / 2;
        let mut padded = vec![0.0f64; samples.len() + 2 * pad];
        for (dst, &src) in padded[pad..pad + samples.len()].iter_mut().zip(samples) {
            *dst = src as f64;
        }

        let n_frames = frame_count(samples.len());
        let mut magnitudes = Array2::<f64>::zeros((N_FREQ_BINS, n_frames));

        let mut buffer = vec![Complex::new(0.0f64, 0.0); N_FFT];
        let mut scratch = vec![Complex::new(0.0f64, 0.0); self.fft.get_inplace_scratch_len()];

        for frame in 0..n_frames {
            let start = frame * HOP_LENGTH;
            for ((slot, &w), &s) in buffer
                .iter_mut()
                .zip(&self.window)
                .zip(&padded[start..start + N_FFT])
            {
                *slot = Complex::new(s * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (bin, c) in buffer.iter().take(N_FREQ_BINS).enumerate() {
                magnitudes[[bin, frame]] = c.norm();
            }
        }

        magnitudes
    }
}

impl Default for Stft {
    fn default() -> Self {
        Self::new()
    }
}
