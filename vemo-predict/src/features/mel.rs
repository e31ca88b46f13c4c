//! Mel spectrogram, decibel scaling and MFCC
//!
//! Slaney mel scale with area-normalized triangular filters, and an
//! orthonormal DCT-II for the cepstrum.

use ndarray::{Array1, Array2, Axis};

use super::spectrum::fft_frequencies;
use super::N_FREQ_BINS;

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Hz to mel (Slaney)
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    } else {
        hz / MEL_F_SP
    }
}

/// Mel to Hz (Slaney)
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        mel * MEL_F_SP
    }
}

/// Triangular mel filterbank, shape `(n_mels, N_FREQ_BINS)`, 0 Hz to Nyquist
pub fn mel_filterbank(sample_rate: u32, n_mels: usize) -> Array2<f64> {
    let fft_freqs = fft_frequencies(sample_rate);

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let n_points = n_mels + 2;
    let mel_f: Vec<f64> = (0..n_points)
        .map(|i| {
            let mel = min_mel + (max_mel - min_mel) * i as f64 / (n_points - 1) as f64;
            mel_to_hz(mel)
        })
        .collect();

    let mut weights = Array2::<f64>::zeros((n_mels, N_FREQ_BINS));
    for m in 0..n_mels {
        let lower_width = mel_f[m + 1] - mel_f[m];
        let upper_width = mel_f[m + 2] - mel_f[m + 1];
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);

        for (bin, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / lower_width;
            let upper = (mel_f[m + 2] - f) / upper_width;
            weights[[m, bin]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    weights
}

/// Power to decibels: `10 log10(max(S, 1e-10))`, floored at `max - 80 dB`
///
/// The floor is relative to the maximum of the whole matrix.
pub fn power_to_db(power: &Array2<f64>) -> Array2<f64> {
    const AMIN: f64 = 1e-10;
    const TOP_DB: f64 = 80.0;

    let log_spec = power.mapv(|v| 10.0 * v.max(AMIN).log10());
    let peak = log_spec.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    log_spec.mapv(|v| v.max(floor))
}

/// Orthonormal DCT-II basis, shape `(n_out, n_in)`
pub fn dct_ortho(n_out: usize, n_in: usize) -> Array2<f64> {
    let n = n_in as f64;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        scale * (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos()
    })
}

/// Mean of each row over the time axis
pub fn time_mean(matrix: &Array2<f64>) -> Array1<f64> {
    matrix
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(matrix.nrows()))
}
