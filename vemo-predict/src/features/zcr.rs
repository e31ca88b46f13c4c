//! Frame-wise zero-crossing rate

use super::{HOP_LENGTH, N_FFT};

/// Magnitudes at or below this count as zero
const ZERO_THRESHOLD: f32 = 1e-10;

/// Zero-crossing rate per centered frame of `N_FFT` samples
///
/// The signal is edge-padded by `N_FFT / 2` on both sides. A crossing is a
/// change of sign bit between neighbours within the frame; the rate is the
/// crossing count divided by the frame length.
pub fn zero_crossing_rate(samples: &[f32]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }

    let pad = N_FFT / 2;
    let first = samples[0];
    let last = samples[samples.len() - 1];

    let negative: Vec<bool> = std::iter::repeat(first)
        .take(pad)
        .chain(samples.iter().copied())
        .chain(std::iter::repeat(last).take(pad))
        .map(|x| x.abs() > ZERO_THRESHOLD && x < 0.0)
        .collect();

    let n_frames = 1 + (negative.len() - N_FFT) / HOP_LENGTH;
    (0..n_frames)
        .map(|frame| {
            let window = &negative[frame * HOP_LENGTH..frame * HOP_LENGTH + N_FFT];
            let crossings = window.windows(2).filter(|pair| pair[0] != pair[1]).count();
            crossings as f64 / N_FFT as f64
        })
        .collect()
}
