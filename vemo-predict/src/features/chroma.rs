//! STFT chromagram with automatic tuning estimation
//!
//! Tuning is estimated from spectral peaks between 150 Hz and 4 kHz; the
//! chroma filterbank is shifted by that deviation (in fractions of a bin)
//! before projecting the power spectrogram onto the twelve pitch classes.

use ndarray::Array2;

use super::spectrum::fft_frequencies;
use super::{N_CHROMA, N_FFT, N_FREQ_BINS};

const PIPTRACK_FMIN: f64 = 150.0;
const PIPTRACK_FMAX: f64 = 4000.0;
const PIPTRACK_THRESHOLD: f64 = 0.1;
const TUNING_RESOLUTION: f64 = 0.01;

const CHROMA_CENTER_OCTAVE: f64 = 5.0;
const CHROMA_OCTAVE_WIDTH: f64 = 2.0;

/// Octaves above A0 (27.5 Hz at zero tuning)
fn hz_to_octs(hz: f64, tuning: f64) -> f64 {
    let a440 = 440.0 * 2f64.powf(tuning / N_CHROMA as f64);
    (hz / (a440 / 16.0)).log2()
}

/// Parabolic-interpolated peak frequencies and magnitudes
///
/// Returns `(frequency, magnitude)` for every local maximum of each frame
/// that lies in `[150, min(4000, sr/2))` Hz and exceeds 10% of the frame max.
fn pitch_peaks(spectrogram: &Array2<f64>, sample_rate: u32) -> Vec<(f64, f64)> {
    let (n_bins, n_frames) = spectrogram.dim();
    let fmax = PIPTRACK_FMAX.min(sample_rate as f64 / 2.0);
    let freqs = fft_frequencies(sample_rate);
    let bin_hz = sample_rate as f64 / N_FFT as f64;

    let mut peaks = Vec::new();
    let mut thresholded = vec![0.0f64; n_bins];

    for t in 0..n_frames {
        let column = spectrogram.column(t);
        let frame_max = column.iter().cloned().fold(0.0f64, f64::max);
        let reference = PIPTRACK_THRESHOLD * frame_max;

        for (slot, &v) in thresholded.iter_mut().zip(column.iter()) {
            *slot = if v > reference { v } else { 0.0 };
        }

        for bin in 1..n_bins.saturating_sub(1) {
            if freqs[bin] < PIPTRACK_FMIN || freqs[bin] >= fmax {
                continue;
            }
            let x = thresholded[bin];
            if !(x > thresholded[bin - 1] && x >= thresholded[bin + 1]) {
                continue;
            }

            let prev = column[bin - 1];
            let here = column[bin];
            let next = column[bin + 1];

            let a = next + prev - 2.0 * here;
            let b = (next - prev) / 2.0;
            let shift = if b.abs() >= a.abs() { 0.0 } else { -b / a };
            let gradient = (next - prev) / 2.0;

            let frequency = (bin as f64 + shift) * bin_hz;
            let magnitude = here + 0.5 * gradient * shift;
            peaks.push((frequency, magnitude));
        }
    }

    peaks
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Histogram mode of pitch deviations from the equal-tempered grid
///
/// Returns the left edge of the most populated bin in `[-0.5, 0.5)`, or 0.0
/// when there are no frequencies to measure.
pub fn pitch_tuning(frequencies: &[f64]) -> f64 {
    let n_bins = (1.0 / TUNING_RESOLUTION).ceil() as usize;
    let edge = |i: usize| -0.5 + i as f64 / n_bins as f64;

    let mut counts = vec![0usize; n_bins];
    let mut any = false;

    for &f in frequencies.iter().filter(|&&f| f > 0.0) {
        let mut residual = (N_CHROMA as f64 * hz_to_octs(f, 0.0)).rem_euclid(1.0);
        if residual >= 0.5 {
            residual -= 1.0;
        }

        let mut idx = (((residual + 0.5) * n_bins as f64).floor() as isize)
            .clamp(0, n_bins as isize - 1) as usize;
        if residual < edge(idx) && idx > 0 {
            idx -= 1;
        } else if idx + 1 < n_bins && residual >= edge(idx + 1) {
            idx += 1;
        }
        counts[idx] += 1;
        any = true;
    }

    if !any {
        return 0.0;
    }

    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    edge(best)
}

/// Tuning deviation (fractions of a chroma bin) of a power spectrogram
pub fn estimate_tuning(power: &Array2<f64>, sample_rate: u32) -> f64 {
    let peaks = pitch_peaks(power, sample_rate);
    if peaks.is_empty() {
        return 0.0;
    }

    let mut magnitudes: Vec<f64> = peaks.iter().map(|&(_, m)| m).collect();
    let threshold = median(&mut magnitudes);

    let selected: Vec<f64> = peaks
        .iter()
        .filter(|&&(_, m)| m >= threshold)
        .map(|&(f, _)| f)
        .collect();

    pitch_tuning(&selected)
}

/// Chroma filterbank, shape `(N_CHROMA, N_FREQ_BINS)`, rows starting at C
pub fn chroma_filterbank(sample_rate: u32, tuning: f64) -> Array2<f64> {
    let n_chroma = N_CHROMA as f64;

    // Bin centres in chroma units; DC gets a made-up value 1.5 octaves below bin 1
    let mut frqbins = vec![0.0f64; N_FFT];
    for k in 1..N_FFT {
        let hz = k as f64 * sample_rate as f64 / N_FFT as f64;
        frqbins[k] = n_chroma * hz_to_octs(hz, tuning);
    }
    frqbins[0] = frqbins[1] - 1.5 * n_chroma;

    let mut binwidth = vec![1.0f64; N_FFT];
    for k in 0..N_FFT - 1 {
        binwidth[k] = (frqbins[k + 1] - frqbins[k]).max(1.0);
    }

    let half = (n_chroma / 2.0).round();
    let mut weights = Array2::<f64>::zeros((N_CHROMA, N_FFT));
    for c in 0..N_CHROMA {
        for k in 0..N_FFT {
            let d = (frqbins[k] - c as f64 + half + 10.0 * n_chroma).rem_euclid(n_chroma) - half;
            weights[[c, k]] = (-0.5 * (2.0 * d / binwidth[k]).powi(2)).exp();
        }
    }

    // L2-normalize each column, then weight by octave distance from the centre
    for k in 0..N_FFT {
        let norm = weights.column(k).iter().map(|w| w * w).sum::<f64>().sqrt();
        let octave_weight =
            (-0.5 * ((frqbins[k] / n_chroma - CHROMA_CENTER_OCTAVE) / CHROMA_OCTAVE_WIDTH).powi(2)).exp();
        for c in 0..N_CHROMA {
            let w = if norm > f64::MIN_POSITIVE {
                weights[[c, k]] / norm
            } else {
                weights[[c, k]]
            };
            weights[[c, k]] = w * octave_weight;
        }
    }

    // Rotate so row 0 is C rather than A, and drop the aliased bins
    let shift = 3 * (N_CHROMA / 12);
    Array2::from_shape_fn((N_CHROMA, N_FREQ_BINS), |(c, k)| {
        weights[[(c + shift) % N_CHROMA, k]]
    })
}

/// Chromagram of a power spectrogram, each frame scaled to a maximum of 1
pub fn chromagram(power: &Array2<f64>, sample_rate: u32) -> Array2<f64> {
    let tuning = estimate_tuning(power, sample_rate);
    let filterbank = chroma_filterbank(sample_rate, tuning);
    let mut chroma = filterbank.dot(power);

    for mut frame in chroma.columns_mut() {
        let peak = frame.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if peak >= f64::MIN_POSITIVE {
            frame.mapv_inplace(|v| v / peak);
        }
    }

    chroma
}
