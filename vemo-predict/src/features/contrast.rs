//! Octave-band spectral contrast
//!
//! Bands: `[0, 200]`, then octaves from 200 Hz up (the last one open to
//! Nyquist). Per frame, peak and valley are the means of the top and bottom
//! 2% of sorted magnitudes in the band; contrast is their difference in dB.

use ndarray::Array2;

use super::mel::power_to_db;
use super::spectrum::fft_frequencies;
use super::N_CONTRAST_BANDS;

const CONTRAST_FMIN: f64 = 200.0;
const CONTRAST_QUANTILE: f64 = 0.02;

/// Bin membership for each band (index ranges into the spectrogram rows)
///
/// Also returns the number of bins the band spans for quantile sizing, which
/// for all but the last band is one more than the rows averaged.
fn band_layout(sample_rate: u32) -> Result<Vec<(std::ops::Range<usize>, usize)>, String> {
    let freqs = fft_frequencies(sample_rate);
    let n_bins = freqs.len();

    let mut edges = vec![0.0f64; N_CONTRAST_BANDS + 2];
    for (k, edge) in edges.iter_mut().enumerate().skip(1) {
        *edge = CONTRAST_FMIN * 2f64.powi(k as i32 - 1);
    }
    if edges[..edges.len() - 1].iter().any(|&f| f >= 0.5 * sample_rate as f64) {
        return Err(format!(
            "contrast bands exceed Nyquist for sample rate {} Hz",
            sample_rate
        ));
    }

    let mut bands = Vec::with_capacity(N_CONTRAST_BANDS + 1);
    for k in 0..=N_CONTRAST_BANDS {
        let (f_low, f_high) = (edges[k], edges[k + 1]);
        let first = freqs.iter().position(|&f| f >= f_low);
        let last = freqs.iter().rposition(|&f| f <= f_high);
        let (Some(mut first), Some(mut last)) = (first, last) else {
            return Err(format!("empty contrast band {} ({}-{} Hz)", k, f_low, f_high));
        };
        if first > last {
            return Err(format!("empty contrast band {} ({}-{} Hz)", k, f_low, f_high));
        }

        if k > 0 {
            first -= 1;
        }
        if k == N_CONTRAST_BANDS {
            last = n_bins - 1;
        }
        let span = last - first + 1;
        let rows = if k < N_CONTRAST_BANDS { first..last } else { first..last + 1 };
        bands.push((rows, span));
    }

    Ok(bands)
}

/// Spectral contrast of a magnitude spectrogram, shape `(N_CONTRAST_BANDS + 1, frames)`
pub fn spectral_contrast(magnitude: &Array2<f64>, sample_rate: u32) -> Result<Array2<f64>, String> {
    let bands = band_layout(sample_rate)?;
    let n_frames = magnitude.ncols();

    let mut peak = Array2::<f64>::zeros((bands.len(), n_frames));
    let mut valley = Array2::<f64>::zeros((bands.len(), n_frames));
    let mut sorted = Vec::new();

    for (k, (rows, span)) in bands.iter().enumerate() {
        let quantile_len = ((CONTRAST_QUANTILE * *span as f64).round_ties_even() as usize).max(1);

        for t in 0..n_frames {
            sorted.clear();
            sorted.extend(rows.clone().map(|r| magnitude[[r, t]]));
            sorted.sort_by(|a, b| a.total_cmp(b));

            let take = quantile_len.min(sorted.len());
            valley[[k, t]] = sorted[..take].iter().sum::<f64>() / take as f64;
            peak[[k, t]] = sorted[sorted.len() - take..].iter().sum::<f64>() / take as f64;
        }
    }

    Ok(power_to_db(&peak) - power_to_db(&valley))
}
