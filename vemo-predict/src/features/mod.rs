//! Feature Extractor
//!
//! Builds the fixed-length vector the classifier was trained on. Five
//! descriptors are computed over the whole canonical waveform, averaged over
//! time, and concatenated in this order:
//!
//! | Descriptor             | Length |
//! |------------------------|--------|
//! | MFCC                   | 60     |
//! | Chroma (STFT)          | 12     |
//! | Log-power mel spectrum | 128    |
//! | Spectral contrast      | 7      |
//! | Zero-crossing rate     | 1      |
//!
//! Changing any constant in this module changes the vector the classifier
//! sees and invalidates previously trained models.

pub mod chroma;
pub mod contrast;
pub mod mel;
pub mod spectrum;
pub mod zcr;

use std::ops::Range;
use std::path::Path;

use ndarray::Array2;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::audio::{CanonicalWaveform, WaveformError, CANONICAL_SAMPLE_RATE};
use spectrum::Stft;

/// FFT size and analysis frame length
pub const N_FFT: usize = 2048;
/// Hop between frames
pub const HOP_LENGTH: usize = 512;
/// One-sided spectrum size
pub const N_FREQ_BINS: usize = N_FFT / 2 + 1;

pub const N_MFCC: usize = 60;
pub const N_CHROMA: usize = 12;
pub const N_MELS: usize = 128;
/// Octave bands above the base band; contrast yields one more row
pub const N_CONTRAST_BANDS: usize = 6;
pub const N_ZCR: usize = 1;

/// Total feature vector length
pub const FEATURE_DIM: usize = N_MFCC + N_CHROMA + N_MELS + (N_CONTRAST_BANDS + 1) + N_ZCR;

/// Feature extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Canonical waveform could not be read
    #[error("failed to load waveform: {0}")]
    Decode(#[from] WaveformError),

    #[error("waveform contains no samples")]
    EmptyWaveform,

    #[error("waveform sample rate {actual} Hz does not match expected {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    /// A descriptor produced NaN or infinity
    #[error("non-finite values in {descriptor}")]
    NonFinite { descriptor: &'static str },

    #[error("invalid extraction parameters: {0}")]
    InvalidParameters(String),
}

/// Time-averaged descriptor vector of length [`FEATURE_DIM`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    const MFCC: Range<usize> = 0..N_MFCC;
    const CHROMA: Range<usize> = N_MFCC..N_MFCC + N_CHROMA;
    const MEL: Range<usize> = N_MFCC + N_CHROMA..N_MFCC + N_CHROMA + N_MELS;
    const CONTRAST: Range<usize> =
        N_MFCC + N_CHROMA + N_MELS..N_MFCC + N_CHROMA + N_MELS + N_CONTRAST_BANDS + 1;
    const ZCR: Range<usize> = FEATURE_DIM - N_ZCR..FEATURE_DIM;

    /// Wrap raw values, e.g. from a stored vector; length is not checked
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mfcc(&self) -> &[f32] {
        &self.0[Self::MFCC]
    }

    pub fn chroma(&self) -> &[f32] {
        &self.0[Self::CHROMA]
    }

    pub fn log_mel(&self) -> &[f32] {
        &self.0[Self::MEL]
    }

    pub fn contrast(&self) -> &[f32] {
        &self.0[Self::CONTRAST]
    }

    pub fn zero_crossing_rate(&self) -> f32 {
        self.0[Self::ZCR.start]
    }
}

/// Stateless extractor holding precomputed filterbanks and the FFT plan
#[derive(Clone)]
pub struct FeatureExtractor {
    stft: Stft,
    mel_basis: Array2<f64>,
    dct: Array2<f64>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            stft: Stft::new(),
            mel_basis: mel::mel_filterbank(CANONICAL_SAMPLE_RATE, N_MELS),
            dct: mel::dct_ortho(N_MFCC, N_MELS),
        }
    }

    /// Load a file as a canonical waveform and extract its features
    pub fn extract_file(&self, path: &Path) -> Result<FeatureVector, ExtractionError> {
        let waveform = CanonicalWaveform::load(path)?;
        self.extract(&waveform)
    }

    /// Compute the feature vector of a canonical waveform
    pub fn extract(&self, waveform: &CanonicalWaveform) -> Result<FeatureVector, ExtractionError> {
        if waveform.sample_rate() != CANONICAL_SAMPLE_RATE {
            return Err(ExtractionError::SampleRateMismatch {
                expected: CANONICAL_SAMPLE_RATE,
                actual: waveform.sample_rate(),
            });
        }
        if waveform.is_empty() {
            return Err(ExtractionError::EmptyWaveform);
        }

        let samples = waveform.samples();
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(ExtractionError::NonFinite { descriptor: "waveform" });
        }

        let magnitude = self.stft.magnitude(samples);
        let power = magnitude.mapv(|v| v * v);

        let log_mel = mel::power_to_db(&self.mel_basis.dot(&power));
        let mfcc = self.dct.dot(&log_mel);
        let chroma = chroma::chromagram(&power, CANONICAL_SAMPLE_RATE);
        let contrast = contrast::spectral_contrast(&magnitude, CANONICAL_SAMPLE_RATE)
            .map_err(ExtractionError::InvalidParameters)?;
        let zcr = zcr::zero_crossing_rate(samples);

        let mut values = Vec::with_capacity(FEATURE_DIM);
        append_mean("mfcc", &mfcc, &mut values)?;
        append_mean("chroma", &chroma, &mut values)?;
        append_mean("log_mel", &log_mel, &mut values)?;
        append_mean("spectral_contrast", &contrast, &mut values)?;

        let zcr_mean = zcr.iter().sum::<f64>() / zcr.len().max(1) as f64;
        push_finite("zero_crossing_rate", zcr_mean, &mut values)?;

        if values.len() != FEATURE_DIM {
            return Err(ExtractionError::InvalidParameters(format!(
                "assembled {} features, expected {}",
                values.len(),
                FEATURE_DIM
            )));
        }

        debug!(
            frames = magnitude.ncols(),
            duration_s = waveform.duration_seconds(),
            "Extracted {} features",
            values.len()
        );

        Ok(FeatureVector(values))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn append_mean(
    descriptor: &'static str,
    matrix: &Array2<f64>,
    values: &mut Vec<f32>,
) -> Result<(), ExtractionError> {
    for value in mel::time_mean(matrix) {
        push_finite(descriptor, value, values)?;
    }
    Ok(())
}

fn push_finite(descriptor: &'static str, value: f64, values: &mut Vec<f32>) -> Result<(), ExtractionError> {
    let value = value as f32;
    if !value.is_finite() {
        return Err(ExtractionError::NonFinite { descriptor });
    }
    values.push(value);
    Ok(())
}
