//! Canonical waveform: mono PCM at the canonical sample rate

use std::path::Path;

use thiserror::Error;

use super::decode::{decode_file, DecodeError, DecodedAudio};
use super::resample::{resample_mono, ResampleError};
use super::{CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};

/// Errors turning an audio file into a canonical waveform
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Single-channel PCM at [`CANONICAL_SAMPLE_RATE`]
///
/// Constructed only through [`CanonicalWaveform::load`] or
/// [`CanonicalWaveform::from_decoded`], which enforce the canonical format.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWaveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl CanonicalWaveform {
    /// Decode `path`, down-mix to mono and resample to the canonical rate
    pub fn load(path: &Path) -> Result<Self, WaveformError> {
        let hint = path.extension().and_then(|e| e.to_str());
        let decoded = decode_file(path, hint)?;
        Ok(Self::from_decoded(&decoded)?)
    }

    /// Convert decoded audio of any layout into the canonical format
    pub fn from_decoded(decoded: &DecodedAudio) -> Result<Self, ResampleError> {
        let mono = decoded.to_mono();
        let samples = resample_mono(&mono, decoded.sample_rate, CANONICAL_SAMPLE_RATE)?;
        Ok(Self {
            samples,
            sample_rate: CANONICAL_SAMPLE_RATE,
        })
    }

    /// Wrap samples that are already mono at the canonical rate
    pub fn from_canonical_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: CANONICAL_SAMPLE_RATE,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        CANONICAL_CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Encode as 16-bit PCM WAV
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: CANONICAL_CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample * 32768.0)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
