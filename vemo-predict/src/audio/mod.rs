//! Audio handling: decoding, resampling, normalization and request staging
//!
//! Every downstream computation assumes the canonical format defined here:
//! single channel, [`CANONICAL_SAMPLE_RATE`] Hz.

pub mod decode;
pub mod normalizer;
pub mod resample;
pub mod staging;
pub mod waveform;

pub use decode::{decode_file, DecodeError, DecodedAudio};
pub use normalizer::{
    build_transcoder, inspect_canonical, AudioNormalizer, CanonicalFile, CodecBackend,
    ConversionError, FfmpegTranscoder, NativeTranscoder, Transcoder,
};
pub use resample::{resample_mono, ResampleError};
pub use staging::{RequestScope, StagedUpload, StagingArea, StagingError};
pub use waveform::{CanonicalWaveform, WaveformError};

/// Sample rate of the canonical waveform (Hz)
pub const CANONICAL_SAMPLE_RATE: u32 = 22050;

/// Channel count of the canonical waveform
pub const CANONICAL_CHANNELS: u16 = 1;

/// File extension (lower case, no dot) of the canonical container
pub const CANONICAL_EXTENSION: &str = "wav";
