//! Audio Normalizer
//!
//! Turns an uploaded file of any supported container/codec into a mono
//! 16-bit WAV at [`CANONICAL_SAMPLE_RATE`]. The actual transcoding is done by
//! a [`Transcoder`] backend chosen once at startup:
//!
//! - [`NativeTranscoder`]: in-process symphonia decode + rubato resample + hound encode
//! - [`FfmpegTranscoder`]: external `ffmpeg` binary located and validated at startup

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::decode::{decode_file, DecodeError};
use super::resample::ResampleError;
use super::staging::StagedUpload;
use super::waveform::CanonicalWaveform;
use super::{CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};

/// Audio conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Input file does not exist
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Input could not be decoded
    #[error("failed to decode audio: {0}")]
    Decode(#[from] DecodeError),

    /// Decoded audio could not be resampled
    #[error("failed to resample audio: {0}")]
    Resample(#[from] ResampleError),

    /// Canonical WAV could not be written or read back
    #[error("failed to encode canonical WAV: {0}")]
    Encode(#[from] hound::Error),

    /// Transcoder binary missing or not executable
    #[error("transcoder unavailable at {path}: {source}")]
    TranscoderUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transcoder binary runs but does not behave like the expected tool
    #[error("transcoder misconfigured: {0}")]
    TranscoderMisconfigured(String),

    /// Transcoder ran and reported failure
    #[error("transcoder exited with {status}: {stderr}")]
    TranscoderFailed { status: String, stderr: String },

    /// Output exists but is not in the canonical format
    #[error("converted file is not canonical: {channels} channel(s) at {sample_rate} Hz")]
    NonCanonicalOutput { channels: u16, sample_rate: u32 },
}

/// Transcoder backend selector used in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecBackend {
    #[default]
    Native,
    Ffmpeg,
}

impl CodecBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecBackend::Native => "native",
            CodecBackend::Ffmpeg => "ffmpeg",
        }
    }
}

impl std::fmt::Display for CodecBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CodecBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(CodecBackend::Native),
            "ffmpeg" => Ok(CodecBackend::Ffmpeg),
            other => Err(format!(
                "unknown codec backend '{}' (expected 'native' or 'ffmpeg')",
                other
            )),
        }
    }
}

/// Decode-and-reencode capability
///
/// Implementations write a mono WAV at [`CANONICAL_SAMPLE_RATE`] to `output`.
/// `hint` is a container/extension hint and is never authoritative.
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description for operators
    fn describe(&self) -> String {
        self.name().to_string()
    }

    fn transcode(&self, input: &Path, hint: Option<&str>, output: &Path) -> Result<(), ConversionError>;
}

/// In-process transcoder built on symphonia, rubato and hound
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTranscoder;

impl Transcoder for NativeTranscoder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn transcode(&self, input: &Path, hint: Option<&str>, output: &Path) -> Result<(), ConversionError> {
        let decoded = decode_file(input, hint)?;
        let waveform = CanonicalWaveform::from_decoded(&decoded)?;
        waveform.write_wav(output)?;
        Ok(())
    }
}

/// External `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    version: String,
}

impl FfmpegTranscoder {
    /// Resolve and validate the binary by running `<binary> -version`
    pub fn locate(binary: impl Into<PathBuf>) -> Result<Self, ConversionError> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ConversionError::TranscoderUnavailable {
                path: binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConversionError::TranscoderMisconfigured(format!(
                "{} -version exited with {}",
                binary.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default().trim().to_string();
        if !version.to_ascii_lowercase().contains("ffmpeg") {
            return Err(ConversionError::TranscoderMisconfigured(format!(
                "{} does not identify as ffmpeg",
                binary.display()
            )));
        }

        info!("Using ffmpeg at {}: {}", binary.display(), version);
        Ok(Self { binary, version })
    }

    fn arguments(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_os_string());
        args.push("-ac".into());
        args.push(CANONICAL_CHANNELS.to_string().into());
        args.push("-ar".into());
        args.push(CANONICAL_SAMPLE_RATE.to_string().into());
        args.push("-c:a".into());
        args.push("pcm_s16le".into());
        args.push(output.as_os_str().to_os_string());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn describe(&self) -> String {
        format!("ffmpeg at {} ({})", self.binary.display(), self.version)
    }

    fn transcode(&self, input: &Path, _hint: Option<&str>, output: &Path) -> Result<(), ConversionError> {
        let result = Command::new(&self.binary)
            .args(Self::arguments(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ConversionError::TranscoderUnavailable {
                path: self.binary.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(ConversionError::TranscoderFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Resolve the configured backend into a ready transcoder
pub fn build_transcoder(
    backend: CodecBackend,
    ffmpeg_path: &Path,
) -> Result<Arc<dyn Transcoder>, ConversionError> {
    match backend {
        CodecBackend::Native => Ok(Arc::new(NativeTranscoder)),
        CodecBackend::Ffmpeg => Ok(Arc::new(FfmpegTranscoder::locate(ffmpeg_path)?)),
    }
}

/// Canonical WAV produced by the normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFile {
    pub path: PathBuf,
    pub frames: u32,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Normalizes staged uploads into canonical WAV files
#[derive(Clone)]
pub struct AudioNormalizer {
    transcoder: Arc<dyn Transcoder>,
}

impl AudioNormalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Normalizer using the in-process backend
    pub fn native() -> Self {
        Self::new(Arc::new(NativeTranscoder))
    }

    pub fn backend_name(&self) -> &'static str {
        self.transcoder.name()
    }

    /// Transcode `upload` into `output` and verify the result is canonical
    ///
    /// `output` belongs to the caller's request scope; this never deletes it.
    pub fn normalize(&self, upload: &StagedUpload, output: &Path) -> Result<CanonicalFile, ConversionError> {
        let input = upload.path();
        if !input.is_file() {
            return Err(ConversionError::MissingInput(input.to_path_buf()));
        }

        debug!(
            backend = self.transcoder.name(),
            input = %input.display(),
            hint = ?upload.decoder_hint(),
            "Normalizing upload"
        );

        self.transcoder.transcode(input, upload.decoder_hint(), output)?;
        inspect_canonical(output)
    }
}

impl std::fmt::Debug for AudioNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioNormalizer")
            .field("backend", &self.transcoder.name())
            .finish()
    }
}

/// Read a WAV header and confirm mono at the canonical rate
pub fn inspect_canonical(path: &Path) -> Result<CanonicalFile, ConversionError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels != CANONICAL_CHANNELS || spec.sample_rate != CANONICAL_SAMPLE_RATE {
        return Err(ConversionError::NonCanonicalOutput {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        });
    }

    Ok(CanonicalFile {
        path: path.to_path_buf(),
        frames: reader.duration(),
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}
