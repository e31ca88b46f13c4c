//! Audio file decoding using symphonia
//!
//! Decodes any container/codec symphonia supports into interleaved f32 PCM at
//! the file's native rate. Channel layout and rate conversion happen later.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CodecParameters, CodecRegistry, Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_OPUS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// File could not be opened
    #[error("cannot open audio file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No format reader recognised the byte stream
    #[error("unrecognised audio format: {0}")]
    Probe(#[source] SymphoniaError),

    /// Container holds no decodable audio track
    #[error("no audio track found")]
    NoTrack,

    /// Codec not supported by the decoder registry
    #[error("unsupported codec: {0}")]
    Codec(#[source] SymphoniaError),

    /// Opus track in a build without an Opus decoder
    #[error("Opus decoding requires the `opus` build feature or codec.backend = \"ffmpeg\"")]
    OpusUnavailable,

    /// Container read failed mid-stream
    #[error("failed to read packet: {0}")]
    Packet(#[source] SymphoniaError),

    /// Every packet in the stream failed to decode
    #[error("all {0} audio packets failed to decode")]
    Corrupt(usize),

    /// Neither the container nor any decoded buffer reported a sample rate
    #[error("sample rate not specified in stream")]
    UnknownSampleRate,
}

/// Decoded PCM with its native layout
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Number of interleaved channels
    pub channels: usize,
    /// Native sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Down-mix to a single channel by averaging channels per frame
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }
}

/// Codec registry shared by every decode
///
/// Holds symphonia's enabled codecs, plus libopus when built with the `opus`
/// feature.
fn codec_registry() -> &'static CodecRegistry {
    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        #[cfg(feature = "opus")]
        registry.register_all::<symphonia_adapter_libopus::OpusDecoder>();
        symphonia::default::register_enabled_codecs(&mut registry);
        registry
    })
}

fn make_decoder(params: &CodecParameters) -> Result<Box<dyn Decoder>, DecodeError> {
    let registry = codec_registry();
    if params.codec == CODEC_TYPE_OPUS && registry.get_codec(CODEC_TYPE_OPUS).is_none() {
        return Err(DecodeError::OpusUnavailable);
    }
    registry
        .make(params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)
}

/// Decode an audio file into interleaved f32 samples.
///
/// `hint` is an optional file extension (no dot) used to speed up format
/// probing; it is never authoritative.
///
/// Corrupt frames are skipped with a warning. A stream in which every frame
/// fails is reported as [`DecodeError::Corrupt`].
pub fn decode_file(path: &Path, hint: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = make_decoder(&track.codec_params)?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut decoded_packets = 0usize;
    let mut failed_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping corrupt audio frame: {}", msg);
                failed_packets += 1;
                continue;
            }
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        let spec = *decoded.spec();
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }
        if channels.is_none() {
            channels = Some(spec.channels.count());
        }

        // Reuse the buffer unless this packet is larger than any seen so far
        let frames = decoded.capacity();
        let needed = frames * spec.channels.count();
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(frames as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
        decoded_packets += 1;
    }

    if decoded_packets == 0 && failed_packets > 0 {
        return Err(DecodeError::Corrupt(failed_packets));
    }

    let sample_rate = sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
    let channels = channels.unwrap_or(1).max(1);

    debug!(
        path = %path.display(),
        frames = samples.len() / channels,
        channels,
        sample_rate,
        skipped_packets = failed_packets,
        "Decoded audio file"
    );

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::{
        CODEC_TYPE_AAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_VORBIS,
    };
    use tempfile::TempDir;

    #[test]
    fn test_registry_has_common_codecs() {
        for codec in [
            CODEC_TYPE_MP3,
            CODEC_TYPE_FLAC,
            CODEC_TYPE_VORBIS,
            CODEC_TYPE_AAC,
            CODEC_TYPE_PCM_S16LE,
        ] {
            assert!(codec_registry().get_codec(codec).is_some(), "missing {:?}", codec);
        }
    }

    #[cfg(not(feature = "opus"))]
    #[test]
    fn test_opus_without_decoder_points_to_alternatives() {
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_OPUS).with_sample_rate(48000);

        let err = match make_decoder(&params) {
            Ok(_) => panic!("Opus decoder unexpectedly available"),
            Err(e) => e,
        };

        assert!(matches!(err, DecodeError::OpusUnavailable));
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[cfg(feature = "opus")]
    #[test]
    fn test_opus_decoder_registered() {
        assert!(codec_registry().get_codec(CODEC_TYPE_OPUS).is_some());
    }

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[[i16; 2]]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &sample in frame.iter().take(channels as usize) {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo.wav");
        write_wav(&path, 2, 44100, &[[16384, -16384]; 100]);

        let decoded = decode_file(&path, Some("wav")).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.frames(), 100);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-4);
        assert!((decoded.samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let decoded = DecodedAudio {
            samples: vec![0.5, -0.5, 1.0, 0.0],
            channels: 2,
            sample_rate: 22050,
        };

        assert_eq!(decoded.to_mono(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_to_mono_passes_mono_through() {
        let decoded = DecodedAudio {
            samples: vec![0.1, 0.2, 0.3],
            channels: 1,
            sample_rate: 22050,
        };

        assert_eq!(decoded.to_mono(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_decode_text_file_fails_to_probe() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.mp3");
        std::fs::write(&path, "this is definitely not an mp3 file\n".repeat(64)).unwrap();

        let result = decode_file(&path, Some("mp3"));

        assert!(result.is_err(), "text renamed to .mp3 must not decode");
    }

    #[test]
    fn test_decode_missing_file_reports_open_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.wav");

        let result = decode_file(&path, None);

        assert!(matches!(result, Err(DecodeError::Open { .. })));
    }
}
