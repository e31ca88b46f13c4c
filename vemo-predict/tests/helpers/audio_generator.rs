//! Audio Test Fixture Generator
//!
//! In-memory WAV clips with a chosen rate, channel count and duration

use std::io::Cursor;

/// Shape of a generated clip
#[derive(Debug, Clone)]
pub struct ClipConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sine frequency, or None for digital silence
    pub tone_hz: Option<f64>,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 1.0,
            sample_rate: 22050,
            channels: 1,
            tone_hz: Some(220.0),
        }
    }
}

impl ClipConfig {
    pub fn silence(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            tone_hz: None,
            ..Default::default()
        }
    }

    pub fn tone(duration_seconds: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            duration_seconds,
            sample_rate,
            channels,
            ..Default::default()
        }
    }
}

/// Encode a 16-bit PCM WAV clip
pub fn wav_bytes(config: &ClipConfig) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let total_frames = (config.duration_seconds * config.sample_rate as f64) as usize;

        for i in 0..total_frames {
            let sample = match config.tone_hz {
                Some(freq) => {
                    let t = i as f64 / config.sample_rate as f64;
                    ((2.0 * std::f64::consts::PI * freq * t).sin() * 8000.0) as i16
                }
                None => 0,
            };
            for _ in 0..config.channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
