//! Pipeline Integration Tests
//!
//! Normalizer, feature extractor and classifier wired together the way the
//! service runs them, against on-disk fixtures.

mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use helpers::audio_generator::{wav_bytes, ClipConfig};
use helpers::{count_entries, TestEnv, FIXTURE_LABELS};
use vemo_predict::audio::{
    decode_file, AudioNormalizer, CanonicalWaveform, StagingArea, CANONICAL_CHANNELS,
    CANONICAL_SAMPLE_RATE,
};
use vemo_predict::classifier::ClassifierAdapter;
use vemo_predict::features::{FeatureExtractor, FEATURE_DIM};
use vemo_predict::models::UploadedAudio;
use vemo_predict::{build_inference_service, ErrorKind};

/// Stereo 44.1 kHz 16-bit FLAC, 440 Hz tone, 24576 frames
const FLAC_FIXTURE: &str = "tone_stereo_44k.flac";
const FLAC_FIXTURE_FRAMES: usize = 24576;

/// Stereo 44.1 kHz 128 kbps MPEG-1 Layer III, silent, 44 frames of 1152 samples
const MP3_FIXTURE: &str = "silence_stereo_44k.mp3";
const MP3_FIXTURE_FRAMES: usize = 44 * 1152;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_upload(name: &str) -> UploadedAudio {
    UploadedAudio::new(name, std::fs::read(fixture_path(name)).unwrap())
}

fn normalize_upload(env: &TestEnv, upload: &UploadedAudio) -> (u32, u16, u32) {
    let staging = StagingArea::new(&env.staging_dir).unwrap();
    let mut scope = staging.scope();
    let staged = scope.stage(upload).unwrap();
    let output = scope.reserve_canonical().unwrap();

    let canonical = AudioNormalizer::native().normalize(&staged, &output).unwrap();
    (canonical.frames, canonical.channels, canonical.sample_rate)
}

fn normalize_clip(env: &TestEnv, name: &str, config: &ClipConfig) -> (u32, u16, u32) {
    normalize_upload(env, &UploadedAudio::new(name, wav_bytes(config)))
}

#[test]
fn test_normalize_stereo_44k_to_canonical() {
    let env = TestEnv::new();

    let (frames, channels, sample_rate) = normalize_clip(&env, "in.wav", &ClipConfig::tone(2.0, 44100, 2));

    assert_eq!(channels, CANONICAL_CHANNELS);
    assert_eq!(sample_rate, CANONICAL_SAMPLE_RATE);
    let expected = 2 * CANONICAL_SAMPLE_RATE;
    assert!(frames.abs_diff(expected) <= 256, "frames {} vs {}", frames, expected);
    assert_eq!(env.staged_files(), 0);
}

#[test]
fn test_normalize_stereo_48k_to_canonical() {
    let env = TestEnv::new();

    let (frames, channels, sample_rate) = normalize_clip(&env, "in.wav", &ClipConfig::tone(1.0, 48000, 2));

    assert_eq!(channels, 1);
    assert_eq!(sample_rate, 22050);
    assert!(frames.abs_diff(22050) <= 256, "frames {}", frames);
}

#[test]
fn test_decode_flac_fixture_keeps_source_format() {
    let decoded = decode_file(&fixture_path(FLAC_FIXTURE), Some("flac")).unwrap();

    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.sample_rate, 44100);
    assert_eq!(decoded.samples.len(), FLAC_FIXTURE_FRAMES * 2);
    let peak = decoded.samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    assert!((0.25..=0.35).contains(&peak), "peak {}", peak);
}

#[test]
fn test_decode_mp3_fixture_keeps_source_format() {
    let decoded = decode_file(&fixture_path(MP3_FIXTURE), Some("mp3")).unwrap();

    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.sample_rate, 44100);
    let frames = decoded.samples.len() / 2;
    assert!(frames.abs_diff(MP3_FIXTURE_FRAMES) <= 2 * 1152, "frames {}", frames);
}

#[test]
fn test_normalize_flac_to_canonical() {
    let env = TestEnv::new();

    let (frames, channels, sample_rate) = normalize_upload(&env, &fixture_upload(FLAC_FIXTURE));

    assert_eq!(channels, CANONICAL_CHANNELS);
    assert_eq!(sample_rate, CANONICAL_SAMPLE_RATE);
    let expected = (FLAC_FIXTURE_FRAMES / 2) as u32;
    assert!(frames.abs_diff(expected) <= 256, "frames {} vs {}", frames, expected);
    assert_eq!(env.staged_files(), 0);
}

#[test]
fn test_normalize_mp3_to_canonical() {
    let env = TestEnv::new();

    let (frames, channels, sample_rate) = normalize_upload(&env, &fixture_upload(MP3_FIXTURE));

    assert_eq!(channels, CANONICAL_CHANNELS);
    assert_eq!(sample_rate, CANONICAL_SAMPLE_RATE);
    let expected = (MP3_FIXTURE_FRAMES / 2) as u32;
    assert!(frames.abs_diff(expected) <= 1152, "frames {} vs {}", frames, expected);
    assert_eq!(env.staged_files(), 0);
}

#[test]
fn test_compressed_uploads_predict_through_service() {
    let env = TestEnv::new();
    let service = build_inference_service(&env.config()).unwrap();

    for name in [FLAC_FIXTURE, MP3_FIXTURE] {
        let prediction = service.handle(Some(fixture_upload(name))).unwrap();

        assert!(FIXTURE_LABELS.contains(&prediction.label.as_str()), "{}", name);
        assert_eq!(count_entries(&env.staging_dir), 0, "leftover files after {}", name);
    }
}

#[test]
fn test_feature_length_independent_of_duration() {
    let extractor = FeatureExtractor::new();

    for seconds in [0.05_f64, 0.5, 2.0, 6.0] {
        let frames = (seconds * CANONICAL_SAMPLE_RATE as f64) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 0.07).sin() * 0.3)
            .collect();
        let waveform = CanonicalWaveform::from_canonical_samples(samples);

        let features = extractor.extract(&waveform).unwrap();

        assert_eq!(features.len(), FEATURE_DIM, "duration {}s", seconds);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_extraction_is_deterministic_across_extractors() {
    let samples: Vec<f32> = (0..30000).map(|i| ((i % 97) as f32 / 97.0) - 0.5).collect();
    let waveform = CanonicalWaveform::from_canonical_samples(samples);

    let a = FeatureExtractor::new().extract(&waveform).unwrap();
    let b = FeatureExtractor::new().extract(&waveform).unwrap();

    assert_eq!(a.as_slice(), b.as_slice());
}

#[test]
fn test_fixture_artifacts_load_and_predict() {
    let env = TestEnv::new();
    let adapter = ClassifierAdapter::load(&env.classifier_path, &env.labels_path).unwrap();

    let features = FeatureExtractor::new()
        .extract(&CanonicalWaveform::from_canonical_samples(vec![0.0; 22050]))
        .unwrap();
    let prediction = adapter.predict(&features).unwrap();

    assert!(FIXTURE_LABELS.contains(&prediction.label.as_str()));
    assert!((0.0..=100.0).contains(&prediction.confidence));
}

#[test]
fn test_full_pipeline_is_idempotent() {
    let env = TestEnv::new();
    let service = Arc::new(build_inference_service(&env.config()).unwrap());
    let upload = UploadedAudio::new("speech.wav", wav_bytes(&ClipConfig::tone(1.2, 16000, 1)));

    let first = service.handle(Some(upload.clone())).unwrap();
    let second = service.handle(Some(upload)).unwrap();

    assert_eq!(first, second);
    assert_eq!(count_entries(&env.staging_dir), 0);
}

#[test]
fn test_always_normalize_matches_direct_read_for_canonical_wav() {
    let env = TestEnv::new();
    let direct = build_inference_service(&env.config()).unwrap();
    let mut config = env.config();
    config.audio.always_normalize = true;
    let normalized = build_inference_service(&config).unwrap();
    let upload = UploadedAudio::new("clip.wav", wav_bytes(&ClipConfig::tone(1.0, 22050, 1)));

    let a = direct.handle(Some(upload.clone())).unwrap();
    let b = normalized.handle(Some(upload)).unwrap();

    assert_eq!(a.label, b.label);
    assert_eq!(count_entries(&env.staging_dir), 0);
}

#[test]
fn test_label_count_mismatch_leaves_model_unavailable() {
    let env = TestEnv::new();
    std::fs::write(&env.labels_path, r#"["calm", "happy"]"#).unwrap();

    let service = build_inference_service(&env.config()).unwrap();
    let err = service
        .handle(Some(UploadedAudio::new("a.wav", wav_bytes(&ClipConfig::silence(0.3)))))
        .unwrap_err();

    assert!(!service.model().is_ready());
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
}

#[tokio::test]
async fn test_handle_blocking_matches_handle() {
    let env = TestEnv::new();
    let service = Arc::new(build_inference_service(&env.config()).unwrap());
    let upload = UploadedAudio::new("clip.wav", wav_bytes(&ClipConfig::tone(0.6, 22050, 1)));

    let direct = service.handle(Some(upload.clone())).unwrap();
    let pooled = service.handle_blocking(Some(upload)).await.unwrap();

    assert_eq!(direct, pooled);
}
