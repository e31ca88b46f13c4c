//! vemo-predict library interface
//!
//! Speech emotion prediction: an uploaded recording is normalized to mono
//! 22050 Hz, summarized as a 208-value feature vector and classified by a
//! pre-trained gradient-boosted tree model.
//!
//! Exposes every pipeline component for integration testing and for the
//! `vemo-predict` binary.

pub mod api;
pub mod audio;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod models;
pub mod services;

pub use crate::error::{ErrorKind, PredictError, PredictResult, StartupError};

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::audio::{build_transcoder, AudioNormalizer, StagingArea};
use crate::config::ServiceConfig;
use crate::features::FeatureExtractor;
use crate::services::{InferenceService, ModelState};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Prediction pipeline with its read-only model
    pub inference: Arc<InferenceService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(inference: Arc<InferenceService>) -> Self {
        Self {
            inference,
            startup_time: Utc::now(),
        }
    }
}

/// Assemble the pipeline from configuration
///
/// The codec backend and staging directory must be usable or startup fails.
/// Model artifacts that fail to load leave the service up but every
/// prediction answering "model unavailable".
pub fn build_inference_service(config: &ServiceConfig) -> Result<InferenceService, StartupError> {
    let staging = StagingArea::new(&config.audio.staging_dir)?;
    let transcoder = build_transcoder(config.codec.backend, &config.codec.ffmpeg_path)?;
    let model = ModelState::load(&config.model.classifier_path, &config.model.label_encoder_path);

    Ok(InferenceService::new(
        model,
        AudioNormalizer::new(transcoder),
        FeatureExtractor::new(),
        staging,
        config.audio.always_normalize,
    ))
}

/// Build application router
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(api::predict_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
