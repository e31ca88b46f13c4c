//! Health check endpoint
//!
//! Reports uptime, build identification, the active codec backend and whether
//! the classifier artifacts loaded.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::classifier::ModelSummary;
use crate::AppState;

/// Build identification captured by build.rs
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            git_hash: env!("GIT_HASH").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the model is unavailable
    pub status: String,
    /// Module name ("vemo-predict")
    pub module: String,
    pub version: String,
    pub build: BuildInfo,
    pub uptime_seconds: u64,
    /// Transcoder backend ("native" or "ffmpeg")
    pub codec_backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSummary>,
    /// Why the artifacts failed to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let model_state = state.inference.model();
    let status = if model_state.is_ready() { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "vemo-predict".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: BuildInfo::current(),
        uptime_seconds,
        codec_backend: state.inference.codec_backend().to_string(),
        model: model_state.summary(),
        model_error: model_state.unavailable_reason().map(str::to_string),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
