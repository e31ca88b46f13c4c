//! Error types for vemo-predict
//!
//! [`PredictError`] is the single failure type a prediction request can end
//! with. Every component error is folded into one of its kinds by the
//! inference orchestrator, and the HTTP layer renders it as
//! `{error, details, trace, code}` with the kind's status code.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::audio::{ConversionError, StagingError};
use crate::classifier::ClassifierError;
use crate::features::ExtractionError;
use crate::models::ErrorResponse;

/// Error category, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ClientInput,
    ModelUnavailable,
    AudioConversion,
    FeatureExtraction,
    Classification,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ClientInput => "CLIENT_INPUT_ERROR",
            ErrorKind::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorKind::AudioConversion => "AUDIO_CONVERSION_ERROR",
            ErrorKind::FeatureExtraction => "FEATURE_EXTRACTION_ERROR",
            ErrorKind::Classification => "CLASSIFICATION_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::ClientInput => StatusCode::BAD_REQUEST,
            ErrorKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::ClientInput)
    }
}

/// Prediction request failure
#[derive(Debug, Error)]
pub enum PredictError {
    /// Missing or unusable upload (400)
    #[error("{0}")]
    ClientInput(String),

    /// Multipart body could not be read (413 past the upload limit, else
    /// the status the multipart parser assigned)
    #[error("{summary}")]
    UploadRejected {
        status: StatusCode,
        summary: String,
        reason: String,
    },

    /// Model artifacts failed to load at startup (503)
    #[error("Model or encoder not loaded")]
    ModelUnavailable { reason: String },

    /// Upload could not be decoded or re-encoded (500)
    #[error("Audio conversion failed")]
    AudioConversion(#[source] ConversionError),

    /// Descriptor computation failed (500)
    #[error("Feature extraction failed")]
    FeatureExtraction(#[source] ExtractionError),

    /// Classifier rejected the feature vector (500)
    #[error("Classification failed")]
    Classification(#[source] ClassifierError),

    /// Anything else (500)
    #[error("Internal server error")]
    Internal {
        stage: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl PredictError {
    pub fn internal<E>(stage: &'static str, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PredictError::Internal {
            stage,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn upload_rejected(status: StatusCode, reason: impl Into<String>) -> Self {
        let summary = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload exceeds the size limit"
        } else {
            "Malformed upload"
        };
        PredictError::UploadRejected {
            status,
            summary: summary.to_string(),
            reason: reason.into(),
        }
    }

    pub fn internal_message(stage: &'static str, message: impl Into<String>) -> Self {
        PredictError::Internal {
            stage,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::ClientInput(_) | PredictError::UploadRejected { .. } => ErrorKind::ClientInput,
            PredictError::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            PredictError::AudioConversion(_) => ErrorKind::AudioConversion,
            PredictError::FeatureExtraction(_) => ErrorKind::FeatureExtraction,
            PredictError::Classification(_) => ErrorKind::Classification,
            PredictError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::UploadRejected { status, .. } => *status,
            other => other.kind().status(),
        }
    }

    /// Pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            PredictError::ClientInput(_)
            | PredictError::UploadRejected { .. }
            | PredictError::ModelUnavailable { .. } => "received",
            PredictError::AudioConversion(_) => "converting",
            PredictError::FeatureExtraction(_) => "extracting_features",
            PredictError::Classification(_) => "classifying",
            PredictError::Internal { stage, .. } => *stage,
        }
    }

    /// Underlying cause as shown to the caller
    pub fn details(&self) -> String {
        match self {
            PredictError::ClientInput(message) => message.clone(),
            PredictError::UploadRejected { reason, .. } => reason.clone(),
            PredictError::ModelUnavailable { reason } => reason.clone(),
            PredictError::Internal { message, .. } => message.clone(),
            other => other
                .source()
                .map(|cause| cause.to_string())
                .unwrap_or_else(|| other.to_string()),
        }
    }

    /// Stage line followed by the error and each of its causes
    pub fn trace(&self) -> String {
        let mut trace = format!("stage: {}", self.stage());
        let mut current: Option<&dyn StdError> = Some(self);
        let mut depth = 0;
        while let Some(err) = current {
            trace.push_str(&format!("\n{}: {}", depth, err));
            current = err.source();
            depth += 1;
        }
        trace
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            details: self.details(),
            trace: self.trace(),
            code: self.kind().code().to_string(),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_response_body())).into_response()
    }
}

/// Result type for prediction handlers
pub type PredictResult<T> = Result<T, PredictError>;

/// Failures assembling the service at startup
///
/// Model loading is not among them: a missing or invalid model leaves the
/// service running in a degraded state instead.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("staging area unavailable: {0}")]
    Staging(#[from] StagingError),

    #[error("codec backend unavailable: {0}")]
    Codec(#[from] ConversionError),
}
