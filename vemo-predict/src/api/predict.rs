//! Prediction endpoint
//!
//! `POST /predict` takes a multipart form with the audio under field `file`.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    routing::post,
    Json, Router,
};
use tracing::warn;

use crate::error::{PredictError, PredictResult};
use crate::models::{PredictResponse, UploadedAudio};
use crate::AppState;

/// Multipart field carrying the audio
pub const UPLOAD_FIELD: &str = "file";

/// POST /predict
///
/// Model availability is checked before the body is read, so an unavailable
/// model never costs an upload.
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> PredictResult<Json<PredictResponse>> {
    state.inference.ready_model()?;

    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await?,
        Err(rejection) => {
            warn!("Request is not a multipart upload: {}", rejection);
            None
        }
    };

    let prediction = state.inference.handle_blocking(upload).await?;
    Ok(Json(prediction.into()))
}

/// First `file` part that carries a filename, or None when there is none
///
/// Parts named `file` without a `filename` attribute are plain form values
/// and are skipped. Body read failures (including the upload size limit)
/// are reported with the status the multipart parser assigns.
async fn read_upload(mut multipart: Multipart) -> PredictResult<Option<UploadedAudio>> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok(Some(UploadedAudio::new(file_name, bytes.to_vec())));
    }
    Ok(None)
}

fn upload_error(err: MultipartError) -> PredictError {
    let status = err.status();
    let reason = err.body_text();
    warn!(status = status.as_u16(), "Upload rejected: {}", reason);
    PredictError::upload_rejected(status, reason)
}

/// Build prediction routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/predict", post(predict))
}
