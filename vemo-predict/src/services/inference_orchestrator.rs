//! Inference orchestrator
//!
//! Owns one prediction request from upload to response:
//!
//! RECEIVED → STAGED → (CONVERTED) → FEATURES_EXTRACTED → CLASSIFIED
//!
//! Any stage can fail; the first failure ends the request. Every file the
//! request staged or converted is deleted before [`InferenceService::handle`]
//! returns, on success and on failure alike.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::audio::{AudioNormalizer, StagingArea};
use crate::classifier::{ArtifactError, ClassifierAdapter, ModelSummary, PredictionResult};
use crate::error::{PredictError, PredictResult};
use crate::features::FeatureExtractor;
use crate::models::UploadedAudio;

/// Request lifecycle stages, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Staged,
    Converted,
    FeaturesExtracted,
    Classified,
}

impl RequestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::Staged => "staged",
            RequestStage::Converted => "converted",
            RequestStage::FeaturesExtracted => "features_extracted",
            RequestStage::Classified => "classified",
        }
    }
}

/// Classifier availability, fixed at startup
#[derive(Debug, Clone)]
pub enum ModelState {
    Ready(Arc<ClassifierAdapter>),
    Unavailable { reason: String },
}

impl ModelState {
    /// Load the artifacts, recording the failure instead of aborting startup
    pub fn load(classifier_path: &Path, label_encoder_path: &Path) -> Self {
        match ClassifierAdapter::load(classifier_path, label_encoder_path) {
            Ok(adapter) => ModelState::Ready(Arc::new(adapter)),
            Err(e) => {
                error!("Failed to load model/encoder: {}", e);
                ModelState::from_error(&e)
            }
        }
    }

    pub fn from_error(err: &ArtifactError) -> Self {
        ModelState::Unavailable {
            reason: err.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }

    pub fn summary(&self) -> Option<ModelSummary> {
        match self {
            ModelState::Ready(adapter) => Some(adapter.summary()),
            ModelState::Unavailable { .. } => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            ModelState::Ready(_) => None,
            ModelState::Unavailable { reason } => Some(reason),
        }
    }
}

/// Stateless prediction pipeline shared by all requests
pub struct InferenceService {
    model: ModelState,
    normalizer: AudioNormalizer,
    extractor: FeatureExtractor,
    staging: StagingArea,
    always_normalize: bool,
}

impl InferenceService {
    pub fn new(
        model: ModelState,
        normalizer: AudioNormalizer,
        extractor: FeatureExtractor,
        staging: StagingArea,
        always_normalize: bool,
    ) -> Self {
        Self {
            model,
            normalizer,
            extractor,
            staging,
            always_normalize,
        }
    }

    pub fn model(&self) -> &ModelState {
        &self.model
    }

    pub fn codec_backend(&self) -> &'static str {
        self.normalizer.backend_name()
    }

    /// Fail fast when the artifacts did not load
    pub fn ready_model(&self) -> PredictResult<Arc<ClassifierAdapter>> {
        match &self.model {
            ModelState::Ready(adapter) => Ok(Arc::clone(adapter)),
            ModelState::Unavailable { reason } => Err(PredictError::ModelUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Run one request to completion (blocking)
    pub fn handle(&self, upload: Option<UploadedAudio>) -> PredictResult<PredictionResult> {
        let request_id = Uuid::new_v4();
        let span = info_span!("predict", %request_id);
        let _enter = span.enter();

        let result = self.run(upload);

        match &result {
            Ok(prediction) => info!(
                emotion = %prediction.label,
                confidence = prediction.confidence,
                "Prediction complete"
            ),
            Err(e) if e.kind().is_client_error() => warn!(
                code = e.kind().code(),
                "Prediction rejected: {}",
                e
            ),
            Err(e) => error!(
                code = e.kind().code(),
                status = e.status().as_u16(),
                "Prediction failed: {}\n{}",
                e,
                e.trace()
            ),
        }

        result
    }

    /// Run [`handle`](Self::handle) on the blocking thread pool
    pub async fn handle_blocking(
        self: &Arc<Self>,
        upload: Option<UploadedAudio>,
    ) -> PredictResult<PredictionResult> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.handle(upload))
            .await
            .map_err(|e| PredictError::internal("worker", e))?
    }

    fn run(&self, upload: Option<UploadedAudio>) -> PredictResult<PredictionResult> {
        let model = self.ready_model()?;

        let upload = upload.ok_or_else(|| PredictError::ClientInput("No file uploaded".to_string()))?;
        if !upload.has_file_name() {
            return Err(PredictError::ClientInput("File name is empty".to_string()));
        }
        debug!(
            stage = RequestStage::Received.as_str(),
            file_name = %upload.file_name,
            bytes = upload.bytes.len()
        );

        // Dropping the scope deletes everything staged below
        let mut scope = self.staging.scope();

        let staged = scope
            .stage(&upload)
            .map_err(|e| PredictError::internal("staging", e))?;
        drop(upload);
        debug!(
            stage = RequestStage::Staged.as_str(),
            path = %staged.path().display()
        );

        let canonical_path = if staged.is_canonical() && !self.always_normalize {
            staged.path().to_path_buf()
        } else {
            let output = scope
                .reserve_canonical()
                .map_err(|e| PredictError::internal("staging", e))?;
            let canonical = self
                .normalizer
                .normalize(&staged, &output)
                .map_err(PredictError::AudioConversion)?;
            debug!(
                stage = RequestStage::Converted.as_str(),
                frames = canonical.frames,
                sample_rate = canonical.sample_rate
            );
            canonical.path
        };

        let features = self
            .extractor
            .extract_file(&canonical_path)
            .map_err(PredictError::FeatureExtraction)?;
        debug!(
            stage = RequestStage::FeaturesExtracted.as_str(),
            dimensions = features.len()
        );

        let prediction = model.predict(&features).map_err(PredictError::Classification)?;
        debug!(stage = RequestStage::Classified.as_str());

        Ok(prediction)
    }
}
