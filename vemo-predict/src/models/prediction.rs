//! Prediction response bodies

use serde::{Deserialize, Serialize};

use crate::classifier::PredictionResult;

/// Successful prediction: `{"emotion": "...", "confidence": 87.5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub emotion: String,
    pub confidence: f64,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            emotion: result.label,
            confidence: result.confidence,
        }
    }
}

/// Failed prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable summary
    pub error: String,
    /// Underlying cause
    pub details: String,
    /// Failing stage followed by the cause chain, one per line
    pub trace: String,
    /// Stable machine-readable kind, e.g. `AUDIO_CONVERSION_ERROR`
    pub code: String,
}
