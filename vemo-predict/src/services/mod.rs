//! Service modules for the prediction pipeline

pub mod inference_orchestrator;

pub use inference_orchestrator::{InferenceService, ModelState, RequestStage};
