//! Data models for vemo-predict
//!
//! Request input and response bodies shared by the HTTP and CLI front ends.

pub mod prediction;
pub mod upload;

pub use prediction::{ErrorResponse, PredictResponse};
pub use upload::UploadedAudio;
