//! HTTP API handlers for vemo-predict

pub mod health;
pub mod predict;

pub use health::health_routes;
pub use predict::predict_routes;
