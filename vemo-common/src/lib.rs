//! # VEMO Common Library
//!
//! Shared code for the VEMO speech-emotion services:
//! - Common error type
//! - Configuration file discovery and TOML loading

pub mod config;
pub mod error;

pub use error::{Error, Result};
