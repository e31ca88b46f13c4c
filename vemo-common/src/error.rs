//! Common error types for VEMO

use std::path::PathBuf;

use thiserror::Error;

/// Common result type for VEMO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors shared by VEMO services
#[derive(Error, Debug)]
pub enum Error {
    /// Explicitly requested config file does not exist
    #[error("Config file from {origin} not found: {path}")]
    ConfigNotFound { origin: String, path: PathBuf },

    /// Config file exists but could not be read
    #[error("Read TOML failed ({path}): {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the target type
    #[error("Parse TOML failed ({path}): {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}
