//! Service configuration for vemo-predict
//!
//! Resolution priority per setting: CLI flag → environment variable (`VEMO_*`,
//! handled by clap) → TOML file → compiled default. The TOML file itself is
//! located by [`vemo_common::config::resolve_config_file`].
//!
//! Sample rate, channel count and feature parameters are deliberately absent:
//! they are fixed by the trained model.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use vemo_common::config::{default_staging_dir, load_toml_config, resolve_config_file};
use vemo_common::{Error, Result};

use crate::audio::CodecBackend;

/// Config file name looked up in the default locations
pub const CONFIG_FILE_NAME: &str = "vemo-predict.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VEMO_CONFIG";

/// Default log filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "vemo_predict=info,tower_http=info";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub codec: CodecConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub classifier_path: PathBuf,
    pub label_encoder_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: PathBuf::from("model/emotion_model.json"),
            label_encoder_path: PathBuf::from("model/label_encoder.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub staging_dir: PathBuf,
    /// Normalize `.wav` uploads too instead of reading them directly
    pub always_normalize: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            always_normalize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub backend: CodecBackend,
    /// Binary used by the `ffmpeg` backend
    pub ffmpeg_path: PathBuf,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            backend: CodecBackend::Native,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Values given on the command line or through `VEMO_*` variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub classifier_path: Option<PathBuf>,
    pub label_encoder_path: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub codec_backend: Option<CodecBackend>,
    pub ffmpeg_path: Option<PathBuf>,
    pub always_normalize: bool,
    pub log_level: Option<String>,
}

impl ServiceConfig {
    /// Locate and read the TOML file, then apply overrides and validate
    pub fn load(config_arg: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let path = resolve_config_file(config_arg, CONFIG_ENV_VAR, CONFIG_FILE_NAME)?;
        let mut config: ServiceConfig = load_toml_config(path.as_deref())?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(path) = overrides.classifier_path {
            self.model.classifier_path = path;
        }
        if let Some(path) = overrides.label_encoder_path {
            self.model.label_encoder_path = path;
        }
        if let Some(dir) = overrides.staging_dir {
            self.audio.staging_dir = dir;
        }
        if let Some(backend) = overrides.codec_backend {
            self.codec.backend = backend;
        }
        if let Some(path) = overrides.ffmpeg_path {
            self.codec.ffmpeg_path = path;
        }
        if overrides.always_normalize {
            self.audio.always_normalize = true;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config("server.max_upload_bytes must be positive".to_string()));
        }
        if self.codec.backend == CodecBackend::Ffmpeg && self.codec.ffmpeg_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "codec.ffmpeg_path must be set for the ffmpeg backend".to_string(),
            ));
        }
        self.bind_address()?;
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                Error::Config(format!(
                    "Invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }

    pub fn log_summary(&self) {
        info!(
            "Configuration: listen={}:{}, classifier={}, labels={}, staging={}, codec={}, always_normalize={}",
            self.server.host,
            self.server.port,
            self.model.classifier_path.display(),
            self.model.label_encoder_path.display(),
            self.audio.staging_dir.display(),
            self.codec.backend,
            self.audio.always_normalize
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.codec.backend, CodecBackend::Native);
        assert!(!config.audio.always_normalize);
        assert_eq!(
            config.model.classifier_path,
            PathBuf::from("model/emotion_model.json")
        );
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [codec]
            backend = "ffmpeg"
            ffmpeg_path = "/usr/local/bin/ffmpeg"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.codec.backend, CodecBackend::Ffmpeg);
        assert_eq!(config.codec.ffmpeg_path, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut config: ServiceConfig = toml::from_str("[server]\nport = 8080\n").unwrap();
        config.apply(ConfigOverrides {
            port: Some(9000),
            classifier_path: Some(PathBuf::from("/models/m.json")),
            always_normalize: true,
            ..Default::default()
        });

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.classifier_path, PathBuf::from("/models/m.json"));
        assert!(config.audio.always_normalize);
    }

    #[test]
    fn test_invalid_host_fails_validation() {
        let mut config = ServiceConfig::default();
        config.server.host = "not a host".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: std::result::Result<ServiceConfig, _> = toml::from_str("[codec]\nbackend = \"sox\"\n");
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vemo-predict.toml");
        std::fs::write(&path, "[audio]\nalways_normalize = true\n").unwrap();

        let config = ServiceConfig::load(Some(&path), ConfigOverrides::default()).unwrap();

        assert!(config.audio.always_normalize);
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file_fails() {
        let result = ServiceConfig::load(
            Some(Path::new("/nonexistent/vemo-predict.toml")),
            ConfigOverrides::default(),
        );
        assert!(result.is_err());
    }
}
