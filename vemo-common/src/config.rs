//! Configuration file discovery and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration file resolution following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config directory (`<config_dir>/vemo/<file_name>`)
/// 4. System config directory (`/etc/vemo/<file_name>`, unix only)
///
/// Explicitly requested files (1, 2) must exist. Returns `Ok(None)` when no
/// file was requested and none of the default locations has one; callers then
/// run on compiled defaults.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf(), "command line");
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path), env_var_name);
        }
    }

    // Priority 3 and 4: default locations
    for candidate in default_config_locations(file_name) {
        if candidate.is_file() {
            debug!("Found config file at default location: {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn require_existing(path: PathBuf, origin: &str) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::ConfigNotFound {
            origin: origin.to_string(),
            path,
        })
    }
}

/// Default configuration file locations for the platform, highest priority first
pub fn default_config_locations(file_name: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("vemo").join(file_name));
    }

    if cfg!(unix) {
        locations.push(PathBuf::from("/etc/vemo").join(file_name));
    }

    locations
}

/// Load a TOML configuration, falling back to `T::default()` when no file is given
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config = toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// OS-dependent default directory for per-request scratch files
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        name: String,
        port: u16,
    }

    #[test]
    #[serial]
    fn test_cli_arg_takes_priority_over_env() {
        let temp_dir = TempDir::new().unwrap();
        let cli_file = temp_dir.path().join("cli.toml");
        let env_file = temp_dir.path().join("env.toml");
        std::fs::write(&cli_file, "").unwrap();
        std::fs::write(&env_file, "").unwrap();

        std::env::set_var("VEMO_TEST_CONFIG_A", &env_file);
        let resolved =
            resolve_config_file(Some(&cli_file), "VEMO_TEST_CONFIG_A", "unused.toml").unwrap();
        std::env::remove_var("VEMO_TEST_CONFIG_A");

        assert_eq!(resolved, Some(cli_file));
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli_arg() {
        let temp_dir = TempDir::new().unwrap();
        let env_file = temp_dir.path().join("env.toml");
        std::fs::write(&env_file, "").unwrap();

        std::env::set_var("VEMO_TEST_CONFIG_B", &env_file);
        let resolved = resolve_config_file(None, "VEMO_TEST_CONFIG_B", "unused.toml").unwrap();
        std::env::remove_var("VEMO_TEST_CONFIG_B");

        assert_eq!(resolved, Some(env_file));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");

        let result = resolve_config_file(Some(&missing), "VEMO_TEST_CONFIG_C", "unused.toml");

        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_unreadable_path_reports_read_error() {
        let temp_dir = TempDir::new().unwrap();

        let result: Result<SampleConfig> = load_toml_config(Some(temp_dir.path()));

        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config: SampleConfig = load_toml_config(None).unwrap();
        assert_eq!(config, SampleConfig::default());
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.toml");
        std::fs::write(&path, "port = 8080\n").unwrap();

        let config: SampleConfig = load_toml_config(Some(&path)).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.name, "");
    }

    #[test]
    fn test_load_invalid_toml_reports_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "port = [unterminated").unwrap();

        let result: Result<SampleConfig> = load_toml_config(Some(&path));

        assert!(matches!(result, Err(Error::ConfigParse { .. })));
    }
}
