//! Per-user locations for configuration and persisted state

use crate::error::{ConfigError, Result};
use std::path::PathBuf;

/// Environment variable overriding the KubeShift home directory
pub const HOME_ENV_VAR: &str = "KUBESHIFT_HOME";

/// Resolve the KubeShift home directory.
///
/// `KUBESHIFT_HOME` wins; otherwise the platform data directory, then `~/.kubeshift`.
pub fn resolve_home() -> Result<PathBuf> {
    if let Ok(home_override) = std::env::var(HOME_ENV_VAR) {
        if !home_override.trim().is_empty() {
            return Ok(PathBuf::from(home_override));
        }
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("kubeshift"));
    }

    if let Some(home_dir) = dirs::home_dir() {
        return Ok(home_dir.join(".kubeshift"));
    }

    Err(ConfigError::PathResolution(
        "Could not determine home directory".to_string(),
    ))
}

/// Directory holding one persisted document per migration operation
pub fn default_progress_dir() -> Result<PathBuf> {
    Ok(resolve_home()?.join("progress"))
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kubeshift")
        .join("config.toml")
}
