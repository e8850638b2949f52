//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    paths,
    types::KubeshiftConfig,
};

/// Environment prefix; `KUBESHIFT__QUEUE__MAX_CONCURRENT_MIGRATIONS=4` sets `queue.max_concurrent_migrations`
pub const ENV_PREFIX: &str = "KUBESHIFT";

/// Loads, validates and saves [`KubeshiftConfig`]
pub struct ConfigManager {
    /// Configuration file path
    config_path: PathBuf,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    /// Manager for the default per-user configuration file
    pub fn new() -> Self {
        Self {
            config_path: paths::default_config_path(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Manager for a specific configuration file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Override the environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Path of the configuration file
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file (if present) layered under environment variables, then validate
    pub fn load_config(&self) -> Result<KubeshiftConfig> {
        debug!(path = %self.config_path.display(), "Loading configuration");

        let builder = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(false))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let app_config: KubeshiftConfig = config.try_deserialize()?;
        self.validate_config(&app_config)?;
        Ok(app_config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save_config(&self, config: &KubeshiftConfig) -> Result<()> {
        self.validate_config(config)?;
        let toml = toml::to_string(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    /// Reject values the runtime components would refuse
    pub fn validate_config(&self, config: &KubeshiftConfig) -> Result<()> {
        kubeshift_domain::validate_concurrency(config.queue.max_concurrent_migrations)?;

        if config.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Logging level cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PersistFormat;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("absent.toml"))
            .with_env_prefix("KUBESHIFT_TEST_MISSING");

        let config = manager.load_config().unwrap();
        assert_eq!(config, KubeshiftConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path.clone()).with_env_prefix("KUBESHIFT_TEST_SAVE");

        let mut config = KubeshiftConfig::default();
        config.queue.max_concurrent_migrations = 7;
        config.progress.format = PersistFormat::Yaml;
        config.progress.retention_hours = 48;

        manager.save_config(&config).unwrap();
        assert!(path.exists());

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.queue.max_concurrent_migrations, 7);
        assert_eq!(loaded.progress.format, PersistFormat::Yaml);
        assert_eq!(loaded.progress.retention_hours, 48);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nmax_concurrent_migrations = 2\n").unwrap();

        std::env::set_var("KUBESHIFT_TEST_ENV__QUEUE__MAX_CONCURRENT_MIGRATIONS", "9");
        let manager = ConfigManager::with_path(path).with_env_prefix("KUBESHIFT_TEST_ENV");
        let loaded = manager.load_config();
        std::env::remove_var("KUBESHIFT_TEST_ENV__QUEUE__MAX_CONCURRENT_MIGRATIONS");

        assert_eq!(loaded.unwrap().queue.max_concurrent_migrations, 9);
    }

    #[test]
    fn test_out_of_range_concurrency_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nmax_concurrent_migrations = 11\n").unwrap();

        let manager = ConfigManager::with_path(path).with_env_prefix("KUBESHIFT_TEST_RANGE");
        let err = manager.load_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_empty_log_level_rejected() {
        let manager = ConfigManager::with_path(PathBuf::from("unused.toml"));
        let mut config = KubeshiftConfig::default();
        config.logging.level = "  ".to_string();
        assert!(manager.validate_config(&config).is_err());
    }
}
