//! Configuration types

use crate::error::Result;
use crate::paths;
use kubeshift_domain::DEFAULT_MAX_CONCURRENT_MIGRATIONS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct KubeshiftConfig {
    /// Queue manager settings
    pub queue: QueueConfig,
    /// Progress tracker settings
    pub progress: ProgressConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Queue manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of migrations dispatched at once, 1 to 10
    pub max_concurrent_migrations: usize,
    /// Start the background worker as soon as the manager is built
    pub auto_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_migrations: DEFAULT_MAX_CONCURRENT_MIGRATIONS,
            auto_start: false,
        }
    }
}

/// On-disk format of persisted progress documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl PersistFormat {
    /// File extension for documents in this format
    pub fn extension(&self) -> &'static str {
        match self {
            PersistFormat::Json => "json",
            PersistFormat::Yaml => "yaml",
        }
    }
}

/// Progress tracker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    /// Where persisted progress lives; defaults under the KubeShift home
    pub storage_dir: Option<PathBuf>,
    /// Document format
    pub format: PersistFormat,
    /// Persist an operation automatically once it turns terminal.
    ///
    /// The document is written synchronously by the call that finishes the
    /// operation.
    pub persist_on_complete: bool,
    /// Age after which terminal operations are dropped by `cleanup_expired`
    pub retention_hours: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            format: PersistFormat::Json,
            persist_on_complete: true,
            retention_hours: 24,
        }
    }
}

impl ProgressConfig {
    /// Configured storage directory, or the per-user default
    pub fn resolved_storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_progress_dir(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `kubeshift_queue=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
