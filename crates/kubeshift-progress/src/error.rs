//! Error types for progress tracking and persistence

use kubeshift_config::ConfigError;
use thiserror::Error;

/// Errors that can occur while tracking or persisting progress
#[derive(Debug, Error)]
pub enum ProgressError {
    /// No operation is tracked under this id
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// The id cannot be used as a storage key
    #[error("Invalid operation id: {0:?}")]
    InvalidOperationId(String),

    /// Nothing has been persisted for this operation
    #[error("No persisted progress for operation: {0}")]
    PersistedStateNotFound(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML encoding or decoding failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A persisted document is internally inconsistent
    #[error("Invalid persisted progress: {0}")]
    Validation(String),

    /// Storage location could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for progress operations
pub type ProgressResult<T> = Result<T, ProgressError>;
