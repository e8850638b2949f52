//! Error types for queue operations

use kubeshift_domain::DomainError;
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// Domain validation failed (for example an out-of-range concurrency bound)
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The manager was shut down and accepts no further processing requests
    #[error("Queue manager has been shut down")]
    ShutDown,

    /// No tokio runtime is available to host the dispatch loop
    #[error("No async runtime available: {0}")]
    Runtime(String),

    /// The dispatch loop task ended abnormally
    #[error("Dispatch loop failed: {0}")]
    DispatchLoop(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
