//! Error types shared by the KubeShift crates

use crate::status::QueueItemStatus;
use thiserror::Error;

/// Errors raised by domain-level validation and by orchestrator implementations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Requested concurrency bound is outside the accepted range
    #[error("Invalid concurrency bound {requested}: must be between {min} and {max}")]
    InvalidConcurrency {
        /// The rejected value
        requested: usize,
        /// Lowest accepted value
        min: usize,
        /// Highest accepted value
        max: usize,
    },

    /// Queue item status transition that would move backwards or leave a terminal state
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: QueueItemStatus,
        /// Requested status
        to: QueueItemStatus,
    },

    /// Failure reported by an orchestrator implementation
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
