//! Hierarchical progress tracking for KubeShift migration operations
//!
//! An operation covers one or more repositories; each repository reports the
//! steps it starts and completes, log lines and its final outcome. Snapshots
//! are pushed to per-operation listeners and can be persisted as JSON or YAML
//! documents and loaded back later.

#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod store;
pub mod summary;
pub mod tracker;

#[cfg(test)]
mod tracker_properties;

pub use error::{ProgressError, ProgressResult};
pub use models::{MigrationProgress, RepositoryProgress};
pub use store::{validate_operation_id, ProgressStore};
pub use summary::{estimate_completion, format_summary};
pub use tracker::ProgressTracker;
