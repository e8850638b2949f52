#![warn(missing_docs)]

//! KubeShift domain model
//!
//! Status and step enumerations, the value objects exchanged between the
//! queue, the progress tracker and the orchestrator, and the observer
//! abstraction both components use to publish changes.

pub mod error;
pub mod listener;
pub mod models;
pub mod orchestrator;
pub mod status;

#[cfg(test)]
mod status_properties;

pub use error::{DomainError, DomainResult};
pub use listener::{ListenerCallback, ListenerId, ListenerSet};
pub use models::*;
pub use orchestrator::{MigrationRequest, Orchestrator};
pub use status::{MigrationStatus, MigrationStep, QueueItemStatus};
