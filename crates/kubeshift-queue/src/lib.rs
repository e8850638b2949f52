//! Migration queue for KubeShift
//!
//! Holds repositories waiting to be migrated, dispatches them to an
//! [`Orchestrator`](kubeshift_domain::Orchestrator) with a bounded number of
//! concurrent calls and publishes [`QueueEvent`]s as items move through
//! their lifecycle.

#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod manager;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use events::{QueueEvent, QueueStatus};
pub use manager::QueueManager;
pub use store::QueueStore;
