//! Queue events and status snapshots

use kubeshift_domain::{QueueItem, QueueItemStatus};
use serde::{Deserialize, Serialize};

/// Change published to queue listeners
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A Pending item was added
    ItemAdded(QueueItem),
    /// An item was removed, explicitly or by a bulk clear
    ItemRemoved(QueueItem),
    /// An item moved between statuses
    StatusChanged {
        /// Item id
        item_id: String,
        /// Previous status
        from: QueueItemStatus,
        /// New status
        to: QueueItemStatus,
    },
    /// Pending items were re-sequenced; ids in new FIFO order
    QueueReordered {
        /// Pending ids after the reorder
        pending_ids: Vec<String>,
    },
    /// Dispatch of new items stopped
    ProcessingPaused,
    /// Dispatch of new items resumed
    ProcessingResumed,
}

impl QueueEvent {
    /// Id of the item the event concerns, if any
    pub fn item_id(&self) -> Option<&str> {
        match self {
            QueueEvent::ItemAdded(item) | QueueEvent::ItemRemoved(item) => Some(&item.id),
            QueueEvent::StatusChanged { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

/// Point-in-time counts for the whole queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Items in the store
    pub total: usize,
    /// Waiting for a slot
    pub pending: usize,
    /// Dispatched and not yet returned
    pub processing: usize,
    /// Finished successfully
    pub completed: usize,
    /// Finished with an error
    pub failed: usize,
    /// Cancelled
    pub cancelled: usize,
    /// A dispatch loop is running or dispatches are in flight
    pub is_processing: bool,
    /// New dispatches are suspended
    pub is_paused: bool,
}
