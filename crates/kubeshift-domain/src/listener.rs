//! Observer plumbing shared by the queue manager and the progress tracker
//!
//! Callbacks run synchronously on the notifying thread, outside any internal
//! lock, so a listener may call back into the component that notified it.
//! A panicking listener is logged and skipped; the remaining listeners still
//! receive the event.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Handle returned by [`ListenerSet::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Callback invoked for every event
pub type ListenerCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registered callbacks for one event type
pub struct ListenerSet<E> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(ListenerId, ListenerCallback<E>)>>,
}

impl<E> ListenerSet<E> {
    /// Empty set
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; false if it was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// No callbacks registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    /// Remove every callback
    pub fn clear(&self) {
        self.callbacks.lock().clear();
    }

    /// Deliver `event` to every callback registered at the time of the call.
    ///
    /// Returns how many callbacks panicked.
    pub fn notify(&self, event: &E) -> usize {
        let snapshot: Vec<(ListenerId, ListenerCallback<E>)> = self.callbacks.lock().clone();

        let mut failures = 0;
        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                failures += 1;
                warn!(listener_id = id.0, "Listener panicked; continuing delivery");
            }
        }
        failures
    }
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for ListenerSet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
