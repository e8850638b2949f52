//! Queue manager and the bounded dispatch loop
//!
//! Mutating calls take a short synchronous lock on the queue state and never
//! wait on the orchestrator. Dispatching happens on tokio tasks: either an
//! on-demand drain (`process_queue`) or the long-lived background worker
//! (`start` / `shutdown`). Both share one slot count, so the concurrency bound
//! holds across them.

use crate::error::{QueueError, QueueResult};
use crate::events::{QueueEvent, QueueStatus};
use crate::store::QueueStore;
use futures::FutureExt;
use kubeshift_config::QueueConfig;
use kubeshift_domain::{
    validate_concurrency, ListenerId, ListenerSet, MigrationConfig, MigrationRequest,
    Orchestrator, QueueItem, QueueItemResult, QueueItemStatus, RepositoryRef,
    DEFAULT_MAX_CONCURRENT_MIGRATIONS,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bookkeeping for one in-flight orchestrator call
struct Dispatch {
    cancel: CancellationToken,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct QueueState {
    store: QueueStore,
    running: HashMap<String, Dispatch>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    orchestrator: Arc<dyn Orchestrator>,
    max_concurrent: AtomicUsize,
    paused: AtomicBool,
    active_loops: AtomicUsize,
    listeners: ListenerSet<QueueEvent>,
    wakeup: Notify,
    shutdown: CancellationToken,
}

/// Decrements the active loop counter when a dispatch loop exits
struct LoopGuard<'a>(&'a AtomicUsize);

impl<'a> LoopGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        self.listeners.notify(&event);
    }

    fn wake(&self) {
        self.wakeup.notify_waiters();
    }

    /// Take the next pending item if a slot is free and dispatch is allowed
    fn claim_next(&self) -> Option<(QueueItem, CancellationToken)> {
        if self.paused.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return None;
        }

        let max = self.max_concurrent.load(Ordering::SeqCst);
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.running.len() >= max {
            return None;
        }

        let id = state.store.next_pending_id()?;
        let item = state.store.get_mut(&id)?;
        item.transition(QueueItemStatus::Processing).ok()?;
        let item = item.clone();

        let cancel = CancellationToken::new();
        state.running.insert(
            id,
            Dispatch {
                cancel: cancel.clone(),
                abort: None,
            },
        );
        Some((item, cancel))
    }

    fn attach_abort_handle(&self, item_id: &str, abort: AbortHandle) {
        let mut state = self.state.lock();
        match state.running.get_mut(item_id) {
            Some(dispatch) => dispatch.abort = Some(abort),
            // abandoned between claim and spawn
            None => abort.abort(),
        }
    }

    /// Store the orchestrator outcome on the item and free its slot
    fn record_outcome(&self, item_id: &str, result: QueueItemResult) -> Option<QueueItem> {
        let recorded = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.running.remove(item_id);

            match state.store.get_mut(item_id) {
                Some(item) if item.status == QueueItemStatus::Processing => {
                    let next = if result.success {
                        QueueItemStatus::Completed
                    } else if item.cancel_requested {
                        QueueItemStatus::Cancelled
                    } else {
                        QueueItemStatus::Failed
                    };
                    match item.transition(next) {
                        Ok(()) => {
                            item.result = Some(result);
                            Some(item.clone())
                        }
                        Err(err) => {
                            warn!(item_id = %item_id, error = %err, "Discarding dispatch outcome");
                            None
                        }
                    }
                }
                Some(_) => None,
                None => {
                    debug!(item_id = %item_id, "Item removed while processing; outcome discarded");
                    None
                }
            }
        };

        self.wake();

        if let Some(item) = &recorded {
            info!(
                item_id = %item.id,
                repository = %item.repository.name,
                status = %item.status,
                "Queue item finished"
            );
            self.emit(QueueEvent::StatusChanged {
                item_id: item.id.clone(),
                from: QueueItemStatus::Processing,
                to: item.status,
            });
        }
        recorded
    }

    /// Dispatch until nothing claimed by this loop is still in flight.
    ///
    /// Returns the items this loop dispatched that reached a finished status.
    async fn run_loop(self: &Arc<Self>) -> Vec<QueueItem> {
        let _guard = LoopGuard::enter(&self.active_loops);
        let mut in_flight: JoinSet<(String, QueueItemResult)> = JoinSet::new();
        let mut finished = Vec::new();

        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            while let Some((item, cancel)) = self.claim_next() {
                let item_id = item.id.clone();
                debug!(
                    item_id = %item_id,
                    repository = %item.repository.url,
                    priority = item.priority,
                    "Dispatching queue item"
                );
                self.emit(QueueEvent::StatusChanged {
                    item_id: item_id.clone(),
                    from: QueueItemStatus::Pending,
                    to: QueueItemStatus::Processing,
                });

                let abort = in_flight.spawn(dispatch(self.orchestrator.clone(), item, cancel));
                self.attach_abort_handle(&item_id, abort);
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok((item_id, result))) => {
                        if let Some(item) = self.record_outcome(&item_id, result) {
                            finished.push(item);
                        }
                    }
                    Some(Err(err)) if err.is_cancelled() => {
                        debug!("Abandoned dispatch task stopped");
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "Dispatch task ended abnormally");
                    }
                    None => break,
                },
                _ = notified => {}
            }
        }

        finished
    }
}

/// Run one orchestrator call, folding errors and panics into a failed result
async fn dispatch(
    orchestrator: Arc<dyn Orchestrator>,
    item: QueueItem,
    cancel: CancellationToken,
) -> (String, QueueItemResult) {
    let request = MigrationRequest::single(
        item.id.clone(),
        item.repository.clone(),
        item.configuration.clone(),
    );

    let outcome = AssertUnwindSafe(orchestrator.migrate(request, cancel))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(results)) => QueueItemResult::from_results(results),
        Ok(Err(err)) => {
            warn!(
                item_id = %item.id,
                orchestrator = orchestrator.name(),
                error = %err,
                "Migration failed"
            );
            QueueItemResult::failure(
                format!("Migration of {} failed", item.repository.name),
                Some(err.to_string()),
            )
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(
                item_id = %item.id,
                orchestrator = orchestrator.name(),
                panic = %message,
                "Orchestrator panicked"
            );
            QueueItemResult::failure(
                format!("Migration of {} aborted", item.repository.name),
                Some(message),
            )
        }
    };

    (item.id, result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "orchestrator panicked".to_string()
    }
}

async fn worker_loop(inner: Arc<QueueInner>) {
    info!("Queue worker started");
    loop {
        let notified = inner.wakeup.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if inner.shutdown.is_cancelled() {
            break;
        }

        let finished = inner.run_loop().await;
        if !finished.is_empty() {
            debug!(count = finished.len(), "Worker finished queue items");
        }

        tokio::select! {
            _ = notified => {}
            _ = inner.shutdown.cancelled() => break,
        }
    }

    info!("Queue worker stopped");
}

/// Owns the queue, schedules dispatches and publishes queue events
pub struct QueueManager {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueManager {
    /// Manager with the default concurrency bound
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                orchestrator,
                max_concurrent: AtomicUsize::new(DEFAULT_MAX_CONCURRENT_MIGRATIONS),
                paused: AtomicBool::new(false),
                active_loops: AtomicUsize::new(0),
                listeners: ListenerSet::new(),
                wakeup: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Manager configured from the `[queue]` section; starts the worker when `auto_start` is set
    pub fn from_config(config: &QueueConfig, orchestrator: Arc<dyn Orchestrator>) -> QueueResult<Self> {
        let manager = Self::new(orchestrator);
        manager.set_max_concurrent_migrations(config.max_concurrent_migrations)?;
        if config.auto_start {
            manager.start()?;
        }
        Ok(manager)
    }

    /// Add a Pending item with priority 0
    pub fn add_to_queue(&self, repository: RepositoryRef, configuration: MigrationConfig) -> String {
        self.add_to_queue_with_priority(repository, configuration, 0)
    }

    /// Add a Pending item; higher priority is dispatched sooner
    pub fn add_to_queue_with_priority(
        &self,
        repository: RepositoryRef,
        configuration: MigrationConfig,
        priority: i32,
    ) -> String {
        let item = self
            .inner
            .state
            .lock()
            .store
            .push(repository, configuration, priority);

        debug!(
            item_id = %item.id,
            repository = %item.repository.url,
            priority,
            "Added item to queue"
        );
        let id = item.id.clone();
        self.inner.emit(QueueEvent::ItemAdded(item));
        self.inner.wake();
        id
    }

    /// Remove an item in any status. In-flight work is signalled to stop but keeps its slot until it returns.
    pub fn remove_from_queue(&self, item_id: &str) -> bool {
        let removed = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let removed = state.store.remove(item_id);
            if removed.is_some() {
                if let Some(dispatch) = state.running.get(item_id) {
                    dispatch.cancel.cancel();
                }
            }
            removed
        };

        match removed {
            Some(item) => {
                debug!(item_id = %item_id, status = %item.status, "Removed item from queue");
                self.inner.emit(QueueEvent::ItemRemoved(item));
                true
            }
            None => false,
        }
    }

    /// Re-sequence pending items to follow `ordered_ids`; other ids are ignored
    pub fn reorder_queue(&self, ordered_ids: &[String]) {
        let pending_ids = self.inner.state.lock().store.reorder(ordered_ids);
        debug!(pending = pending_ids.len(), "Reordered queue");
        self.inner.emit(QueueEvent::QueueReordered { pending_ids });
    }

    /// Cancel an item.
    ///
    /// Pending items become Cancelled immediately. For Processing items the
    /// cancellation token handed to the orchestrator fires and the final
    /// status is recorded when the call returns. False for finished, unknown
    /// or already-signalled items.
    pub fn cancel_queue_item(&self, item_id: &str) -> bool {
        let cancelled_pending = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(item) = state.store.get_mut(item_id) else {
                return false;
            };

            match item.status {
                QueueItemStatus::Pending => item.transition(QueueItemStatus::Cancelled).is_ok(),
                QueueItemStatus::Processing if !item.cancel_requested => {
                    item.cancel_requested = true;
                    if let Some(dispatch) = state.running.get(item_id) {
                        dispatch.cancel.cancel();
                    }
                    false
                }
                _ => return false,
            }
        };

        if cancelled_pending {
            info!(item_id = %item_id, "Cancelled pending item");
            self.inner.emit(QueueEvent::StatusChanged {
                item_id: item_id.to_string(),
                from: QueueItemStatus::Pending,
                to: QueueItemStatus::Cancelled,
            });
        } else {
            info!(item_id = %item_id, "Cancellation requested for processing item");
        }
        true
    }

    /// Give up on a Processing item without waiting for the orchestrator.
    ///
    /// The in-flight call is aborted, the slot is freed and the item becomes Cancelled.
    pub fn abandon_item(&self, item_id: &str) -> bool {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(item) = state.store.get_mut(item_id) else {
                return false;
            };
            if item.status != QueueItemStatus::Processing
                || item.transition(QueueItemStatus::Cancelled).is_err()
            {
                return false;
            }
            item.cancel_requested = true;
            item.result = Some(QueueItemResult::failure(
                "Abandoned while processing",
                None,
            ));

            if let Some(dispatch) = state.running.remove(item_id) {
                dispatch.cancel.cancel();
                if let Some(abort) = dispatch.abort {
                    abort.abort();
                }
            }
        }

        warn!(item_id = %item_id, "Abandoned processing item");
        self.inner.wake();
        self.inner.emit(QueueEvent::StatusChanged {
            item_id: item_id.to_string(),
            from: QueueItemStatus::Processing,
            to: QueueItemStatus::Cancelled,
        });
        true
    }

    /// Cancel every Pending item; returns how many were cancelled
    pub fn cancel_all_pending(&self) -> usize {
        let cancelled: Vec<String> = {
            let mut state = self.inner.state.lock();
            let pending: Vec<String> = state.store.pending().into_iter().map(|i| i.id).collect();
            pending
                .into_iter()
                .filter(|id| {
                    matches!(
                        state.store.transition(id, QueueItemStatus::Cancelled),
                        Some(Ok(_))
                    )
                })
                .collect()
        };

        info!(count = cancelled.len(), "Cancelled all pending items");
        for item_id in &cancelled {
            self.inner.emit(QueueEvent::StatusChanged {
                item_id: item_id.clone(),
                from: QueueItemStatus::Pending,
                to: QueueItemStatus::Cancelled,
            });
        }
        cancelled.len()
    }

    /// Remove Completed and Failed items; Cancelled items stay. Returns the number removed.
    pub fn clear_completed_items(&self) -> usize {
        self.clear_finished_items(false)
    }

    /// Remove finished items, including Cancelled ones when asked
    pub fn clear_finished_items(&self, include_cancelled: bool) -> usize {
        let removed = self.inner.state.lock().store.remove_finished(include_cancelled);
        debug!(count = removed.len(), include_cancelled, "Cleared finished items");
        let count = removed.len();
        for item in removed {
            self.inner.emit(QueueEvent::ItemRemoved(item));
        }
        count
    }

    /// Stop dispatching new items; in-flight items run to completion
    pub fn pause_processing(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            info!("Queue processing paused");
            self.inner.emit(QueueEvent::ProcessingPaused);
        }
    }

    /// Allow dispatching again
    pub fn resume_processing(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            info!("Queue processing resumed");
            self.inner.emit(QueueEvent::ProcessingResumed);
            self.inner.wake();
        }
    }

    /// Whether dispatching is paused
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Set the concurrency bound; values outside 1..=10 are rejected and the previous bound kept
    pub fn set_max_concurrent_migrations(&self, max: usize) -> QueueResult<()> {
        let max = validate_concurrency(max)?;
        let previous = self.inner.max_concurrent.swap(max, Ordering::SeqCst);
        if previous != max {
            info!(previous, max, "Updated max concurrent migrations");
            self.inner.wake();
        }
        Ok(())
    }

    /// Current concurrency bound
    pub fn max_concurrent_migrations(&self) -> usize {
        self.inner.max_concurrent.load(Ordering::SeqCst)
    }

    /// Pending items by descending priority, FIFO among equals
    pub fn get_pending_queue_items(&self) -> Vec<QueueItem> {
        self.inner.state.lock().store.pending()
    }

    /// Every item in insertion order
    pub fn get_queue_items(&self) -> Vec<QueueItem> {
        self.inner.state.lock().store.items().to_vec()
    }

    /// One item by id
    pub fn get_item(&self, item_id: &str) -> Option<QueueItem> {
        self.inner.state.lock().store.get(item_id).cloned()
    }

    /// Snapshot of queue counts and loop state
    pub fn get_queue_status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        let store = &state.store;
        QueueStatus {
            total: store.len(),
            pending: store.count(QueueItemStatus::Pending),
            processing: store.count(QueueItemStatus::Processing),
            completed: store.count(QueueItemStatus::Completed),
            failed: store.count(QueueItemStatus::Failed),
            cancelled: store.count(QueueItemStatus::Cancelled),
            is_processing: self.inner.active_loops.load(Ordering::SeqCst) > 0
                || !state.running.is_empty(),
            is_paused: self.is_paused(),
        }
    }

    /// Drain the queue on a separate task.
    ///
    /// Returns the items dispatched by this call once each has finished. Items
    /// dispatched concurrently by the background worker are not included.
    pub async fn process_queue(&self) -> QueueResult<Vec<QueueItem>> {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::ShutDown);
        }

        let runtime = Handle::try_current().map_err(|e| QueueError::Runtime(e.to_string()))?;
        let inner = self.inner.clone();
        info!("Processing queue");
        runtime
            .spawn(async move { inner.run_loop().await })
            .await
            .map_err(|e| QueueError::DispatchLoop(e.to_string()))
    }

    /// Start the background worker; a no-op when it is already running
    pub fn start(&self) -> QueueResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::ShutDown);
        }

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|e| QueueError::Runtime(e.to_string()))?;
        *worker = Some(runtime.spawn(worker_loop(self.inner.clone())));
        Ok(())
    }

    /// Whether the background worker is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop dispatching, wait for in-flight items and stop the worker
    pub async fn shutdown(&self) -> QueueResult<()> {
        info!("Shutting down queue manager");
        self.inner.shutdown.cancel();
        self.inner.wake();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| QueueError::DispatchLoop(e.to_string()))?;
        }
        Ok(())
    }

    /// Register a queue listener
    pub fn add_queue_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    /// Remove a queue listener
    pub fn remove_queue_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
        self.inner.wake();
    }
}
