//! Live progress tracking for migration operations
//!
//! Each repository's state sits behind its own lock, so reporters working on
//! different repositories never contend. Operation-wide fields have a separate
//! lock; the two are never held together. Listeners receive a fresh snapshot
//! after every accepted mutation and run with no tracker lock held.

use crate::error::{ProgressError, ProgressResult};
use crate::models::{MigrationProgress, RepositoryProgress};
use crate::store::ProgressStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use kubeshift_config::ProgressConfig;
use kubeshift_domain::{ListenerId, ListenerSet, LogEntry, MigrationStatus, MigrationStep};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operation-wide fields
#[derive(Debug, Clone)]
struct OperationMeta {
    status: MigrationStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    logs: Vec<LogEntry>,
}

#[derive(Debug)]
struct OperationEntry {
    meta: Mutex<OperationMeta>,
    repositories: DashMap<String, Arc<Mutex<RepositoryProgress>>>,
}

impl OperationEntry {
    fn start(repository_ids: Vec<String>) -> Self {
        let repositories = DashMap::new();
        for id in repository_ids {
            repositories
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RepositoryProgress::new(id))));
        }
        Self {
            meta: Mutex::new(OperationMeta {
                status: MigrationStatus::Queued,
                started_at: Utc::now(),
                ended_at: None,
                logs: Vec::new(),
            }),
            repositories,
        }
    }

    fn restore(progress: MigrationProgress) -> Self {
        Self {
            meta: Mutex::new(OperationMeta {
                status: progress.status,
                started_at: progress.started_at,
                ended_at: progress.ended_at,
                logs: progress.logs,
            }),
            repositories: progress
                .repositories
                .into_iter()
                .map(|(id, repo)| (id, Arc::new(Mutex::new(repo))))
                .collect(),
        }
    }

    fn repository(&self, repository_id: &str) -> Option<Arc<Mutex<RepositoryProgress>>> {
        self.repositories
            .get(repository_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn is_terminal(&self) -> bool {
        self.meta.lock().status.is_terminal()
    }

    fn snapshot(&self, operation_id: &str) -> MigrationProgress {
        let meta = self.meta.lock().clone();

        let handles: Vec<Arc<Mutex<RepositoryProgress>>> = self
            .repositories
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let repositories: BTreeMap<String, RepositoryProgress> = handles
            .iter()
            .map(|handle| {
                let repo = handle.lock().clone();
                (repo.repository_id.clone(), repo)
            })
            .collect();

        let completed_repositories = repositories
            .values()
            .filter(|repo| repo.status.is_completed())
            .count();
        let failed_repositories = repositories
            .values()
            .filter(|repo| repo.status.is_failed())
            .count();

        MigrationProgress {
            operation_id: operation_id.to_string(),
            started_at: meta.started_at,
            ended_at: meta.ended_at,
            status: meta.status,
            total_repositories: repositories.len(),
            completed_repositories,
            failed_repositories,
            repositories,
            logs: meta.logs,
        }
    }
}

/// Tracks every running and recently finished migration operation
pub struct ProgressTracker {
    operations: DashMap<String, Arc<OperationEntry>>,
    listeners: DashMap<String, Arc<ListenerSet<MigrationProgress>>>,
    store: ProgressStore,
    persist_on_complete: bool,
    retention_hours: u64,
}

impl ProgressTracker {
    /// Tracker persisting to `store`, with the `[progress]` defaults for
    /// automatic persistence and retention
    pub fn new(store: ProgressStore) -> Self {
        let defaults = ProgressConfig::default();
        Self {
            operations: DashMap::new(),
            listeners: DashMap::new(),
            store,
            persist_on_complete: defaults.persist_on_complete,
            retention_hours: defaults.retention_hours,
        }
    }

    /// Tracker configured from the `[progress]` section
    pub fn from_config(config: &ProgressConfig) -> ProgressResult<Self> {
        Ok(Self::new(ProgressStore::from_config(config)?)
            .with_persist_on_complete(config.persist_on_complete)
            .with_retention_hours(config.retention_hours))
    }

    /// Persist operations automatically when they turn terminal.
    ///
    /// The write happens on the calling thread, so `complete_operation`,
    /// `fail_operation` and `cancel_operation` return only after the document
    /// is on disk. Turn this off and call [`persist_progress`](Self::persist_progress)
    /// from a background task when mutators must not touch the filesystem.
    pub fn with_persist_on_complete(mut self, enabled: bool) -> Self {
        self.persist_on_complete = enabled;
        self
    }

    /// Threshold used by [`cleanup_expired`](Self::cleanup_expired)
    pub fn with_retention_hours(mut self, hours: u64) -> Self {
        self.retention_hours = hours;
        self
    }

    /// Backing store
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    fn entry(&self, operation_id: &str) -> Option<Arc<OperationEntry>> {
        self.operations
            .get(operation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn notify(&self, operation_id: &str, entry: &OperationEntry) {
        let listeners = self
            .listeners
            .get(operation_id)
            .map(|set| Arc::clone(set.value()));
        if let Some(listeners) = listeners {
            if !listeners.is_empty() {
                listeners.notify(&entry.snapshot(operation_id));
            }
        }
    }

    /// Apply `mutate` to one repository; notifies when it reports a change
    fn mutate_repository<F>(&self, operation_id: &str, repository_id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut RepositoryProgress) -> bool,
    {
        let Some(entry) = self.entry(operation_id) else {
            debug!(operation_id = %operation_id, "Progress update for unknown operation");
            return false;
        };
        let Some(repository) = entry.repository(repository_id) else {
            debug!(
                operation_id = %operation_id,
                repository_id = %repository_id,
                "Progress update for unknown repository"
            );
            return false;
        };

        let changed = {
            let mut repo = repository.lock();
            mutate(&mut *repo)
        };
        if changed {
            self.notify(operation_id, &entry);
        }
        changed
    }

    /// Apply `mutate` to operation-wide fields; notifies when it reports a change
    fn mutate_operation<F>(&self, operation_id: &str, mutate: F) -> Option<Arc<OperationEntry>>
    where
        F: FnOnce(&mut OperationMeta) -> bool,
    {
        let entry = self.entry(operation_id)?;
        let changed = {
            let mut meta = entry.meta.lock();
            mutate(&mut *meta)
        };
        if !changed {
            return None;
        }
        self.notify(operation_id, &entry);
        Some(entry)
    }

    /// Begin tracking an operation over the given repositories.
    ///
    /// Duplicate repository ids collapse into one entry. Starting an id that
    /// is already tracked replaces it; listeners registered for the id stay.
    pub fn start_operation<I, S>(&self, operation_id: impl Into<String>, repository_ids: I) -> MigrationProgress
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let operation_id = operation_id.into();
        let entry = Arc::new(OperationEntry::start(
            repository_ids.into_iter().map(Into::into).collect(),
        ));
        let repository_count = entry.repositories.len();
        entry.meta.lock().logs.push(LogEntry::info(format!(
            "Started migration of {} repositories",
            repository_count
        )));

        if self
            .operations
            .insert(operation_id.clone(), Arc::clone(&entry))
            .is_some()
        {
            warn!(operation_id = %operation_id, "Restarted an operation that was already tracked");
        }
        info!(operation_id = %operation_id, repositories = repository_count, "Operation started");

        let snapshot = entry.snapshot(&operation_id);
        if let Some(listeners) = self.listeners.get(&operation_id).map(|set| Arc::clone(set.value())) {
            listeners.notify(&snapshot);
        }
        snapshot
    }

    /// Record that a repository started `step`; the step is not marked complete
    pub fn update_repository_progress(
        &self,
        operation_id: &str,
        repository_id: &str,
        step: MigrationStep,
    ) -> bool {
        self.mutate_repository(operation_id, repository_id, |repo| {
            if repo.is_terminal() {
                return false;
            }
            repo.current_step = Some(step);
            repo.status = step.status();
            repo.logs
                .push(LogEntry::info(format!("Starting step: {}", step.display_name())));
            true
        })
    }

    /// Mark `step` done for a repository; repeating a completed step changes nothing
    pub fn complete_repository_step(
        &self,
        operation_id: &str,
        repository_id: &str,
        step: MigrationStep,
    ) -> bool {
        let mut accepted = false;
        self.mutate_repository(operation_id, repository_id, |repo| {
            if repo.is_terminal() {
                return false;
            }
            accepted = true;
            if !repo.completed_steps.insert(step) {
                return false;
            }
            repo.logs
                .push(LogEntry::info(format!("Completed step: {}", step.display_name())));
            true
        });
        accepted
    }

    /// Mark a repository Completed
    pub fn complete_repository(&self, operation_id: &str, repository_id: &str) -> bool {
        let completed = self.mutate_repository(operation_id, repository_id, |repo| {
            if repo.is_terminal() {
                return false;
            }
            repo.finish(MigrationStatus::Completed, Utc::now());
            repo.logs.push(LogEntry::info("Migration completed"));
            true
        });
        if completed {
            info!(operation_id = %operation_id, repository_id = %repository_id, "Repository completed");
        }
        completed
    }

    /// Mark a repository Failed with `message`
    pub fn fail_repository(
        &self,
        operation_id: &str,
        repository_id: &str,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        let failed = self.mutate_repository(operation_id, repository_id, |repo| {
            if repo.is_terminal() {
                return false;
            }
            repo.finish(MigrationStatus::Failed, Utc::now());
            repo.logs
                .push(LogEntry::error(format!("Migration failed: {}", message)));
            repo.error = Some(message.clone());
            true
        });
        if failed {
            warn!(
                operation_id = %operation_id,
                repository_id = %repository_id,
                error = %message,
                "Repository failed"
            );
        }
        failed
    }

    /// Append a line to a repository log; accepted after the repository finished too
    pub fn add_repository_log(
        &self,
        operation_id: &str,
        repository_id: &str,
        message: impl Into<String>,
    ) -> bool {
        let line = LogEntry::info(message);
        self.mutate_repository(operation_id, repository_id, |repo| {
            repo.logs.push(line);
            true
        })
    }

    /// Append a line to the operation log
    pub fn add_global_log(&self, operation_id: &str, message: impl Into<String>) -> bool {
        let line = LogEntry::info(message);
        self.mutate_operation(operation_id, |meta| {
            meta.logs.push(line);
            true
        })
        .is_some()
    }

    /// Mark the operation Completed
    pub fn complete_operation(&self, operation_id: &str) -> bool {
        self.finish_operation(operation_id, MigrationStatus::Completed, LogEntry::info("Operation completed"))
    }

    /// Mark the operation Failed
    pub fn fail_operation(&self, operation_id: &str, message: impl Into<String>) -> bool {
        let line = LogEntry::error(format!("Operation failed: {}", message.into()));
        self.finish_operation(operation_id, MigrationStatus::Failed, line)
    }

    /// Mark the operation Cancelled along with every repository still running
    pub fn cancel_operation(&self, operation_id: &str) -> bool {
        let Some(entry) = self.entry(operation_id) else {
            return false;
        };
        if entry.is_terminal() {
            return false;
        }

        let now = Utc::now();
        let handles: Vec<Arc<Mutex<RepositoryProgress>>> = entry
            .repositories
            .iter()
            .map(|repo| Arc::clone(repo.value()))
            .collect();
        for handle in handles {
            let mut repo = handle.lock();
            if !repo.is_terminal() {
                repo.finish(MigrationStatus::Cancelled, now);
                repo.logs.push(LogEntry::info("Migration cancelled"));
            }
        }

        self.finish_operation(operation_id, MigrationStatus::Cancelled, LogEntry::info("Operation cancelled"))
    }

    fn finish_operation(&self, operation_id: &str, status: MigrationStatus, line: LogEntry) -> bool {
        let finished = self.mutate_operation(operation_id, |meta| {
            if meta.status.is_terminal() {
                return false;
            }
            meta.status = status;
            meta.ended_at = Some(Utc::now());
            meta.logs.push(line);
            true
        });

        let Some(entry) = finished else {
            return false;
        };
        info!(operation_id = %operation_id, status = %status, "Operation finished");

        if self.persist_on_complete {
            if let Err(err) = self.store.save(&entry.snapshot(operation_id)) {
                warn!(operation_id = %operation_id, error = %err, "Failed to persist finished operation");
            }
        }
        true
    }

    /// Snapshot of one operation
    pub fn get_progress(&self, operation_id: &str) -> Option<MigrationProgress> {
        self.entry(operation_id)
            .map(|entry| entry.snapshot(operation_id))
    }

    /// Snapshot of one repository
    pub fn get_repository_progress(
        &self,
        operation_id: &str,
        repository_id: &str,
    ) -> Option<RepositoryProgress> {
        self.entry(operation_id)?
            .repository(repository_id)
            .map(|repo| repo.lock().clone())
    }

    /// Operations that have not been completed, failed or cancelled, oldest first
    pub fn get_active_operations(&self) -> Vec<MigrationProgress> {
        let mut active: Vec<MigrationProgress> = self
            .tracked()
            .into_iter()
            .filter(|(_, entry)| !entry.is_terminal())
            .map(|(id, entry)| entry.snapshot(&id))
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Ids of every tracked operation, sorted
    pub fn operation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.operations.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn tracked(&self) -> Vec<(String, Arc<OperationEntry>)> {
        self.operations
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Stop tracking an operation and drop its listeners
    pub fn remove_operation(&self, operation_id: &str) -> bool {
        self.listeners.remove(operation_id);
        self.operations.remove(operation_id).is_some()
    }

    /// Register a listener for one operation; it may be added before the operation starts
    pub fn add_progress_listener<F>(&self, operation_id: &str, listener: F) -> ListenerId
    where
        F: Fn(&MigrationProgress) + Send + Sync + 'static,
    {
        let set = Arc::clone(
            self.listeners
                .entry(operation_id.to_string())
                .or_default()
                .value(),
        );
        set.subscribe(listener)
    }

    /// Remove a listener; false if it was not registered for the operation
    pub fn remove_progress_listener(&self, operation_id: &str, id: ListenerId) -> bool {
        let set = self
            .listeners
            .get(operation_id)
            .map(|set| Arc::clone(set.value()));
        set.is_some_and(|set| set.unsubscribe(id))
    }

    /// Drop terminal operations that ended at least `max_age_hours` ago.
    ///
    /// `0` drops every terminal operation. Active operations are never removed.
    pub fn cleanup_old_operations(&self, max_age_hours: u64) -> usize {
        let Some(cutoff) = i64::try_from(max_age_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let expired: Vec<String> = self
            .tracked()
            .into_iter()
            .filter(|(_, entry)| {
                let meta = entry.meta.lock();
                meta.status.is_terminal() && meta.ended_at.unwrap_or(meta.started_at) <= cutoff
            })
            .map(|(id, _)| id)
            .collect();

        for id in &expired {
            self.remove_operation(id);
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), max_age_hours, "Cleaned up finished operations");
        }
        expired.len()
    }

    /// [`cleanup_old_operations`](Self::cleanup_old_operations) with the configured retention
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_old_operations(self.retention_hours)
    }

    /// Write one operation to the store
    pub fn persist_progress(&self, operation_id: &str) -> ProgressResult<PathBuf> {
        let progress = self
            .get_progress(operation_id)
            .ok_or_else(|| ProgressError::OperationNotFound(operation_id.to_string()))?;
        self.store.save(&progress)
    }

    /// Write every tracked operation; returns how many were written
    pub fn persist_all(&self) -> ProgressResult<usize> {
        let tracked = self.tracked();
        for (id, entry) in &tracked {
            self.store.save(&entry.snapshot(id))?;
        }
        Ok(tracked.len())
    }

    /// Read an operation from the store and track it again.
    ///
    /// A tracked operation with the same id is replaced, losing any update
    /// made since its last persist. Listeners registered for the id receive
    /// the restored snapshot.
    pub fn load_persisted_progress(&self, operation_id: &str) -> ProgressResult<MigrationProgress> {
        let progress = self.store.load(operation_id)?;
        let entry = Arc::new(OperationEntry::restore(progress.clone()));
        let replaced = self
            .operations
            .insert(operation_id.to_string(), Arc::clone(&entry));

        match replaced {
            Some(previous) if !previous.is_terminal() => warn!(
                operation_id = %operation_id,
                "Replaced an active operation with its persisted state"
            ),
            Some(_) => debug!(operation_id = %operation_id, "Replaced finished operation from store"),
            None => {}
        }
        info!(operation_id = %operation_id, "Restored persisted operation");

        self.notify(operation_id, &entry);
        Ok(progress)
    }

    /// Ids with a persisted document
    pub fn list_persisted_operations(&self) -> ProgressResult<Vec<String>> {
        self.store.list()
    }

    /// Delete the persisted document of an operation
    pub fn delete_persisted_progress(&self, operation_id: &str) -> ProgressResult<bool> {
        self.store.delete(operation_id)
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("operations", &self.operations.len())
            .field("store", &self.store)
            .field("persist_on_complete", &self.persist_on_complete)
            .finish()
    }
}
