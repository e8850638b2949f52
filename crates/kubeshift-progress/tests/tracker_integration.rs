//! Integration tests for kubeshift-progress
//!
//! Tests a full operation lifecycle including:
//! - Step reporting from several threads
//! - Listener delivery
//! - Persistence through the configured store and reload into a new tracker
//! - Retention cleanup

use kubeshift_config::{PersistFormat, ProgressConfig};
use kubeshift_domain::{LogLevel, MigrationStatus, MigrationStep};
use kubeshift_progress::{MigrationProgress, ProgressError, ProgressTracker};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Test Fixtures
// ============================================================================

fn config(dir: &TempDir, format: PersistFormat) -> ProgressConfig {
    ProgressConfig {
        storage_dir: Some(dir.path().to_path_buf()),
        format,
        persist_on_complete: true,
        retention_hours: 24,
    }
}

fn repositories() -> Vec<String> {
    ["billing", "catalog", "checkout", "search"]
        .iter()
        .map(|name| format!("https://gitlab.com/shop/{}.git", name))
        .collect()
}

fn run_repository(tracker: &ProgressTracker, operation_id: &str, repository_id: &str, fail_at: Option<MigrationStep>) {
    for step in MigrationStep::ALL {
        tracker.update_repository_progress(operation_id, repository_id, step);
        if Some(step) == fail_at {
            tracker.fail_repository(operation_id, repository_id, format!("{} failed", step));
            return;
        }
        tracker.complete_repository_step(operation_id, repository_id, step);
    }
    tracker.complete_repository(operation_id, repository_id);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_full_operation_lifecycle() {
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::from_config(&config(&dir, PersistFormat::Yaml)).unwrap();
    let repos = repositories();

    let snapshots: Arc<Mutex<Vec<MigrationProgress>>> = Arc::default();
    let sink = snapshots.clone();
    tracker.add_progress_listener("bulk-1", move |progress| {
        sink.lock().unwrap().push(progress.clone());
    });

    tracker.start_operation("bulk-1", repos.clone());
    tracker.add_global_log("bulk-1", "Target platform: kubernetes");

    std::thread::scope(|scope| {
        for (i, repo) in repos.iter().enumerate() {
            let tracker = &tracker;
            let fail_at = (i == 2).then_some(MigrationStep::Validating);
            scope.spawn(move || run_repository(tracker, "bulk-1", repo, fail_at));
        }
    });

    let progress = tracker.get_progress("bulk-1").unwrap();
    assert_eq!(progress.completed_repositories, 3);
    assert_eq!(progress.failed_repositories, 1);
    assert!((progress.overall_percentage() - 100.0).abs() < 1e-9);

    let failed = &progress.repositories[&repos[2]];
    assert_eq!(failed.status, MigrationStatus::Failed);
    assert_eq!(failed.completed_steps.len(), 4);
    assert_eq!(failed.logs.last().unwrap().level, LogLevel::Error);

    let seen = snapshots.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|snapshot| snapshot.validate().is_ok()));
    assert!(seen
        .iter()
        .any(|snapshot| snapshot.completed_repositories == 3 && snapshot.failed_repositories == 1));
    drop(seen);

    assert!(tracker.complete_operation("bulk-1"));
    assert!(dir.path().join("bulk-1.yaml").exists());

    let summary = tracker.format_summary("bulk-1").unwrap();
    assert!(summary.contains("Operation bulk-1: completed (100.00%)"));
    assert!(summary.contains("checkout: failed"));
}

#[test]
fn test_reload_in_new_tracker_preserves_logs_and_steps() {
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::from_config(&config(&dir, PersistFormat::Json)).unwrap();
    let repos = repositories();

    tracker.start_operation("bulk-2", repos.clone());
    tracker.add_global_log("bulk-2", "first line");
    tracker.add_global_log("bulk-2", "second line");
    run_repository(&tracker, "bulk-2", &repos[0], None);
    tracker.update_repository_progress("bulk-2", &repos[1], MigrationStep::GeneratingArtifacts);
    tracker.complete_repository_step("bulk-2", &repos[1], MigrationStep::Cloning);
    tracker.persist_progress("bulk-2").unwrap();
    let original = tracker.get_progress("bulk-2").unwrap();

    let restored = ProgressTracker::from_config(&config(&dir, PersistFormat::Json)).unwrap();
    let loaded = restored.load_persisted_progress("bulk-2").unwrap();

    assert_eq!(loaded.operation_id, "bulk-2");
    assert_eq!(loaded.total_repositories, 4);
    let messages: Vec<&str> = loaded.logs.iter().map(|l| l.message.as_str()).collect();
    assert!(messages.ends_with(&["first line", "second line"]));
    assert_eq!(loaded, original);

    // the restored operation keeps accepting updates
    assert!(restored.complete_repository("bulk-2", &repos[1]));
    assert_eq!(restored.get_progress("bulk-2").unwrap().completed_repositories, 2);
}

#[test]
fn test_load_missing_and_invalid_ids() {
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::from_config(&config(&dir, PersistFormat::Json)).unwrap();

    assert!(matches!(
        tracker.load_persisted_progress("never-saved"),
        Err(ProgressError::PersistedStateNotFound(_))
    ));
    assert!(matches!(
        tracker.load_persisted_progress("../../etc/passwd"),
        Err(ProgressError::InvalidOperationId(_))
    ));
}

#[test]
fn test_persistence_failure_leaves_memory_intact() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way").unwrap();

    let config = ProgressConfig {
        storage_dir: Some(blocker),
        format: PersistFormat::Json,
        persist_on_complete: true,
        retention_hours: 24,
    };
    let tracker = ProgressTracker::from_config(&config).unwrap();
    tracker.start_operation("bulk-3", repositories());

    assert!(matches!(tracker.persist_progress("bulk-3"), Err(ProgressError::Io(_))));
    assert!(tracker.complete_operation("bulk-3"));
    assert_eq!(
        tracker.get_progress("bulk-3").unwrap().status,
        MigrationStatus::Completed
    );
}

#[test]
fn test_cleanup_respects_activity_and_age() {
    let dir = TempDir::new().unwrap();
    let tracker = ProgressTracker::from_config(&config(&dir, PersistFormat::Json)).unwrap();

    tracker.start_operation("finished", repositories());
    tracker.start_operation("cancelled", repositories());
    tracker.start_operation("active", repositories());
    tracker.complete_operation("finished");
    tracker.cancel_operation("cancelled");

    assert_eq!(tracker.cleanup_expired(), 0);
    assert_eq!(tracker.cleanup_old_operations(0), 2);
    assert_eq!(tracker.operation_ids(), vec!["active"]);
    assert_eq!(tracker.get_active_operations().len(), 1);

    // persisted copies survive in-memory cleanup
    let mut persisted = tracker.list_persisted_operations().unwrap();
    persisted.sort();
    assert_eq!(persisted, vec!["cancelled", "finished"]);
}
