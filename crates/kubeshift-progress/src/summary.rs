//! Completion estimates and human-readable status reports

use crate::models::MigrationProgress;
use crate::tracker::ProgressTracker;
use chrono::{DateTime, Duration, Utc};

/// Project when the operation will finish.
///
/// Uses the mean duration of the repositories that already finished. Returns
/// the end time for terminal operations and `None` while nothing has finished.
pub fn estimate_completion(progress: &MigrationProgress, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if progress.status.is_terminal() {
        return progress.ended_at;
    }

    let durations: Vec<Duration> = progress
        .repositories
        .values()
        .filter_map(|repo| repo.duration())
        .collect();
    if durations.is_empty() {
        return None;
    }

    let total_ms: i64 = durations.iter().map(|d| d.num_milliseconds()).sum();
    let avg_ms = total_ms / durations.len() as i64;
    let remaining = progress.remaining_repositories() as i64;

    now.checked_add_signed(Duration::milliseconds(avg_ms.saturating_mul(remaining)))
}

/// Multi-line report of an operation and its repositories
pub fn format_summary(progress: &MigrationProgress) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Operation {}: {} ({:.2}%)\n",
        progress.operation_id,
        progress.status,
        progress.overall_percentage()
    ));
    output.push_str(&format!(
        "Repositories: {} total, {} completed, {} failed\n",
        progress.total_repositories, progress.completed_repositories, progress.failed_repositories
    ));

    for repo in progress.repositories.values() {
        output.push_str(&format!(
            "  - {}: {} ({:.1}%)",
            repo.repository_name,
            repo.status,
            repo.percentage()
        ));
        if let Some(step) = repo.current_step.filter(|_| !repo.is_terminal()) {
            output.push_str(&format!(" [{}]", step));
        }
        if let Some(error) = &repo.error {
            output.push_str(&format!(" error: {}", error));
        }
        output.push('\n');
    }

    if let Some(eta) = estimate_completion(progress, Utc::now()).filter(|_| progress.is_active()) {
        output.push_str(&format!(
            "Estimated Completion: {}\n",
            eta.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    output
}

impl ProgressTracker {
    /// Projected completion time of a tracked operation
    pub fn estimated_completion(&self, operation_id: &str) -> Option<DateTime<Utc>> {
        estimate_completion(&self.get_progress(operation_id)?, Utc::now())
    }

    /// Status report of a tracked operation
    pub fn format_summary(&self, operation_id: &str) -> Option<String> {
        self.get_progress(operation_id)
            .map(|progress| format_summary(&progress))
    }
}
