//! Progress snapshots for operations and repositories

use chrono::{DateTime, Duration, Utc};
use kubeshift_domain::{repository_name_from_id, LogEntry, MigrationStatus, MigrationStep};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Progress of one repository within an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryProgress {
    /// Repository id, usually its URL
    pub repository_id: String,
    /// Short name derived from the id
    pub repository_name: String,
    /// When the operation registered the repository
    pub started_at: DateTime<Utc>,
    /// Set once, when the repository turns terminal
    pub ended_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: MigrationStatus,
    /// Most recently reported step
    pub current_step: Option<MigrationStep>,
    /// Steps reported as done
    pub completed_steps: BTreeSet<MigrationStep>,
    /// Append-only log lines
    pub logs: Vec<LogEntry>,
    /// Step count captured when the repository was registered
    pub total_steps: usize,
    /// Failure message
    pub error: Option<String>,
}

impl RepositoryProgress {
    /// Queued repository with no steps done
    pub fn new(repository_id: impl Into<String>) -> Self {
        let repository_id = repository_id.into();
        Self {
            repository_name: repository_name_from_id(&repository_id),
            repository_id,
            started_at: Utc::now(),
            ended_at: None,
            status: MigrationStatus::Queued,
            current_step: None,
            completed_steps: BTreeSet::new(),
            logs: Vec::new(),
            total_steps: MigrationStep::total_steps(),
            error: None,
        }
    }

    /// Completed steps over total steps, 0 to 100
    pub fn percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        let ratio = self.completed_steps.len() as f64 / self.total_steps as f64;
        (ratio * 100.0).min(100.0)
    }

    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time from registration to end, once finished
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    pub(crate) fn finish(&mut self, status: MigrationStatus, now: DateTime<Utc>) {
        self.status = status;
        if self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
    }
}

/// Progress of one tracked operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Operation id
    pub operation_id: String,
    /// When the operation started
    pub started_at: DateTime<Utc>,
    /// When the operation turned terminal
    pub ended_at: Option<DateTime<Utc>>,
    /// Overall status
    pub status: MigrationStatus,
    /// Per-repository progress keyed by repository id
    pub repositories: BTreeMap<String, RepositoryProgress>,
    /// Append-only operation-wide log lines
    pub logs: Vec<LogEntry>,
    /// Number of repositories in the operation
    pub total_repositories: usize,
    /// Repositories that completed
    pub completed_repositories: usize,
    /// Repositories that failed
    pub failed_repositories: usize,
}

impl MigrationProgress {
    /// (completed + failed) / total × 100; 0 for an operation without repositories
    pub fn overall_percentage(&self) -> f64 {
        if self.total_repositories == 0 {
            return 0.0;
        }
        let done = self.completed_repositories + self.failed_repositories;
        (done as f64 / self.total_repositories as f64 * 100.0).min(100.0)
    }

    /// Not yet completed, failed or cancelled
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Progress of one repository
    pub fn repository(&self, repository_id: &str) -> Option<&RepositoryProgress> {
        self.repositories.get(repository_id)
    }

    /// Repositories that are neither completed nor failed nor cancelled
    pub fn remaining_repositories(&self) -> usize {
        self.repositories
            .values()
            .filter(|repo| !repo.is_terminal())
            .count()
    }

    /// Check that counters and timestamps agree with the repository map
    pub fn validate(&self) -> Result<(), String> {
        if self.operation_id.trim().is_empty() {
            return Err("operation id is empty".to_string());
        }
        if self.total_repositories != self.repositories.len() {
            return Err(format!(
                "total_repositories is {} but {} repositories are recorded",
                self.total_repositories,
                self.repositories.len()
            ));
        }

        let completed = self
            .repositories
            .values()
            .filter(|repo| repo.status.is_completed())
            .count();
        let failed = self
            .repositories
            .values()
            .filter(|repo| repo.status.is_failed())
            .count();
        if completed != self.completed_repositories || failed != self.failed_repositories {
            return Err(format!(
                "counters ({} completed, {} failed) disagree with repository statuses ({}, {})",
                self.completed_repositories, self.failed_repositories, completed, failed
            ));
        }

        if self.status.is_terminal() && self.ended_at.is_none() {
            return Err(format!("terminal operation has no end time ({})", self.status));
        }
        if let Some(ended_at) = self.ended_at {
            if ended_at < self.started_at {
                return Err("operation ends before it starts".to_string());
            }
        }

        for (key, repo) in &self.repositories {
            if key != &repo.repository_id {
                return Err(format!(
                    "repository stored under {} reports id {}",
                    key, repo.repository_id
                ));
            }
            if repo.total_steps == 0 || repo.completed_steps.len() > repo.total_steps {
                return Err(format!(
                    "repository {} has {} of {} steps completed",
                    key,
                    repo.completed_steps.len(),
                    repo.total_steps
                ));
            }
            if repo.is_terminal() != repo.ended_at.is_some() {
                return Err(format!(
                    "repository {} is {} but end time is {}",
                    key,
                    repo.status,
                    if repo.ended_at.is_some() { "set" } else { "missing" }
                ));
            }
        }

        Ok(())
    }
}
