//! Status and step enumerations shared by the queue and the progress tracker

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for a free slot
    Pending,
    /// Dispatched to the orchestrator
    Processing,
    /// Orchestrator reported success
    Completed,
    /// Orchestrator reported failure, or the dispatch itself failed
    Failed,
    /// Cancelled before reaching Completed or Failed
    Cancelled,
}

impl QueueItemStatus {
    /// Pending or Processing
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Completed, Failed or Cancelled
    pub fn is_finished(&self) -> bool {
        !self.is_active()
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// Allowed: Pending -> Processing, Processing -> Completed | Failed,
    /// and Pending | Processing -> Cancelled. Nothing leaves a finished state.
    pub fn can_transition_to(&self, next: QueueItemStatus) -> bool {
        use QueueItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Migration status of a repository or of a whole operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Nothing has happened yet
    NotStarted,
    /// Registered and waiting for work
    Queued,
    /// Source is being fetched
    Cloning,
    /// Project structure is being analyzed
    Analyzing,
    /// Deployment artifacts are being generated
    Generating,
    /// Generated artifacts are being validated
    Validating,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped before finishing
    Cancelled,
}

impl MigrationStatus {
    /// Work is actively happening
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Cloning | Self::Analyzing | Self::Generating | Self::Validating
        )
    }

    /// Finished successfully
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Finished with an error
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Completed, Failed or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Queued => "queued",
            Self::Cloning => "cloning",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Named phases of a single repository migration, in execution order.
///
/// The derived `Ord` follows declaration order, so a `BTreeSet<MigrationStep>`
/// iterates in phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    /// Preparing the workspace
    Initializing,
    /// Fetching the repository
    Cloning,
    /// Detecting framework and build layout
    Analyzing,
    /// Producing Dockerfile, manifests and charts
    GeneratingArtifacts,
    /// Checking the generated artifacts
    Validating,
    /// Writing results and cleaning up
    Finalizing,
}

impl MigrationStep {
    /// Every step, in order
    pub const ALL: [MigrationStep; 6] = [
        Self::Initializing,
        Self::Cloning,
        Self::Analyzing,
        Self::GeneratingArtifacts,
        Self::Validating,
        Self::Finalizing,
    ];

    /// Number of defined steps; denominator of repository percentages
    pub fn total_steps() -> usize {
        Self::ALL.len()
    }

    /// One-based position of the step
    pub fn step_number(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    /// Human-readable name used in log lines
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Cloning => "Cloning repository",
            Self::Analyzing => "Analyzing project",
            Self::GeneratingArtifacts => "Generating artifacts",
            Self::Validating => "Validating artifacts",
            Self::Finalizing => "Finalizing",
        }
    }

    /// Repository status reported while this step runs
    pub fn status(&self) -> MigrationStatus {
        match self {
            Self::Initializing | Self::Cloning => MigrationStatus::Cloning,
            Self::Analyzing => MigrationStatus::Analyzing,
            Self::GeneratingArtifacts => MigrationStatus::Generating,
            Self::Validating | Self::Finalizing => MigrationStatus::Validating,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
