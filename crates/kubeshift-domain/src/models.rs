//! Core value objects for repository migrations

use crate::error::{DomainError, DomainResult};
use crate::status::QueueItemStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lowest accepted number of concurrent migrations
pub const MIN_CONCURRENT_MIGRATIONS: usize = 1;
/// Highest accepted number of concurrent migrations
pub const MAX_CONCURRENT_MIGRATIONS: usize = 10;
/// Concurrency bound used when nothing is configured
pub const DEFAULT_MAX_CONCURRENT_MIGRATIONS: usize = 3;

/// Check a concurrency bound against the accepted range
pub fn validate_concurrency(requested: usize) -> DomainResult<usize> {
    if (MIN_CONCURRENT_MIGRATIONS..=MAX_CONCURRENT_MIGRATIONS).contains(&requested) {
        Ok(requested)
    } else {
        Err(DomainError::InvalidConcurrency {
            requested,
            min: MIN_CONCURRENT_MIGRATIONS,
            max: MAX_CONCURRENT_MIGRATIONS,
        })
    }
}

/// Reference to a source repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Clone URL; also the repository identity
    pub url: String,
    /// Short display name
    pub name: String,
    /// Source-control provider (github, gitlab, bitbucket), if known
    #[serde(default)]
    pub provider: Option<String>,
    /// Branch to migrate; provider default when absent
    #[serde(default)]
    pub branch: Option<String>,
}

impl RepositoryRef {
    /// Build a reference from a URL, deriving the name from its last path segment
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = repository_name_from_id(&url);
        Self {
            url,
            name,
            provider: None,
            branch: None,
        }
    }

    /// Set the provider
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Identity used by the progress tracker
    pub fn id(&self) -> &str {
        &self.url
    }
}

/// Derive a display name from a repository id or URL.
///
/// `https://github.com/acme/billing-api.git` becomes `billing-api`.
pub fn repository_name_from_id(id: &str) -> String {
    let trimmed = id.trim_end_matches('/');
    let last = trimmed
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

/// Deployment platform targeted by a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetPlatform {
    /// Plain Kubernetes manifests
    #[default]
    Kubernetes,
    /// OpenShift resources
    Openshift,
    /// docker-compose file
    DockerCompose,
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Kubernetes => "kubernetes",
            Self::Openshift => "openshift",
            Self::DockerCompose => "docker-compose",
        };
        f.write_str(s)
    }
}

/// Optional artifacts generated alongside the platform manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalComponent {
    /// Helm chart
    Helm,
    /// Dockerfile
    Dockerfile,
    /// CI/CD pipeline definition
    Cicd,
    /// Monitoring configuration
    Monitoring,
}

/// Migration configuration attached to a queue item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Target platform
    pub target_platform: TargetPlatform,
    /// Optional components to generate
    #[serde(default)]
    pub components: BTreeSet<OptionalComponent>,
    /// Free-form settings passed through to the orchestrator
    #[serde(default)]
    pub custom_settings: BTreeMap<String, String>,
}

impl MigrationConfig {
    /// Configuration targeting the given platform with no extras
    pub fn new(target_platform: TargetPlatform) -> Self {
        Self {
            target_platform,
            ..Default::default()
        }
    }

    /// Add an optional component
    pub fn with_component(mut self, component: OptionalComponent) -> Self {
        self.components.insert(component);
        self
    }

    /// Add a custom setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_settings.insert(key.into(), value.into());
        self
    }
}

/// Per-repository result returned by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Repository name
    pub repository_name: String,
    /// Detected framework; `None` when unknown
    #[serde(default)]
    pub framework: Option<String>,
    /// Whether the migration succeeded
    pub success: bool,
    /// Human-readable message
    pub message: String,
    /// Structured error detail
    #[serde(default)]
    pub error_detail: Option<serde_json::Value>,
}

impl MigrationResult {
    /// Successful result
    pub fn succeeded(repository_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            framework: None,
            success: true,
            message: message.into(),
            error_detail: None,
        }
    }

    /// Failed result
    pub fn failed(repository_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            framework: None,
            success: false,
            message: message.into(),
            error_detail: None,
        }
    }

    /// Attach the detected framework
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    /// Attach structured error detail
    pub fn with_error_detail(mut self, detail: serde_json::Value) -> Self {
        self.error_detail = Some(detail);
        self
    }

    /// Framework name, or `"unknown"`
    pub fn framework_name(&self) -> &str {
        self.framework.as_deref().unwrap_or("unknown")
    }
}

/// Outcome stored on a queue item once it leaves Processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItemResult {
    /// Whether the dispatch succeeded
    pub success: bool,
    /// Summary message
    pub message: String,
    /// Error detail when the dispatch failed
    #[serde(default)]
    pub error: Option<String>,
    /// Raw per-repository results from the orchestrator
    #[serde(default)]
    pub results: Vec<MigrationResult>,
}

impl QueueItemResult {
    /// Fold orchestrator results into one outcome; success only if every result succeeded
    pub fn from_results(results: Vec<MigrationResult>) -> Self {
        if results.is_empty() {
            return Self::failure("Orchestrator returned no results", None);
        }

        let failed: Vec<&MigrationResult> = results.iter().filter(|r| !r.success).collect();
        if failed.is_empty() {
            let message = results
                .iter()
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            Self {
                success: true,
                message,
                error: None,
                results,
            }
        } else {
            let message = failed
                .iter()
                .map(|r| format!("{}: {}", r.repository_name, r.message))
                .collect::<Vec<_>>()
                .join("; ");
            let error = failed
                .iter()
                .find_map(|r| r.error_detail.as_ref().map(|d| d.to_string()));
            Self {
                success: false,
                message,
                error,
                results,
            }
        }
    }

    /// Failure that never produced orchestrator results
    pub fn failure(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error,
            results: Vec::new(),
        }
    }
}

/// A repository and configuration awaiting or undergoing migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier
    pub id: String,
    /// Repository to migrate
    pub repository: RepositoryRef,
    /// Migration configuration
    pub configuration: MigrationConfig,
    /// Current status
    pub status: QueueItemStatus,
    /// Higher runs sooner
    pub priority: i32,
    /// FIFO position among equal priorities
    pub sequence: u64,
    /// When the item was added
    pub added_at: DateTime<Utc>,
    /// When the item was dispatched
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    /// When the item reached a finished status
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome of the dispatch
    #[serde(default)]
    pub result: Option<QueueItemResult>,
    /// Cancellation was requested while Processing
    #[serde(default)]
    pub cancel_requested: bool,
}

impl QueueItem {
    /// Create a Pending item
    pub fn new(
        repository: RepositoryRef,
        configuration: MigrationConfig,
        priority: i32,
        sequence: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repository,
            configuration,
            status: QueueItemStatus::Pending,
            priority,
            sequence,
            added_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            result: None,
            cancel_requested: false,
        }
    }

    /// Move to `next`, refusing non-monotonic transitions
    pub fn transition(&mut self, next: QueueItemStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == QueueItemStatus::Processing {
            self.processed_at = Some(now);
        }
        if next.is_finished() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// Severity of a progress log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    #[default]
    Info,
    /// Something unexpected but recoverable
    Warn,
    /// A failure
    Error,
}

/// Timestamped log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity
    #[serde(default)]
    pub level: LogLevel,
    /// Text
    pub message: String,
}

impl LogEntry {
    /// Line stamped with the current time
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    /// Info line
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Error line
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:?}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}
