//! Boundary to the component that performs the actual migration work

use crate::error::DomainResult;
use crate::models::{MigrationConfig, MigrationResult, RepositoryRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A batch of repositories to migrate with one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Correlates the request with the queue item or operation that issued it
    pub request_id: String,
    /// Repositories to migrate
    pub repositories: Vec<RepositoryRef>,
    /// Configuration applied to every repository
    pub configuration: MigrationConfig,
}

impl MigrationRequest {
    /// Request for a single repository
    pub fn single(
        request_id: impl Into<String>,
        repository: RepositoryRef,
        configuration: MigrationConfig,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            repositories: vec![repository],
            configuration,
        }
    }
}

/// Performs migrations on behalf of the queue.
///
/// Implementations clone, analyze and generate artifacts; the queue only
/// sees the returned results. `cancel` fires when the caller asks to cancel
/// an in-flight request. Honouring it is optional, and the queue records the
/// item's final status only once this call returns.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Migrate every repository in `request`, returning one result per repository
    async fn migrate(
        &self,
        request: MigrationRequest,
        cancel: CancellationToken,
    ) -> DomainResult<Vec<MigrationResult>>;

    /// Name used in log output
    fn name(&self) -> &str {
        "orchestrator"
    }
}
