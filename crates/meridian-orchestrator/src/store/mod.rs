//! Deployment storage backends.
//!
//! The store is the source of truth for deployment state: every transition
//! is written with a compare-and-set on the predecessor state, so two
//! orchestrator instances can never both win the same transition. The store
//! also owns the per-model leases that serialise mutating operations: an
//! explicit resource rather than implicit process state, so exclusion
//! survives restarts and works across replicas.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::time::Duration;

use async_trait::async_trait;
use meridian_core::{DeploymentId, ModelId};

use crate::error::OrchestratorResult;
use crate::types::{DeployState, DeploymentRecord};

/// Filter criteria for listing deployments.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    /// Filter by model ID.
    pub model_id: Option<ModelId>,
    /// Filter by environment name.
    pub environment: Option<String>,
    /// Filter by state.
    pub state: Option<DeployState>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl DeploymentFilter {
    /// Create a new empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            model_id: None,
            environment: None,
            state: None,
            limit: None,
        }
    }

    /// Filter by model ID.
    #[must_use]
    pub fn with_model(mut self, model_id: ModelId) -> Self {
        self.model_id = Some(model_id);
        self
    }

    /// Filter by environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Filter by state.
    #[must_use]
    pub const fn with_state(mut self, state: DeployState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Backend for storing deployment records and per-model leases.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment record.
    ///
    /// Returns an error if a deployment with the same ID already exists.
    async fn insert(&self, record: &DeploymentRecord) -> OrchestratorResult<()>;

    /// Get a deployment by ID.
    async fn get(&self, id: &DeploymentId) -> OrchestratorResult<Option<DeploymentRecord>>;

    /// Save a record, compare-and-set on its stored state.
    ///
    /// The write succeeds only if the stored state equals `expected_state`;
    /// otherwise it fails with
    /// [`crate::OrchestratorError::StaleState`] and nothing is written.
    async fn save(
        &self,
        record: &DeploymentRecord,
        expected_state: DeployState,
    ) -> OrchestratorResult<()>;

    /// List deployments matching the filter, newest first.
    async fn list(&self, filter: &DeploymentFilter) -> OrchestratorResult<Vec<DeploymentRecord>>;

    /// List the active deployments for a model/environment.
    ///
    /// More than one entry is only possible during a rollback overlap window
    /// or after a forced deploy.
    async fn list_active(
        &self,
        model_id: &ModelId,
        environment: &str,
    ) -> OrchestratorResult<Vec<DeploymentRecord>>;

    /// Acquire the model's deployment-mutation lease.
    ///
    /// Fails fast with [`crate::OrchestratorError::OperationInProgress`]
    /// when another holder owns an unexpired lease. Re-acquisition by the
    /// same holder refreshes the expiry.
    async fn acquire_lease(
        &self,
        model_id: &ModelId,
        holder: &str,
        ttl: Duration,
    ) -> OrchestratorResult<()>;

    /// Release the model's lease if this holder owns it.
    ///
    /// Releasing a lease that has already expired or been taken by another
    /// holder is a no-op.
    async fn release_lease(&self, model_id: &ModelId, holder: &str) -> OrchestratorResult<()>;
}
