//! In-memory deployment store for testing.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::{DeploymentId, ModelId};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{DeployState, DeploymentRecord};

use super::{DeploymentFilter, DeploymentStore};

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// In-memory deployment store.
///
/// Not suitable for production: data and leases are lost when the process
/// exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
    leases: RwLock<HashMap<String, Lease>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, record: &DeploymentRecord) -> OrchestratorResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        let key = record.data.id.as_str().to_owned();
        if deployments.contains_key(&key) {
            return Err(OrchestratorError::internal(format!(
                "deployment {key} already exists"
            )));
        }

        deployments.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, id: &DeploymentId) -> OrchestratorResult<Option<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        Ok(deployments.get(id.as_str()).cloned())
    }

    async fn save(
        &self,
        record: &DeploymentRecord,
        expected_state: DeployState,
    ) -> OrchestratorResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        let stored = deployments
            .get_mut(record.data.id.as_str())
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(record.data.id.to_string()))?;

        if stored.state != expected_state {
            return Err(OrchestratorError::StaleState {
                id: record.data.id.to_string(),
                expected: expected_state.as_str(),
                actual: stored.state.as_str().to_owned(),
            });
        }

        *stored = record.clone();
        Ok(())
    }

    async fn list(&self, filter: &DeploymentFilter) -> OrchestratorResult<Vec<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        let mut results: Vec<_> = deployments
            .values()
            .filter(|r| {
                if let Some(ref model_id) = filter.model_id {
                    if r.data.model_id != *model_id {
                        return false;
                    }
                }
                if let Some(ref env) = filter.environment {
                    if &r.data.environment != env {
                        return false;
                    }
                }
                if let Some(state) = filter.state {
                    if r.state != state {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.data.created_at.cmp(&a.data.created_at));

        if let Some(limit) = filter.limit {
            results.truncate(limit as usize);
        }

        Ok(results)
    }

    async fn list_active(
        &self,
        model_id: &ModelId,
        environment: &str,
    ) -> OrchestratorResult<Vec<DeploymentRecord>> {
        self.list(
            &DeploymentFilter::new()
                .with_model(model_id.clone())
                .with_environment(environment)
                .with_state(DeployState::Active),
        )
        .await
    }

    async fn acquire_lease(
        &self,
        model_id: &ModelId,
        holder: &str,
        ttl: Duration,
    ) -> OrchestratorResult<()> {
        let mut leases = self
            .leases
            .write()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        let now = Utc::now();
        let key = model_id.as_str().to_owned();

        if let Some(lease) = leases.get(&key) {
            if lease.holder != holder && lease.expires_at > now {
                return Err(OrchestratorError::OperationInProgress {
                    model: model_id.to_string(),
                });
            }
        }

        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| OrchestratorError::internal(format!("invalid lease ttl: {e}")))?;

        leases.insert(
            key,
            Lease {
                holder: holder.to_owned(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn release_lease(&self, model_id: &ModelId, holder: &str) -> OrchestratorResult<()> {
        let mut leases = self
            .leases
            .write()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        if let Some(lease) = leases.get(model_id.as_str()) {
            if lease.holder == holder {
                leases.remove(model_id.as_str());
            }
        }

        Ok(())
    }
}
