//! Model catalog boundary.
//!
//! Model metadata CRUD is owned by an external collaborator; the
//! orchestrator only asks one question of it: whether a version is ready
//! to serve.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use meridian_core::{ModelId, VersionId};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Catalog status of one model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Training completed; the version may be deployed.
    Ready,
    /// Still training.
    Training,
    /// Training failed.
    Failed,
    /// Retired; must not be deployed.
    Archived,
}

impl VersionStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Training => "training",
            Self::Failed => "failed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External model metadata service, consumed at its boundary.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Look up the status of a model version.
    ///
    /// Returns [`OrchestratorError::VersionNotReady`] style errors only at
    /// call sites; this method itself reports the status or a lookup error.
    async fn version_status(
        &self,
        model_id: &ModelId,
        version_id: &VersionId,
    ) -> OrchestratorResult<VersionStatus>;
}

/// In-memory catalog for tests and single-node setups.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    versions: RwLock<HashMap<(String, String), VersionStatus>>,
}

impl StaticCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version with a status.
    pub fn register(&self, model_id: &ModelId, version_id: &VersionId, status: VersionStatus) {
        if let Ok(mut versions) = self.versions.write() {
            versions.insert(
                (model_id.as_str().to_owned(), version_id.as_str().to_owned()),
                status,
            );
        }
    }
}

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn version_status(
        &self,
        model_id: &ModelId,
        version_id: &VersionId,
    ) -> OrchestratorResult<VersionStatus> {
        let versions = self
            .versions
            .read()
            .map_err(|_| OrchestratorError::internal("lock poisoned"))?;

        versions
            .get(&(model_id.as_str().to_owned(), version_id.as_str().to_owned()))
            .copied()
            .ok_or_else(|| {
                OrchestratorError::Validation(format!(
                    "unknown version {version_id} for model {model_id}"
                ))
            })
    }
}
