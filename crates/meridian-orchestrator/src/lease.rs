//! Per-model lease guard.
//!
//! At most one deployment-mutating operation may run per model at a time.
//! The lease itself lives in the store (see
//! [`crate::store::DeploymentStore::acquire_lease`]); this guard ties its
//! lifetime to the operation so every exit path (including panics and `?`
//! returns) releases it. A crashed process is covered by the TTL expiry.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::ModelId;
use tracing::debug;

use crate::error::OrchestratorResult;
use crate::store::DeploymentStore;

/// Holds a model's deployment-mutation lease for the duration of one
/// operation.
pub struct LeaseGuard {
    store: Arc<dyn DeploymentStore>,
    model_id: ModelId,
    holder: String,
    released: bool,
}

impl LeaseGuard {
    /// Acquire the lease, failing fast if another operation holds it.
    pub async fn acquire(
        store: Arc<dyn DeploymentStore>,
        model_id: ModelId,
        holder: impl Into<String>,
        ttl: Duration,
    ) -> OrchestratorResult<Self> {
        let holder = holder.into();
        store.acquire_lease(&model_id, &holder, ttl).await?;
        debug!(model_id = %model_id, holder = %holder, "lease acquired");

        Ok(Self {
            store,
            model_id,
            holder,
            released: false,
        })
    }

    /// Release the lease explicitly.
    pub async fn release(mut self) {
        let _ = self
            .store
            .release_lease(&self.model_id, &self.holder)
            .await;
        debug!(model_id = %self.model_id, "lease released");
        self.released = true;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Best-effort async release; the TTL covers us if no runtime is
        // available or the release itself fails.
        let store = Arc::clone(&self.store);
        let model_id = self.model_id.clone();
        let holder = self.holder.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = store.release_lease(&model_id, &holder).await;
            });
        }
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("model_id", &self.model_id)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}
