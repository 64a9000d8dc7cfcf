//! Common test utilities for orchestrator integration tests.

pub mod fixtures;

use std::sync::Arc;

use meridian_core::{ModelId, VersionId};
use meridian_events::InMemoryEventBus;
use meridian_orchestrator::catalog::{StaticCatalog, VersionStatus};
use meridian_orchestrator::config::{DeploymentConfig, RemediationConfig};
use meridian_orchestrator::provisioner::MockProvisioner;
use meridian_orchestrator::remediation::RemediationCoordinator;
use meridian_orchestrator::store::MemoryStore;
use meridian_orchestrator::DeploymentManager;

/// Complete test orchestrator setup with all components wired together.
pub struct TestOrchestrator {
    pub store: Arc<MemoryStore>,
    pub provisioner: Arc<MockProvisioner>,
    pub catalog: Arc<StaticCatalog>,
    pub bus: Arc<InMemoryEventBus>,
    pub manager: Arc<DeploymentManager>,
}

impl TestOrchestrator {
    /// Creates a new test orchestrator with default configuration.
    pub fn new() -> Self {
        Self::with_config(DeploymentConfig::default())
    }

    /// Creates a new test orchestrator with custom deployment configuration.
    pub fn with_config(config: DeploymentConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provisioner = Arc::new(MockProvisioner::new());
        let catalog = Arc::new(StaticCatalog::new());
        let bus = Arc::new(InMemoryEventBus::default());

        let manager = Arc::new(DeploymentManager::new(
            store.clone(),
            provisioner.clone(),
            catalog.clone(),
            bus.clone(),
            config,
        ));

        Self {
            store,
            provisioner,
            catalog,
            bus,
            manager,
        }
    }

    /// Creates a test orchestrator with short timeouts for time-sensitive
    /// tests.
    pub fn with_fast_timeouts() -> Self {
        Self::with_config(DeploymentConfig {
            provision_timeout_secs: 2,
            health_check_timeout_secs: 1,
            lease_ttl_secs: 30,
        })
    }

    /// Registers a version as ready to deploy.
    pub fn register_ready(&self, model: &ModelId, version: &VersionId) {
        self.catalog.register(model, version, VersionStatus::Ready);
    }

    /// Builds a remediation coordinator over this orchestrator's components.
    pub fn coordinator(&self, config: RemediationConfig) -> Arc<RemediationCoordinator> {
        Arc::new(RemediationCoordinator::new(
            self.manager.clone(),
            self.store.clone(),
            self.bus.clone(),
            config,
        ))
    }
}

impl Default for TestOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
