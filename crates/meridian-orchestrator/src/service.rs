//! Service lifecycle management.
//!
//! Wires the stores, event bus, scoring engine, monitor, and remediation
//! coordinator together, and handles signals and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use meridian_drift::{DriftMonitor, DriftStore, MemoryDriftStore, PostgresDriftStore, ScoringEngine};
use meridian_events::{EventBus, InMemoryEventBus};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::catalog::{ModelCatalog, StaticCatalog};
use crate::config::{OrchestratorConfig, ProvisionerType};
use crate::deployment::DeploymentManager;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::provisioner::{HttpProvisioner, MockProvisioner, Provisioner};
use crate::remediation::RemediationCoordinator;
use crate::store::{DeploymentStore, MemoryStore, PostgresStore};

/// The orchestrator service.
///
/// Runs the drift monitor and the remediation coordinator as background
/// tasks and waits for a shutdown signal. Deployment operations are served
/// through [`DeploymentManager`], which library consumers drive directly;
/// the model catalog wired here is the integration point for the external
/// metadata service.
pub struct OrchestratorService {
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl OrchestratorService {
    /// Create a new service with the given configuration.
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the service until a shutdown signal arrives.
    pub async fn run(&self) -> OrchestratorResult<()> {
        let bus: Arc<dyn EventBus> =
            Arc::new(InMemoryEventBus::new(self.config.events.capacity));

        let store = self.create_store().await;
        let drift_store = self.create_drift_store().await;
        let provisioner = self.create_provisioner()?;
        let catalog: Arc<dyn ModelCatalog> = Arc::new(StaticCatalog::new());

        let manager = Arc::new(DeploymentManager::new(
            Arc::clone(&store),
            provisioner,
            catalog,
            Arc::clone(&bus),
            self.config.deployment.clone(),
        ));
        info!("deployment manager initialised");

        let engine = Arc::new(ScoringEngine::new(
            Arc::clone(&drift_store),
            Arc::clone(&bus),
            self.config.drift.clone(),
        ));

        let monitor = DriftMonitor::new(
            Arc::clone(&engine),
            Arc::clone(&drift_store),
            Duration::from_secs(self.config.drift.assess_interval_secs),
            self.cancel.child_token(),
        );
        let monitor_task = tokio::spawn(monitor.run());
        info!(
            interval_secs = self.config.drift.assess_interval_secs,
            "drift monitor started"
        );

        let coordinator = Arc::new(RemediationCoordinator::new(
            manager,
            Arc::clone(&store),
            Arc::clone(&bus),
            self.config.remediation.clone(),
        ));
        let coordinator_task = tokio::spawn(coordinator.run(self.cancel.child_token()));
        info!("remediation coordinator started");

        shutdown_signal(self.cancel.clone()).await;
        self.cancel.cancel();

        let _ = monitor_task.await;
        let _ = coordinator_task.await;

        info!("orchestrator service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_store(&self) -> Arc<dyn DeploymentStore> {
        match PostgresStore::new(&self.config.database.url).await {
            Ok(store) => {
                info!(url = %self.config.database.url, "connected to PostgreSQL");
                Arc::new(store)
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to connect to PostgreSQL, using in-memory deployment store"
                );
                Arc::new(MemoryStore::new())
            }
        }
    }

    async fn create_drift_store(&self) -> Arc<dyn DriftStore> {
        match PostgresDriftStore::new(&self.config.database.url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(
                    error = %e,
                    "failed to connect to PostgreSQL, using in-memory drift store"
                );
                Arc::new(MemoryDriftStore::new())
            }
        }
    }

    fn create_provisioner(&self) -> OrchestratorResult<Arc<dyn Provisioner>> {
        let provisioner: Arc<dyn Provisioner> = match self.config.provisioner.provisioner_type {
            ProvisionerType::Http => Arc::new(
                HttpProvisioner::new(
                    self.config.provisioner.url.clone(),
                    Duration::from_secs(self.config.provisioner.request_timeout_secs),
                )
                .map_err(|e| OrchestratorError::Config(e.to_string()))?,
            ),
            ProvisionerType::Mock => Arc::new(MockProvisioner::new()),
        };
        info!(
            provisioner_type = ?self.config.provisioner.provisioner_type,
            "provisioner configured"
        );
        Ok(provisioner)
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_creation() {
        let config = OrchestratorConfig::default();
        let service = OrchestratorService::new(config);
        assert!(!service.cancel.is_cancelled());
    }

    #[test]
    fn service_shutdown() {
        let config = OrchestratorConfig::default();
        let service = OrchestratorService::new(config);
        service.shutdown();
        assert!(service.cancel.is_cancelled());
    }
}
