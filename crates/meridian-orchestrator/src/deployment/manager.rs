//! Core deployment orchestration logic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use meridian_core::{DeploymentId, ModelId, VersionId};
use meridian_events::{Event, EventBus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{ModelCatalog, VersionStatus};
use crate::config::DeploymentConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::lease::LeaseGuard;
use crate::provisioner::{InfraHandle, ProvisionError, ProvisionSpec, Provisioner};
use crate::state::{Active, AnyDeployment, Deployment, Deploying, Pending};
use crate::store::DeploymentStore;
use crate::types::{DeployState, DeploymentData, DeploymentRecord, DeploymentSpec};

/// Request to create a new deployment.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Model to deploy.
    pub model_id: ModelId,
    /// Version to deploy; must be `Ready` in the catalog.
    pub version_id: VersionId,
    /// Target environment.
    pub environment: String,
    /// Configuration snapshot for the deployment.
    pub spec: DeploymentSpec,
    /// Skip the unique-active check for this model/environment.
    pub force: bool,
}

/// Who initiated a rollback.
///
/// Decides the terminal state of the deployment that leaves service: a
/// manual cutover marks it `Inactive`, an automated drift-triggered one
/// marks it `RolledBack`, so the audit trail distinguishes operator intent
/// from remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTrigger {
    /// Operator-initiated rollback.
    Manual,
    /// Rollback triggered by a Critical drift classification.
    DriftCritical,
}

/// Orchestrates deployment lifecycle operations.
///
/// Every mutating operation runs under the model's store lease and writes
/// state transitions with compare-and-set, so concurrent orchestrator
/// instances cannot violate the single-active invariant.
pub struct DeploymentManager {
    store: Arc<dyn DeploymentStore>,
    provisioner: Arc<dyn Provisioner>,
    catalog: Arc<dyn ModelCatalog>,
    bus: Arc<dyn EventBus>,
    config: DeploymentConfig,
    /// Lease holder identity for this orchestrator instance.
    instance: String,
}

impl DeploymentManager {
    /// Create a new deployment manager.
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        provisioner: Arc<dyn Provisioner>,
        catalog: Arc<dyn ModelCatalog>,
        bus: Arc<dyn EventBus>,
        config: DeploymentConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            catalog,
            bus,
            config,
            instance: format!("orchestrator-{}", ulid::Ulid::new().to_string().to_lowercase()),
        }
    }

    fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.config.lease_ttl_secs)
    }

    /// Publish an event; a bus failure must not fail the operation.
    async fn emit(&self, event: Event) {
        if let Err(e) = self.bus.publish(event).await {
            warn!(error = %e, "event publication failed");
        }
    }

    async fn require_ready(
        &self,
        model_id: &ModelId,
        version_id: &VersionId,
    ) -> OrchestratorResult<()> {
        let status = self.catalog.version_status(model_id, version_id).await?;
        if status != VersionStatus::Ready {
            return Err(OrchestratorError::VersionNotReady {
                version: version_id.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    /// Deploy a version of a model to an environment.
    ///
    /// Creates a `Pending` record, transitions it to `Deploying`, provisions
    /// serving capacity, and activates on full success. Any step failure
    /// moves the record to `Failed` with the first error recorded, after
    /// best-effort teardown of partially created infrastructure.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        self.require_ready(&request.model_id, &request.version_id)
            .await?;

        let lease = LeaseGuard::acquire(
            Arc::clone(&self.store),
            request.model_id.clone(),
            self.instance.clone(),
            self.lease_ttl(),
        )
        .await?;

        let result = self.deploy_locked(request, cancel).await;
        lease.release().await;
        result
    }

    async fn deploy_locked(
        &self,
        request: DeployRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        if !request.force {
            let active = self
                .store
                .list_active(&request.model_id, &request.environment)
                .await?;
            if let Some(existing) = active.first() {
                warn!(
                    model_id = %request.model_id,
                    environment = %request.environment,
                    existing = %existing.data.id,
                    "deployment rejected: already active"
                );
                return Err(OrchestratorError::AlreadyActive {
                    model: request.model_id.to_string(),
                    environment: request.environment,
                });
            }
        }

        // Cancellation is only honoured as an abort before infrastructure
        // creation begins; afterwards it degrades to teardown.
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let data = DeploymentData::new(
            request.model_id.clone(),
            request.version_id.clone(),
            request.environment.clone(),
            request.spec,
        );
        let deployment_id = data.id.clone();

        info!(
            deployment_id = %deployment_id,
            model_id = %request.model_id,
            version_id = %request.version_id,
            environment = %request.environment,
            "starting deployment"
        );

        let pending = Deployment::<Pending>::create(data);
        self.store
            .insert(&DeploymentRecord::new(pending.data().clone()))
            .await?;

        let deploying = pending.start_deploying();
        self.save_as(deploying.data(), DeployState::Deploying, DeployState::Pending)
            .await?;

        self.emit(Event::DeploymentStarted {
            model_id: request.model_id.clone(),
            deployment_id: deployment_id.clone(),
            version_id: request.version_id.clone(),
            environment: request.environment.clone(),
            timestamp: Utc::now(),
        })
        .await;

        match self.provision(&deploying, cancel).await {
            Ok(handle) => {
                let active = deploying.activate(handle.endpoint.clone(), handle.id.clone());
                self.save_as(active.data(), DeployState::Active, DeployState::Deploying)
                    .await?;

                info!(
                    deployment_id = %deployment_id,
                    endpoint = %handle.endpoint,
                    "deployment completed successfully"
                );

                self.emit(Event::DeploymentCompleted {
                    model_id: active.data().model_id.clone(),
                    deployment_id: deployment_id.clone(),
                    version_id: active.data().version_id.clone(),
                    endpoint: handle.endpoint,
                    timestamp: Utc::now(),
                })
                .await;

                Ok(DeploymentRecord {
                    data: active.into_data(),
                    state: DeployState::Active,
                })
            }
            Err(provision_error) => {
                let reason = provision_error.to_string();
                error!(deployment_id = %deployment_id, error = %reason, "deployment failed");

                self.teardown_partial(provision_error.partial.as_ref()).await;

                let failed = deploying.fail(reason.clone());
                self.save_as(failed.data(), DeployState::Failed, DeployState::Deploying)
                    .await?;

                self.emit(Event::DeploymentFailed {
                    model_id: failed.data().model_id.clone(),
                    deployment_id,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                })
                .await;

                if provision_error.timed_out {
                    Err(OrchestratorError::Timeout("infrastructure provisioning"))
                } else {
                    Err(OrchestratorError::Provisioning(reason))
                }
            }
        }
    }

    /// Run infrastructure creation bounded by the configured timeout.
    async fn provision(
        &self,
        deploying: &Deployment<Deploying>,
        cancel: &CancellationToken,
    ) -> Result<InfraHandle, ProvisionError> {
        let data = deploying.data();
        let spec = ProvisionSpec {
            deployment_id: data.id.clone(),
            model_id: data.model_id.clone(),
            version_id: data.version_id.clone(),
            environment: data.environment.clone(),
            spec: data.spec.clone(),
        };

        let timeout = Duration::from_secs(self.config.provision_timeout_secs);
        match tokio::time::timeout(
            timeout,
            self.provisioner.create_infrastructure(&spec, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::new(
                crate::provisioner::ProvisionStep::Infrastructure,
                format!("provisioning exceeded {}s deadline", timeout.as_secs()),
            )
            .timed_out()),
        }
    }

    async fn teardown_partial(&self, partial: Option<&InfraHandle>) {
        if let Some(handle) = partial {
            warn!(handle = %handle.id, "tearing down partially created infrastructure");
            if let Err(e) = self.provisioner.teardown(handle).await {
                error!(handle = %handle.id, error = %e, "partial teardown failed");
            }
        }
    }

    /// Save `data` in `state`, compare-and-set on `expected`.
    async fn save_as(
        &self,
        data: &DeploymentData,
        state: DeployState,
        expected: DeployState,
    ) -> OrchestratorResult<()> {
        self.store
            .save(
                &DeploymentRecord {
                    data: data.clone(),
                    state,
                },
                expected,
            )
            .await
    }

    /// Roll back from a currently active deployment to a target version
    /// using a blue/green cutover.
    ///
    /// The new ("green") instance is provisioned while the current ("blue")
    /// one keeps serving; traffic moves only after green passes its health
    /// check. If the health check or the traffic switch fails (including by
    /// timeout), green is marked `Failed`, blue is re-confirmed `Active`,
    /// and the original error is surfaced. That recovery path is mandatory;
    /// the cutover is never retried implicitly.
    pub async fn rollback_to(
        &self,
        current_id: &DeploymentId,
        target_version: &VersionId,
        trigger: RollbackTrigger,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        // First read only to learn the model for the lease.
        let current = self
            .store
            .get(current_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(current_id.to_string()))?;

        if current.data.version_id == *target_version {
            return Err(OrchestratorError::validation(format!(
                "rollback target version {target_version} is already deployed"
            )));
        }

        let lease = LeaseGuard::acquire(
            Arc::clone(&self.store),
            current.data.model_id.clone(),
            self.instance.clone(),
            self.lease_ttl(),
        )
        .await?;

        let result = self
            .rollback_locked(current_id, target_version, trigger, cancel)
            .await;
        lease.release().await;
        result
    }

    async fn rollback_locked(
        &self,
        current_id: &DeploymentId,
        target_version: &VersionId,
        trigger: RollbackTrigger,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        // Re-read under the lease: the record must still be active.
        let blue = self
            .store
            .get(current_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(current_id.to_string()))?;
        let blue = AnyDeployment::from_persisted(blue.data, blue.state).try_into_active()?;

        let blue_endpoint = blue.data().endpoint.clone().ok_or_else(|| {
            OrchestratorError::internal(format!("active deployment {current_id} has no endpoint"))
        })?;
        let blue_handle_id = blue.data().infra_handle.clone().ok_or_else(|| {
            OrchestratorError::internal(format!("active deployment {current_id} has no handle"))
        })?;
        let blue_handle = InfraHandle {
            id: blue_handle_id,
            endpoint: blue_endpoint.clone(),
        };

        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let green_data = blue.data().rollback_successor(target_version.clone());
        let green_id = green_data.id.clone();

        info!(
            model_id = %green_data.model_id,
            blue = %current_id,
            green = %green_id,
            target_version = %target_version,
            trigger = ?trigger,
            "starting rollback cutover"
        );

        let green_pending = Deployment::<Pending>::create(green_data);
        self.store
            .insert(&DeploymentRecord::new(green_pending.data().clone()))
            .await?;

        let green_deploying = green_pending.start_deploying();
        self.save_as(
            green_deploying.data(),
            DeployState::Deploying,
            DeployState::Pending,
        )
        .await?;

        self.emit(Event::DeploymentStarted {
            model_id: green_deploying.data().model_id.clone(),
            deployment_id: green_id.clone(),
            version_id: target_version.clone(),
            environment: green_deploying.data().environment.clone(),
            timestamp: Utc::now(),
        })
        .await;

        // Provision green while blue keeps serving.
        let green_handle = match self.provision(&green_deploying, cancel).await {
            Ok(handle) => handle,
            Err(provision_error) => {
                let reason = provision_error.to_string();
                self.teardown_partial(provision_error.partial.as_ref()).await;
                return self
                    .fail_green_and_confirm_blue(
                        green_deploying,
                        blue,
                        reason,
                        provision_error.timed_out,
                    )
                    .await;
            }
        };

        // Health-check green before any traffic moves.
        let health_timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let health = tokio::time::timeout(
            health_timeout,
            self.provisioner.health_check(&green_handle, cancel),
        )
        .await;

        match health {
            Ok(Ok(report)) if report.healthy => {}
            Ok(Ok(_)) => {
                self.teardown_green(&green_handle).await;
                return self
                    .fail_green_and_confirm_blue(
                        green_deploying,
                        blue,
                        "green instance failed its health check".to_owned(),
                        false,
                    )
                    .await;
            }
            Ok(Err(e)) => {
                let timed_out = e.timed_out;
                self.teardown_green(&green_handle).await;
                return self
                    .fail_green_and_confirm_blue(green_deploying, blue, e.to_string(), timed_out)
                    .await;
            }
            Err(_) => {
                // The recovery path runs before the timeout is surfaced.
                self.teardown_green(&green_handle).await;
                return self
                    .fail_green_and_confirm_blue(
                        green_deploying,
                        blue,
                        format!(
                            "green health check exceeded {}s deadline",
                            health_timeout.as_secs()
                        ),
                        true,
                    )
                    .await;
            }
        }

        // Atomically reassign the stable endpoint from blue to green.
        if let Err(e) = self
            .provisioner
            .switch_traffic(&blue_handle, &green_handle, cancel)
            .await
        {
            let timed_out = e.timed_out;
            self.teardown_green(&green_handle).await;
            return self
                .fail_green_and_confirm_blue(green_deploying, blue, e.to_string(), timed_out)
                .await;
        }

        // Green serves on blue's stable endpoint; the traffic address does
        // not change across a rollback.
        let green_active =
            green_deploying.activate(blue_endpoint, green_handle.id.clone());
        self.save_as(
            green_active.data(),
            DeployState::Active,
            DeployState::Deploying,
        )
        .await?;

        let model_id = green_active.data().model_id.clone();

        // Blue leaves service; the terminal state records who initiated it.
        let (blue_data, blue_state) = match trigger {
            RollbackTrigger::Manual => {
                let inactive = blue.mark_inactive(green_id.clone());
                (inactive.into_data(), DeployState::Inactive)
            }
            RollbackTrigger::DriftCritical => {
                let rolled_back = blue.mark_rolled_back(green_id.clone());
                (rolled_back.into_data(), DeployState::RolledBack)
            }
        };
        self.save_as(&blue_data, blue_state, DeployState::Active).await?;

        info!(
            model_id = %model_id,
            blue = %current_id,
            green = %green_id,
            "rollback cutover completed"
        );

        self.emit(Event::RollbackCompleted {
            model_id,
            from_deployment: current_id.clone(),
            to_deployment: green_id,
            target_version: target_version.clone(),
            timestamp: Utc::now(),
        })
        .await;

        Ok(DeploymentRecord {
            data: green_active.into_data(),
            state: DeployState::Active,
        })
    }

    async fn teardown_green(&self, handle: &InfraHandle) {
        if let Err(e) = self.provisioner.teardown(handle).await {
            error!(handle = %handle.id, error = %e, "green teardown failed");
        }
    }

    /// The rollback recovery path: green is marked `Failed`, blue is
    /// re-confirmed `Active` from the store, and only then is the original
    /// error surfaced. If blue cannot be confirmed, the result is the one
    /// loudly-alerted fatal condition: the model may be unserved.
    async fn fail_green_and_confirm_blue(
        &self,
        green: Deployment<Deploying>,
        blue: Deployment<Active>,
        reason: String,
        timed_out: bool,
    ) -> OrchestratorResult<DeploymentRecord> {
        let green_id = green.id().clone();
        let model_id = green.data().model_id.clone();
        error!(green = %green_id, error = %reason, "rollback cutover failed");

        let failed = green.fail(reason.clone());
        self.save_as(failed.data(), DeployState::Failed, DeployState::Deploying)
            .await?;

        self.emit(Event::DeploymentFailed {
            model_id: model_id.clone(),
            deployment_id: green_id,
            reason: reason.clone(),
            timestamp: Utc::now(),
        })
        .await;

        // Re-confirm blue from the store, not from memory.
        let stored_blue = self.store.get(blue.id()).await?;
        let confirmed = matches!(
            stored_blue,
            Some(ref record) if record.state == DeployState::Active
        );

        if !confirmed {
            let alert = format!(
                "rollback recovery failed: previous deployment {} is not active",
                blue.id()
            );
            error!(model_id = %model_id, "{alert}");
            self.emit(Event::Alert {
                model_id: model_id.clone(),
                message: alert.clone(),
                timestamp: Utc::now(),
            })
            .await;
            return Err(OrchestratorError::Recovery {
                model: model_id.to_string(),
                reason: alert,
            });
        }

        info!(blue = %blue.id(), "previous deployment re-confirmed active");

        if timed_out {
            Err(OrchestratorError::Timeout("rollback cutover"))
        } else {
            Err(OrchestratorError::Provisioning(reason))
        }
    }

    /// Change the replica count of an active deployment.
    ///
    /// Only legal from `Active`; in particular a deployment that is still
    /// `Deploying` cannot be scaled.
    pub async fn scale(
        &self,
        deployment_id: &DeploymentId,
        replicas: u32,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        let record = self
            .store
            .get(deployment_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(deployment_id.to_string()))?;

        let lease = LeaseGuard::acquire(
            Arc::clone(&self.store),
            record.data.model_id.clone(),
            self.instance.clone(),
            self.lease_ttl(),
        )
        .await?;

        let result = self.scale_locked(deployment_id, replicas, cancel).await;
        lease.release().await;
        result
    }

    async fn scale_locked(
        &self,
        deployment_id: &DeploymentId,
        replicas: u32,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<DeploymentRecord> {
        let record = self
            .store
            .get(deployment_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(deployment_id.to_string()))?;
        let active = AnyDeployment::from_persisted(record.data, record.state).try_into_active()?;

        let bounds = active.data().spec.scaling;
        if replicas < bounds.min_replicas || replicas > bounds.max_replicas {
            return Err(OrchestratorError::validation(format!(
                "replica count {replicas} outside bounds [{}, {}]",
                bounds.min_replicas, bounds.max_replicas
            )));
        }

        let handle = InfraHandle {
            id: active.data().infra_handle.clone().ok_or_else(|| {
                OrchestratorError::internal(format!(
                    "active deployment {deployment_id} has no handle"
                ))
            })?,
            endpoint: active.data().endpoint.clone().unwrap_or_default(),
        };

        self.provisioner
            .apply_scaling(&handle, replicas, cancel)
            .await
            .map_err(|e| OrchestratorError::Provisioning(e.to_string()))?;

        let mut data = active.into_data();
        data.spec.replicas = replicas;
        data.updated_at = Utc::now();

        let updated = DeploymentRecord {
            data,
            state: DeployState::Active,
        };
        self.store.save(&updated, DeployState::Active).await?;

        info!(deployment_id = %deployment_id, replicas, "deployment scaled");

        Ok(updated)
    }

    /// Tear down a deployment.
    ///
    /// Legal from `Active` or `Failed`. Idempotent: undeploying an
    /// already-`Undeployed` record is a no-op success.
    pub async fn undeploy(
        &self,
        deployment_id: &DeploymentId,
    ) -> OrchestratorResult<DeploymentRecord> {
        let record = self
            .store
            .get(deployment_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(deployment_id.to_string()))?;

        if record.state == DeployState::Undeployed {
            return Ok(record);
        }

        let lease = LeaseGuard::acquire(
            Arc::clone(&self.store),
            record.data.model_id.clone(),
            self.instance.clone(),
            self.lease_ttl(),
        )
        .await?;

        let result = self.undeploy_locked(deployment_id).await;
        lease.release().await;
        result
    }

    async fn undeploy_locked(
        &self,
        deployment_id: &DeploymentId,
    ) -> OrchestratorResult<DeploymentRecord> {
        let record = self
            .store
            .get(deployment_id)
            .await?
            .ok_or_else(|| OrchestratorError::DeploymentNotFound(deployment_id.to_string()))?;

        let previous_state = record.state;
        let (data, handle) = match AnyDeployment::from_persisted(record.data, record.state) {
            AnyDeployment::Active(active) => {
                let handle = active.data().infra_handle.clone().map(|id| InfraHandle {
                    id,
                    endpoint: active.data().endpoint.clone().unwrap_or_default(),
                });
                (active.undeploy().into_data(), handle)
            }
            AnyDeployment::Failed(failed) => {
                let handle = failed.data().infra_handle.clone().map(|id| InfraHandle {
                    id,
                    endpoint: failed.data().endpoint.clone().unwrap_or_default(),
                });
                (failed.undeploy().into_data(), handle)
            }
            AnyDeployment::Undeployed(undeployed) => {
                // Raced with another undeploy; still a success.
                return Ok(DeploymentRecord {
                    data: undeployed.into_data(),
                    state: DeployState::Undeployed,
                });
            }
            other => {
                return Err(OrchestratorError::InvalidStateTransition {
                    from: other.state().as_str(),
                    to: "undeployed",
                });
            }
        };

        if let Some(ref handle) = handle {
            if let Err(e) = self.provisioner.teardown(handle).await {
                warn!(handle = %handle.id, error = %e, "teardown failed during undeploy");
            }
        }

        let updated = DeploymentRecord {
            data,
            state: DeployState::Undeployed,
        };
        self.store.save(&updated, previous_state).await?;

        info!(deployment_id = %deployment_id, "deployment undeployed");

        Ok(updated)
    }

    /// Get a deployment record.
    pub async fn get(
        &self,
        deployment_id: &DeploymentId,
    ) -> OrchestratorResult<Option<DeploymentRecord>> {
        self.store.get(deployment_id).await
    }

    /// The active deployment for a model/environment, if exactly one exists.
    pub async fn active_deployment(
        &self,
        model_id: &ModelId,
        environment: &str,
    ) -> OrchestratorResult<Option<DeploymentRecord>> {
        let mut active = self.store.list_active(model_id, environment).await?;
        let first = active.drain(..).next();
        Ok(first)
    }
}

impl std::fmt::Debug for DeploymentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentManager")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
