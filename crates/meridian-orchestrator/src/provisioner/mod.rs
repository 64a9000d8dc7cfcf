//! Serving infrastructure provisioner.
//!
//! The orchestrator never assumes a specific platform: all capacity
//! management goes through the [`Provisioner`] trait. The production
//! implementation fronts an external infrastructure API over HTTP; the
//! scriptable mock backs the tests.

mod http;

pub use http::HttpProvisioner;

use std::time::Duration;

use async_trait::async_trait;
use meridian_core::{DeploymentId, ModelId, VersionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::types::DeploymentSpec;

/// Handle to provisioned serving capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraHandle {
    /// Provisioner-assigned identifier.
    pub id: String,
    /// Endpoint the capacity serves on.
    pub endpoint: String,
}

/// Result of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the instance answered its probe successfully.
    pub healthy: bool,
    /// Probe round-trip latency in milliseconds.
    pub latency_ms: u64,
}

/// Request to create serving capacity for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSpec {
    /// Deployment this capacity belongs to.
    pub deployment_id: DeploymentId,
    /// Model to serve.
    pub model_id: ModelId,
    /// Version whose artifact to place.
    pub version_id: VersionId,
    /// Environment name.
    pub environment: String,
    /// Replica count, resources, health-check parameters.
    pub spec: DeploymentSpec,
}

/// The ordered steps performed by infrastructure creation.
///
/// Creation runs them in this order and reports the first one that fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    /// Creating compute capacity.
    Infrastructure,
    /// Placing the model artifact onto the capacity.
    ArtifactPlacement,
    /// Configuring the serving runtime.
    ServingConfig,
    /// Wiring monitoring for the new instance.
    MonitoringWiring,
}

impl ProvisionStep {
    /// Step name for failure reasons.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure creation",
            Self::ArtifactPlacement => "artifact placement",
            Self::ServingConfig => "serving configuration",
            Self::MonitoringWiring => "monitoring wiring",
        }
    }
}

/// A provisioning failure.
///
/// `partial` carries the handle of any capacity created before the failing
/// step, so the caller can tear it down rather than orphan it.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {reason}", step = step.as_str())]
pub struct ProvisionError {
    /// The step that failed.
    pub step: ProvisionStep,
    /// What went wrong.
    pub reason: String,
    /// Capacity created before the failure, if any.
    pub partial: Option<InfraHandle>,
    /// Whether the failure was a cancellation or deadline expiry.
    pub timed_out: bool,
}

impl ProvisionError {
    /// Create a failure for a step, with no partial capacity.
    #[must_use]
    pub fn new(step: ProvisionStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
            partial: None,
            timed_out: false,
        }
    }

    /// Attach partially created capacity.
    #[must_use]
    pub fn with_partial(mut self, handle: InfraHandle) -> Self {
        self.partial = Some(handle);
        self
    }

    /// Mark this failure as a timeout/cancellation.
    #[must_use]
    pub const fn timed_out(mut self) -> Self {
        self.timed_out = true;
        self
    }
}

/// Result type for provisioner operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// External capability that creates and destroys serving capacity.
///
/// All operations take a cancellation token; implementations must observe it
/// and also bound their own I/O with the configured request timeout.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create serving capacity: infrastructure, artifact, serving config,
    /// monitoring, in that order.
    ///
    /// On failure, any partially created capacity is reported through
    /// [`ProvisionError::partial`] for the caller to tear down.
    async fn create_infrastructure(
        &self,
        spec: &ProvisionSpec,
        cancel: &CancellationToken,
    ) -> ProvisionResult<InfraHandle>;

    /// Atomically move the serving endpoint from one handle to another.
    async fn switch_traffic(
        &self,
        from: &InfraHandle,
        to: &InfraHandle,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()>;

    /// Probe an instance's health.
    async fn health_check(
        &self,
        handle: &InfraHandle,
        cancel: &CancellationToken,
    ) -> ProvisionResult<HealthReport>;

    /// Destroy serving capacity. Best-effort idempotent.
    async fn teardown(&self, handle: &InfraHandle) -> ProvisionResult<()>;

    /// Change the replica count for a handle.
    async fn apply_scaling(
        &self,
        handle: &InfraHandle,
        replicas: u32,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()>;
}

/// Scriptable provisioner for testing.
///
/// Failure points are configured up front; calls are recorded for
/// assertions.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    inner: Mutex<MockState>,
    scripted_create_failure: Mutex<Option<ProvisionStep>>,
    unhealthy: std::sync::atomic::AtomicBool,
    switch_fails: std::sync::atomic::AtomicBool,
    health_delay: Mutex<Option<Duration>>,
}

#[derive(Debug, Default)]
struct MockState {
    counter: u64,
    created: Vec<InfraHandle>,
    torn_down: Vec<String>,
    switched: Vec<(String, String)>,
    scaled: Vec<(String, u32)>,
}

impl MockProvisioner {
    /// Create a mock with no scripted failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `create_infrastructure` to fail at the given step.
    pub fn fail_create_at(&self, step: ProvisionStep) {
        *self.scripted_create_failure.lock() = Some(step);
    }

    /// Script health checks to report unhealthy.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy
            .store(unhealthy, std::sync::atomic::Ordering::SeqCst);
    }

    /// Script `switch_traffic` to fail.
    pub fn set_fail_switch(&self, fail: bool) {
        self.switch_fails
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Delay health check responses (for timeout tests).
    pub fn set_health_delay(&self, delay: Duration) {
        *self.health_delay.lock() = Some(delay);
    }

    /// Handles created so far.
    #[must_use]
    pub fn created(&self) -> Vec<InfraHandle> {
        self.inner.lock().created.clone()
    }

    /// Handle ids torn down so far.
    #[must_use]
    pub fn torn_down(&self) -> Vec<String> {
        self.inner.lock().torn_down.clone()
    }

    /// Traffic switches performed so far, as (from, to) handle ids.
    #[must_use]
    pub fn switched(&self) -> Vec<(String, String)> {
        self.inner.lock().switched.clone()
    }

    /// Scaling calls performed so far.
    #[must_use]
    pub fn scaled(&self) -> Vec<(String, u32)> {
        self.inner.lock().scaled.clone()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn create_infrastructure(
        &self,
        spec: &ProvisionSpec,
        cancel: &CancellationToken,
    ) -> ProvisionResult<InfraHandle> {
        if cancel.is_cancelled() {
            return Err(
                ProvisionError::new(ProvisionStep::Infrastructure, "cancelled").timed_out(),
            );
        }

        let fail_at = *self.scripted_create_failure.lock();

        if fail_at == Some(ProvisionStep::Infrastructure) {
            return Err(ProvisionError::new(
                ProvisionStep::Infrastructure,
                "scripted failure",
            ));
        }

        let handle = {
            let mut state = self.inner.lock();
            state.counter += 1;
            let handle = InfraHandle {
                id: format!("{}-infra-{}", spec.model_id, state.counter),
                endpoint: format!("http://10.0.0.{}:9000", state.counter),
            };
            state.created.push(handle.clone());
            handle
        };

        // Later steps fail with the infrastructure already created.
        for step in [
            ProvisionStep::ArtifactPlacement,
            ProvisionStep::ServingConfig,
            ProvisionStep::MonitoringWiring,
        ] {
            if fail_at == Some(step) {
                return Err(
                    ProvisionError::new(step, "scripted failure").with_partial(handle.clone()),
                );
            }
        }

        Ok(handle)
    }

    async fn switch_traffic(
        &self,
        from: &InfraHandle,
        to: &InfraHandle,
        _cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        if self.switch_fails.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ProvisionError::new(
                ProvisionStep::ServingConfig,
                "scripted switch failure",
            ));
        }

        self.inner
            .lock()
            .switched
            .push((from.id.clone(), to.id.clone()));
        Ok(())
    }

    async fn health_check(
        &self,
        _handle: &InfraHandle,
        cancel: &CancellationToken,
    ) -> ProvisionResult<HealthReport> {
        let delay = *self.health_delay.lock();
        if let Some(delay) = delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    return Err(
                        ProvisionError::new(ProvisionStep::ServingConfig, "cancelled")
                            .timed_out(),
                    );
                }
            }
        }

        Ok(HealthReport {
            healthy: !self.unhealthy.load(std::sync::atomic::Ordering::SeqCst),
            latency_ms: 5,
        })
    }

    async fn teardown(&self, handle: &InfraHandle) -> ProvisionResult<()> {
        self.inner
            .lock()
            .torn_down
            .push(handle.id.clone());
        Ok(())
    }

    async fn apply_scaling(
        &self,
        handle: &InfraHandle,
        replicas: u32,
        _cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        self.inner
            .lock()
            .scaled
            .push((handle.id.clone(), replicas));
        Ok(())
    }
}
