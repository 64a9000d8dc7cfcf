//! Core types for the deployment orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use meridian_core::{DeploymentId, ModelId, VersionId};
use serde::{Deserialize, Serialize};

/// Resource limits for one serving replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU limit in millicores.
    #[serde(default = "default_cpu_millicores")]
    pub cpu_millicores: u32,
    /// Memory limit in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
}

const fn default_cpu_millicores() -> u32 {
    1000
}

const fn default_memory_mb() -> u32 {
    512
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_millicores: default_cpu_millicores(),
            memory_mb: default_memory_mb(),
        }
    }
}

/// Health check parameters for a serving instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Path probed on the serving endpoint.
    #[serde(default = "default_health_path")]
    pub path: String,
    /// Seconds between probes.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failures before the instance is considered unhealthy.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_health_path() -> String {
    "/healthz".to_owned()
}

const fn default_health_interval_secs() -> u64 {
    10
}

const fn default_health_timeout_secs() -> u64 {
    5
}

const fn default_failure_threshold() -> u32 {
    3
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            interval_secs: default_health_interval_secs(),
            timeout_secs: default_health_timeout_secs(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Replica bounds for scaling operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingBounds {
    /// Minimum replica count.
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    /// Maximum replica count.
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
}

const fn default_min_replicas() -> u32 {
    1
}

const fn default_max_replicas() -> u32 {
    10
}

impl Default for ScalingBounds {
    fn default() -> Self {
        Self {
            min_replicas: default_min_replicas(),
            max_replicas: default_max_replicas(),
        }
    }
}

/// Immutable configuration snapshot for one deployment.
///
/// Copied from the request at creation time; never live-reloaded. A
/// rollback carries the current deployment's snapshot onto the new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Desired replica count.
    #[serde(default = "default_min_replicas")]
    pub replicas: u32,
    /// Per-replica resource limits.
    #[serde(default)]
    pub resources: ResourceLimits,
    /// Health check parameters.
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    /// Scaling bounds.
    #[serde(default)]
    pub scaling: ScalingBounds,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            replicas: default_min_replicas(),
            resources: ResourceLimits::default(),
            health_check: HealthCheckSpec::default(),
            scaling: ScalingBounds::default(),
        }
    }
}

/// Persisted deployment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Record created, provisioning not started.
    Pending,
    /// Infrastructure provisioning in progress.
    Deploying,
    /// Serving production traffic.
    Active,
    /// Provisioning or cutover failed.
    Failed,
    /// Left service because an automated rollback moved traffic away.
    RolledBack,
    /// Explicitly torn down.
    Undeployed,
    /// Left service because a newer deployment took over its traffic.
    Inactive,
}

impl DeployState {
    /// Get the state name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Undeployed => "undeployed",
            Self::Inactive => "inactive",
        }
    }

    /// Whether this state admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RolledBack | Self::Undeployed | Self::Inactive)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeployState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "deploying" => Ok(Self::Deploying),
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            "undeployed" => Ok(Self::Undeployed),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("unknown deployment state: {s}")),
        }
    }
}

/// Common data shared across all deployment states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentData {
    /// Unique deployment identifier.
    pub id: DeploymentId,
    /// Model being served.
    pub model_id: ModelId,
    /// Version being served.
    pub version_id: VersionId,
    /// Environment name (e.g., "production", "staging").
    pub environment: String,
    /// Immutable configuration snapshot.
    pub spec: DeploymentSpec,
    /// Serving endpoint, assigned once provisioning succeeds. Stable across
    /// a rollback: traffic moves, the address does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Provisioner handle for the backing infrastructure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra_handle: Option<String>,
    /// Whether this record was created by a rollback cutover.
    #[serde(default)]
    pub is_rollback: bool,
    /// The deployment this record was rolled back from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_from: Option<DeploymentId>,
    /// The deployment that took over this record's traffic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<DeploymentId>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When provisioning completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
    /// When the deployment began serving traffic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    /// When a rollback moved traffic off this deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// When the deployment was torn down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undeployed_at: Option<DateTime<Utc>>,
    /// First error encountered; set only in `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl DeploymentData {
    /// Create new deployment data with a generated ID.
    #[must_use]
    pub fn new(
        model_id: ModelId,
        version_id: VersionId,
        environment: String,
        spec: DeploymentSpec,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            model_id,
            version_id,
            environment,
            spec,
            endpoint: None,
            infra_handle: None,
            is_rollback: false,
            rollback_from: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
            deployed_at: None,
            activated_at: None,
            rolled_back_at: None,
            undeployed_at: None,
            failure_reason: None,
        }
    }

    /// Derive the green-side record for a rollback of this deployment.
    ///
    /// Carries this deployment's spec and environment, targets the given
    /// version, and links back through `rollback_from`.
    #[must_use]
    pub fn rollback_successor(&self, target_version: VersionId) -> Self {
        let mut data = Self::new(
            self.model_id.clone(),
            target_version,
            self.environment.clone(),
            self.spec.clone(),
        );
        data.is_rollback = true;
        data.rollback_from = Some(self.id.clone());
        data
    }
}

/// A deployment record as stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// The deployment data.
    #[serde(flatten)]
    pub data: DeploymentData,
    /// Current state.
    pub state: DeployState,
}

impl DeploymentRecord {
    /// Create a new deployment record in the pending state.
    #[must_use]
    pub const fn new(data: DeploymentData) -> Self {
        Self {
            data,
            state: DeployState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_string_roundtrip() {
        for state in [
            DeployState::Pending,
            DeployState::Deploying,
            DeployState::Active,
            DeployState::Failed,
            DeployState::RolledBack,
            DeployState::Undeployed,
            DeployState::Inactive,
        ] {
            let parsed: DeployState = state.as_str().parse().expect("parse failed");
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(DeployState::Inactive.is_terminal());
        assert!(DeployState::Undeployed.is_terminal());
        assert!(DeployState::RolledBack.is_terminal());
        assert!(!DeployState::Active.is_terminal());
        assert!(!DeployState::Failed.is_terminal());
    }

    #[test]
    fn rollback_successor_links_and_copies_spec() {
        let mut spec = DeploymentSpec::default();
        spec.replicas = 4;

        let blue = DeploymentData::new(
            ModelId::new("fraud"),
            VersionId::new("v2"),
            "production".to_owned(),
            spec.clone(),
        );

        let green = blue.rollback_successor(VersionId::new("v1"));
        assert!(green.is_rollback);
        assert_eq!(green.rollback_from.as_ref(), Some(&blue.id));
        assert_eq!(green.spec, spec);
        assert_eq!(green.environment, "production");
        assert_eq!(green.version_id, VersionId::new("v1"));
        assert_ne!(green.id, blue.id);
    }
}
