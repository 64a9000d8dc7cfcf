//! Configuration for the orchestrator service.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use meridian_drift::DriftConfig;
use serde::Deserialize;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Top-level configuration for the orchestrator service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrchestratorConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Infrastructure provisioner configuration.
    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    /// Deployment behaviour configuration.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Remediation policy configuration.
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Drift scoring configuration.
    #[serde(default)]
    pub drift: DriftConfig,

    /// Event bus configuration.
    #[serde(default)]
    pub events: EventBusConfig,
}

impl OrchestratorConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `meridian.toml` in the current directory (if present)
    /// 3. Environment variables with `MERIDIAN_` prefix
    pub fn load() -> OrchestratorResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file("meridian.toml"))
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        config
            .drift
            .validate()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> OrchestratorResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        config
            .drift
            .validate()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/meridian".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Infrastructure provisioner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    /// Type of provisioner to use.
    #[serde(default)]
    pub provisioner_type: ProvisionerType,

    /// Base URL of the external infrastructure API.
    #[serde(default = "default_provisioner_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_provisioner_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provisioner_url() -> String {
    "http://localhost:8090".to_owned()
}

const fn default_provisioner_timeout_secs() -> u64 {
    30
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            provisioner_type: ProvisionerType::default(),
            url: default_provisioner_url(),
            request_timeout_secs: default_provisioner_timeout_secs(),
        }
    }
}

/// Type of infrastructure provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerType {
    /// HTTP client against an external infrastructure API.
    #[default]
    Http,

    /// Mock provisioner for testing.
    Mock,
}

/// Deployment behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Timeout for infrastructure creation in seconds.
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,

    /// Timeout for the rollback green health check in seconds.
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,

    /// TTL of the per-model deployment lease in seconds.
    ///
    /// Long enough to cover a full provisioning cycle; a crashed holder's
    /// lease becomes claimable after this.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

const fn default_provision_timeout_secs() -> u64 {
    300
}

const fn default_health_check_timeout_secs() -> u64 {
    30
}

const fn default_lease_ttl_secs() -> u64 {
    600
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            provision_timeout_secs: default_provision_timeout_secs(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

/// Remediation policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationConfig {
    /// Whether Critical severity may trigger an automatic rollback.
    #[serde(default = "default_auto_rollback")]
    pub auto_rollback: bool,

    /// Seconds after a triggered rollback during which further Critical
    /// assessments for the same model are suppressed.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Maximum remembered event keys for duplicate suppression.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

const fn default_auto_rollback() -> bool {
    true
}

const fn default_cooldown_secs() -> u64 {
    600
}

const fn default_dedup_capacity() -> usize {
    4096
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            auto_rollback: default_auto_rollback(),
            cooldown_secs: default_cooldown_secs(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBusConfig {
    /// Per-subscriber buffer capacity for the in-process bus.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

const fn default_bus_capacity() -> usize {
    1024
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.provisioner.provisioner_type, ProvisionerType::Http);
        assert_eq!(config.deployment.provision_timeout_secs, 300);
        assert!(config.remediation.auto_rollback);
        config.drift.validate().expect("drift defaults must validate");
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [database]
            url = "postgres://user:pass@db:5432/meridian"

            [provisioner]
            provisioner_type = "mock"
            url = "http://infra.internal:8090"

            [deployment]
            provision_timeout_secs = 120
            lease_ttl_secs = 300

            [remediation]
            auto_rollback = false
            cooldown_secs = 900
        "#;

        let config: OrchestratorConfig = toml::from_str(toml).expect("parse toml");
        assert_eq!(config.database.url, "postgres://user:pass@db:5432/meridian");
        assert_eq!(config.provisioner.provisioner_type, ProvisionerType::Mock);
        assert_eq!(config.deployment.provision_timeout_secs, 120);
        assert!(!config.remediation.auto_rollback);
        assert_eq!(config.remediation.cooldown_secs, 900);
    }
}
