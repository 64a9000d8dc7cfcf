//! Event types published on the control-plane bus.

use chrono::{DateTime, Utc};
use meridian_core::{DeploymentId, ModelId, VersionId};
use serde::{Deserialize, Serialize};

use crate::assessment::DriftAssessment;

/// A control-plane event.
///
/// Every variant carries the model it concerns and a timestamp; together
/// with the topic these form the idempotency key consumers deduplicate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum Event {
    /// A deployment left `Pending` and began provisioning.
    #[serde(rename = "deployment.started")]
    DeploymentStarted {
        /// Model being deployed.
        model_id: ModelId,
        /// The deployment record.
        deployment_id: DeploymentId,
        /// Version being deployed.
        version_id: VersionId,
        /// Target environment.
        environment: String,
        /// When provisioning began.
        timestamp: DateTime<Utc>,
    },
    /// A deployment reached `Active`.
    #[serde(rename = "deployment.completed")]
    DeploymentCompleted {
        /// Model that was deployed.
        model_id: ModelId,
        /// The deployment record.
        deployment_id: DeploymentId,
        /// Version now serving.
        version_id: VersionId,
        /// Assigned serving endpoint.
        endpoint: String,
        /// When activation completed.
        timestamp: DateTime<Utc>,
    },
    /// A deployment moved to `Failed`.
    #[serde(rename = "deployment.failed")]
    DeploymentFailed {
        /// Model whose deployment failed.
        model_id: ModelId,
        /// The deployment record.
        deployment_id: DeploymentId,
        /// First error encountered.
        reason: String,
        /// When the failure was recorded.
        timestamp: DateTime<Utc>,
    },
    /// A blue/green cutover finished: traffic moved to the new deployment.
    #[serde(rename = "deployment.rollback.completed")]
    RollbackCompleted {
        /// Model that was rolled back.
        model_id: ModelId,
        /// The deployment that left service.
        from_deployment: DeploymentId,
        /// The deployment now serving.
        to_deployment: DeploymentId,
        /// Version now serving.
        target_version: VersionId,
        /// When the cutover completed.
        timestamp: DateTime<Utc>,
    },
    /// The scoring engine classified drift above the Medium threshold.
    #[serde(rename = "model.drift.detected")]
    DriftDetected {
        /// Model the assessment covers.
        model_id: ModelId,
        /// The full assessment.
        assessment: DriftAssessment,
        /// Assessment timestamp (duplicated for the dedup key).
        timestamp: DateTime<Utc>,
    },
    /// Severity reached High: the model should be retrained.
    #[serde(rename = "model.retrain.required")]
    RetrainRequired {
        /// Model that needs retraining.
        model_id: ModelId,
        /// Why retraining was requested.
        reason: String,
        /// When the signal was raised.
        timestamp: DateTime<Utc>,
    },
    /// A tracked metric decayed past the configured threshold.
    #[serde(rename = "model.performance.decay")]
    PerformanceDecay {
        /// Model whose performance decayed.
        model_id: ModelId,
        /// Averaged decay score across available metrics.
        decay_score: f64,
        /// When the decay was measured.
        timestamp: DateTime<Utc>,
    },
    /// An operator-attention condition that has no synchronous caller.
    ///
    /// Used for recovery failures and for Critical drift with no rollback
    /// target.
    #[serde(rename = "orchestrator.alert")]
    Alert {
        /// Model the alert concerns.
        model_id: ModelId,
        /// Human-readable description of the condition.
        message: String,
        /// When the alert was raised.
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Topic string for this event, as published on the bus.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::DeploymentStarted { .. } => "deployment.started",
            Self::DeploymentCompleted { .. } => "deployment.completed",
            Self::DeploymentFailed { .. } => "deployment.failed",
            Self::RollbackCompleted { .. } => "deployment.rollback.completed",
            Self::DriftDetected { .. } => "model.drift.detected",
            Self::RetrainRequired { .. } => "model.retrain.required",
            Self::PerformanceDecay { .. } => "model.performance.decay",
            Self::Alert { .. } => "orchestrator.alert",
        }
    }

    /// The model this event concerns.
    #[must_use]
    pub const fn model_id(&self) -> &ModelId {
        match self {
            Self::DeploymentStarted { model_id, .. }
            | Self::DeploymentCompleted { model_id, .. }
            | Self::DeploymentFailed { model_id, .. }
            | Self::RollbackCompleted { model_id, .. }
            | Self::DriftDetected { model_id, .. }
            | Self::RetrainRequired { model_id, .. }
            | Self::PerformanceDecay { model_id, .. }
            | Self::Alert { model_id, .. } => model_id,
        }
    }

    /// When this event happened.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DeploymentStarted { timestamp, .. }
            | Self::DeploymentCompleted { timestamp, .. }
            | Self::DeploymentFailed { timestamp, .. }
            | Self::RollbackCompleted { timestamp, .. }
            | Self::DriftDetected { timestamp, .. }
            | Self::RetrainRequired { timestamp, .. }
            | Self::PerformanceDecay { timestamp, .. }
            | Self::Alert { timestamp, .. } => *timestamp,
        }
    }

    /// Idempotency key under at-least-once delivery.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String, DateTime<Utc>) {
        (
            self.topic().to_owned(),
            self.model_id().to_string(),
            self.timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::DeploymentFailed {
            model_id: ModelId::new("churn"),
            deployment_id: DeploymentId::new("dep-1"),
            reason: "infrastructure creation failed".to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn topic_names_match_contract() {
        assert_eq!(sample_event().topic(), "deployment.failed");

        let decay = Event::PerformanceDecay {
            model_id: ModelId::new("churn"),
            decay_score: 0.4,
            timestamp: Utc::now(),
        };
        assert_eq!(decay.topic(), "model.performance.decay");
    }

    #[test]
    fn dedup_key_is_stable_for_identical_events() {
        let event = sample_event();
        let duplicate = event.clone();
        assert_eq!(event.dedup_key(), duplicate.dedup_key());
    }

    #[test]
    fn serde_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialise");
        let parsed: Event = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(parsed, event);
    }
}
