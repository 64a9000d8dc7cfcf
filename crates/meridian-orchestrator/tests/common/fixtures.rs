//! Test fixtures for orchestrator integration tests.

use chrono::{DateTime, Utc};
use meridian_core::{ModelId, VersionId};
use meridian_events::assessment::SignalScores;
use meridian_events::{DriftAssessment, Event, Severity};
use meridian_orchestrator::types::DeploymentSpec;
use meridian_orchestrator::DeployRequest;

/// Builder for creating test deployment requests.
pub struct DeployRequestBuilder {
    model_id: ModelId,
    version_id: VersionId,
    environment: String,
    spec: DeploymentSpec,
    force: bool,
}

impl DeployRequestBuilder {
    /// Creates a builder for the given model and version.
    pub fn new(model: &str, version: &str) -> Self {
        Self {
            model_id: ModelId::new(model),
            version_id: VersionId::new(version),
            environment: "production".to_string(),
            spec: DeploymentSpec::default(),
            force: false,
        }
    }

    /// Sets the target environment.
    pub fn environment(mut self, environment: &str) -> Self {
        self.environment = environment.to_string();
        self
    }

    /// Sets the replica count.
    pub fn replicas(mut self, replicas: u32) -> Self {
        self.spec.replicas = replicas;
        self
    }

    /// Enables the force flag.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Builds the request.
    pub fn build(self) -> DeployRequest {
        DeployRequest {
            model_id: self.model_id,
            version_id: self.version_id,
            environment: self.environment,
            spec: self.spec,
            force: self.force,
        }
    }
}

/// Creates a drift assessment with the given overall score and severity.
pub fn assessment(model: &str, overall_score: f64, severity: Severity) -> DriftAssessment {
    assessment_at(model, overall_score, severity, Utc::now())
}

/// Creates a drift assessment with an explicit timestamp.
pub fn assessment_at(
    model: &str,
    overall_score: f64,
    severity: Severity,
    timestamp: DateTime<Utc>,
) -> DriftAssessment {
    DriftAssessment {
        model_id: ModelId::new(model),
        timestamp,
        signals: SignalScores {
            feature_drift: overall_score,
            label_drift: overall_score,
            concept_drift: overall_score,
            data_quality_drift: overall_score,
        },
        overall_score,
        severity,
        sample_count: 500,
    }
}

/// Wraps an assessment in its drift-detected event.
pub fn drift_event(assessment: DriftAssessment) -> Event {
    Event::DriftDetected {
        model_id: assessment.model_id.clone(),
        timestamp: assessment.timestamp,
        assessment,
    }
}
