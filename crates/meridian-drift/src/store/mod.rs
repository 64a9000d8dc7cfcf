//! Persistence backends for drift data.
//!
//! The scoring engine reads observations and baselines written by external
//! producers, and appends its own assessments. PostgreSQL is the production
//! backend; an in-memory implementation backs the tests.

mod memory;
mod postgres;

pub use memory::MemoryDriftStore;
pub use postgres::PostgresDriftStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use meridian_events::DriftAssessment;

use crate::baseline::ReferenceBaseline;
use crate::error::DriftResult;
use crate::observation::{Observation, PerformanceSample};

/// Backend for storing drift observations, baselines, and assessments.
#[async_trait]
pub trait DriftStore: Send + Sync {
    /// Append a production observation.
    ///
    /// Called by the external prediction-recording path.
    async fn append_observation(&self, observation: &Observation) -> DriftResult<()>;

    /// Get up to `limit` most recent observations for a model, newest first.
    async fn recent_observations(
        &self,
        model_id: &ModelId,
        limit: usize,
    ) -> DriftResult<Vec<Observation>>;

    /// Get the reference baseline for a model, if one has been captured.
    async fn get_baseline(&self, model_id: &ModelId) -> DriftResult<Option<ReferenceBaseline>>;

    /// Store (or replace) the reference baseline for a model.
    ///
    /// Called by the training pipeline when a version is promoted.
    async fn put_baseline(&self, baseline: &ReferenceBaseline) -> DriftResult<()>;

    /// Append an assessment. Assessments are immutable once written.
    ///
    /// A late-arriving assessment with an older timestamp than the latest
    /// stored one must still be persisted.
    async fn append_assessment(&self, assessment: &DriftAssessment) -> DriftResult<()>;

    /// Get the most recent assessment (by timestamp) for a model.
    async fn latest_assessment(&self, model_id: &ModelId)
        -> DriftResult<Option<DriftAssessment>>;

    /// Append a performance sample to the model's metric time series.
    async fn append_sample(&self, sample: &PerformanceSample) -> DriftResult<()>;

    /// Get all samples recorded at or after `since`, oldest first.
    async fn samples_since(
        &self,
        model_id: &ModelId,
        since: DateTime<Utc>,
    ) -> DriftResult<Vec<PerformanceSample>>;

    /// List the models that have a stored baseline.
    ///
    /// This is the monitor's work list: a model without a baseline cannot be
    /// assessed.
    async fn list_baseline_models(&self) -> DriftResult<Vec<ModelId>>;
}
