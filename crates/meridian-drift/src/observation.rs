//! Production observation and performance sample records.
//!
//! Both are produced by the external prediction-recording path and only
//! read here. Observations feed drift scoring; performance samples feed the
//! decay trend computation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use serde::{Deserialize, Serialize};

/// One recorded prediction with its input features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Model that served the prediction.
    pub model_id: ModelId,
    /// When the prediction was served.
    pub timestamp: DateTime<Utc>,
    /// Input feature values by name. `None` marks a missing value.
    pub features: BTreeMap<String, Option<f64>>,
    /// The model's output.
    pub prediction: f64,
    /// Ground-truth outcome, if it has arrived.
    pub actual: Option<f64>,
}

impl Observation {
    /// Create an observation with no ground truth yet.
    #[must_use]
    pub fn new(
        model_id: ModelId,
        timestamp: DateTime<Utc>,
        features: BTreeMap<String, Option<f64>>,
        prediction: f64,
    ) -> Self {
        Self {
            model_id,
            timestamp,
            features,
            prediction,
            actual: None,
        }
    }

    /// Attach the ground-truth outcome.
    #[must_use]
    pub const fn with_actual(mut self, actual: f64) -> Self {
        self.actual = Some(actual);
        self
    }
}

/// A single recorded metric value in a per-model time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Model the metric belongs to.
    pub model_id: ModelId,
    /// Metric name (e.g. `accuracy`, `auc`).
    pub metric: String,
    /// Recorded value.
    pub value: f64,
    /// When the value was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl PerformanceSample {
    /// Create a sample without metadata.
    #[must_use]
    pub fn new(
        model_id: ModelId,
        metric: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            model_id,
            metric: metric.into(),
            value,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }
}
