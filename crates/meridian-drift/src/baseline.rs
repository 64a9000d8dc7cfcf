//! Reference baselines captured at training time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use serde::{Deserialize, Serialize};

use crate::stats::RunningStats;

/// Summary statistics for one feature (or the label) distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Distribution mean.
    pub mean: f64,
    /// Distribution standard deviation.
    pub std_dev: f64,
}

impl FeatureStats {
    /// Capture statistics from a set of training-time values.
    #[must_use]
    pub fn capture(values: impl IntoIterator<Item = f64>) -> Self {
        let stats = RunningStats::from_values(values);
        Self {
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

/// The training-time reference a model's production traffic is compared to.
///
/// Written once by the training pipeline; the scoring engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBaseline {
    /// Model the baseline belongs to.
    pub model_id: ModelId,
    /// Per-feature distribution statistics, keyed by feature name.
    pub features: BTreeMap<String, FeatureStats>,
    /// Label (prediction target) distribution statistics.
    pub label: FeatureStats,
    /// Mean absolute error on the validation set, if recorded.
    pub baseline_error: Option<f64>,
    /// Baseline value per tracked performance metric, for decay scoring.
    pub metric_baselines: BTreeMap<String, f64>,
    /// When the baseline was captured.
    pub captured_at: DateTime<Utc>,
}

impl ReferenceBaseline {
    /// Feature names this baseline expects in every observation.
    pub fn expected_features(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_summarises_values() {
        let stats = FeatureStats::capture([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!(stats.std_dev > 0.0);
    }

    #[test]
    fn baseline_serde_roundtrip() {
        let mut features = BTreeMap::new();
        features.insert("amount".to_owned(), FeatureStats::capture([10.0, 20.0]));

        let baseline = ReferenceBaseline {
            model_id: ModelId::new("fraud"),
            features,
            label: FeatureStats::capture([0.0, 1.0]),
            baseline_error: Some(0.08),
            metric_baselines: BTreeMap::from([("accuracy".to_owned(), 0.93)]),
            captured_at: Utc::now(),
        };

        let json = serde_json::to_string(&baseline).expect("serialise");
        let parsed: ReferenceBaseline = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(parsed, baseline);
    }
}
