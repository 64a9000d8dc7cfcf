//! Drift assessment payload types.
//!
//! These types ride on the event bus, so they live here rather than in the
//! scoring engine: the orchestrator consumes them without depending on how
//! the scores were produced.

use std::fmt;

use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use serde::{Deserialize, Serialize};

/// Discrete severity band derived from the overall drift score.
///
/// Ordering matters: `None < Low < Medium < High < Critical`, so policy code
/// can compare bands directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No detectable drift.
    #[default]
    None,
    /// Drift present but well within tolerance.
    Low,
    /// Drift worth surfacing to operators.
    Medium,
    /// Drift that warrants retraining.
    High,
    /// Drift severe enough to trigger automatic rollback.
    Critical,
}

impl Severity {
    /// Get the severity name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four per-signal drift scores, each clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SignalScores {
    /// Shift of production feature distributions against the baseline.
    pub feature_drift: f64,
    /// Shift of the prediction (label) distribution against the baseline.
    pub label_drift: f64,
    /// Rolling-performance delta against the validation baseline.
    pub concept_drift: f64,
    /// Rule-based completeness and schema checks on incoming data.
    pub data_quality_drift: f64,
}

impl SignalScores {
    /// Combine the signals into an overall score using the given weights.
    ///
    /// Weights are expected to sum to 1.0 (validated at configuration load),
    /// which keeps the result in `[0, 1]` when each signal is.
    #[must_use]
    pub fn weighted_overall(&self, weights: &SignalWeights) -> f64 {
        let overall = self.feature_drift * weights.feature
            + self.label_drift * weights.label
            + self.concept_drift * weights.concept
            + self.data_quality_drift * weights.quality;
        overall.clamp(0.0, 1.0)
    }
}

/// Weights for combining the four signals into one score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    /// Weight of the feature drift signal.
    pub feature: f64,
    /// Weight of the label drift signal.
    pub label: f64,
    /// Weight of the concept drift signal.
    pub concept: f64,
    /// Weight of the data quality signal.
    pub quality: f64,
}

impl SignalWeights {
    /// Sum of all four weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.feature + self.label + self.concept + self.quality
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            feature: 0.30,
            label: 0.25,
            concept: 0.30,
            quality: 0.15,
        }
    }
}

/// A point-in-time drift evaluation for one model.
///
/// Immutable once written; newer assessments supersede, never update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    /// Model this assessment covers.
    pub model_id: ModelId,
    /// When the evaluation ran.
    pub timestamp: DateTime<Utc>,
    /// The four per-signal scores.
    pub signals: SignalScores,
    /// Weighted combination of the signals, in `[0, 1]`.
    pub overall_score: f64,
    /// Severity band derived from `overall_score`.
    pub severity: Severity,
    /// Number of production observations the evaluation saw.
    pub sample_count: usize,
}
