//! Configuration for the scoring engine.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use meridian_events::assessment::SignalWeights;
use meridian_events::Severity;
use serde::Deserialize;

use crate::error::{DriftError, DriftResult};

/// Top-level configuration for drift and decay scoring.
#[derive(Debug, Clone, Deserialize)]
pub struct DriftConfig {
    /// Weights for combining the four signals. Must sum to 1.0.
    #[serde(default)]
    pub weights: SignalWeights,

    /// Ordered severity thresholds on the overall score.
    #[serde(default)]
    pub thresholds: SeverityThresholds,

    /// How many recent observations an evaluation pulls.
    #[serde(default = "default_window")]
    pub window: usize,

    /// Minimum observations required before any classification is made.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Standardised-shift magnitude that maps to a signal score of 1.0.
    #[serde(default = "default_shift_normaliser")]
    pub shift_normaliser: f64,

    /// Relative error growth that maps to a concept-drift score of 1.0.
    #[serde(default = "default_error_normaliser")]
    pub error_normaliser: f64,

    /// Performance decay scoring configuration.
    #[serde(default)]
    pub decay: DecayConfig,

    /// Seconds between evaluation cycles per model.
    #[serde(default = "default_assess_interval_secs")]
    pub assess_interval_secs: u64,
}

const fn default_window() -> usize {
    1000
}

const fn default_min_samples() -> usize {
    30
}

const fn default_shift_normaliser() -> f64 {
    4.0
}

const fn default_error_normaliser() -> f64 {
    1.0
}

const fn default_assess_interval_secs() -> u64 {
    300
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            thresholds: SeverityThresholds::default(),
            window: default_window(),
            min_samples: default_min_samples(),
            shift_normaliser: default_shift_normaliser(),
            error_normaliser: default_error_normaliser(),
            decay: DecayConfig::default(),
            assess_interval_secs: default_assess_interval_secs(),
        }
    }
}

impl DriftConfig {
    /// Load configuration from `meridian.toml` and `MERIDIAN_DRIFT_`
    /// environment variables, then validate it.
    pub fn load() -> DriftResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file("drift.toml"))
            .merge(Env::prefixed("MERIDIAN_DRIFT_").split("__"))
            .extract()
            .map_err(|e| DriftError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate weight and threshold constraints.
    ///
    /// Weights must sum to 1.0 and thresholds must be strictly descending so
    /// the severity classification is well-defined.
    pub fn validate(&self) -> DriftResult<()> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(DriftError::Config(format!(
                "signal weights must sum to 1.0, got {sum}"
            )));
        }

        let t = &self.thresholds;
        if !(t.critical > t.high && t.high > t.medium && t.medium > t.low && t.low > 0.0) {
            return Err(DriftError::Config(format!(
                "severity thresholds must be strictly descending and positive: \
                 critical={} high={} medium={} low={}",
                t.critical, t.high, t.medium, t.low
            )));
        }

        if self.min_samples == 0 || self.window < self.min_samples {
            return Err(DriftError::Config(format!(
                "window ({}) must be at least min_samples ({}) and min_samples non-zero",
                self.window, self.min_samples
            )));
        }

        Ok(())
    }
}

/// Ordered thresholds mapping an overall score to a severity band.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SeverityThresholds {
    /// Scores above this are `Critical`.
    #[serde(default = "default_critical")]
    pub critical: f64,
    /// Scores above this are `High`.
    #[serde(default = "default_high")]
    pub high: f64,
    /// Scores above this are `Medium`.
    #[serde(default = "default_medium")]
    pub medium: f64,
    /// Scores above this are `Low`.
    #[serde(default = "default_low")]
    pub low: f64,
}

const fn default_critical() -> f64 {
    0.30
}

const fn default_high() -> f64 {
    0.20
}

const fn default_medium() -> f64 {
    0.10
}

const fn default_low() -> f64 {
    0.05
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

impl SeverityThresholds {
    /// Classify an overall score into a severity band.
    ///
    /// Pure and deterministic: the same score and thresholds always yield
    /// the same band.
    #[must_use]
    pub fn classify(&self, overall_score: f64) -> Severity {
        if overall_score > self.critical {
            Severity::Critical
        } else if overall_score > self.high {
            Severity::High
        } else if overall_score > self.medium {
            Severity::Medium
        } else if overall_score > self.low {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

/// Performance decay scoring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DecayConfig {
    /// Trailing window length in days for the current aggregate.
    #[serde(default = "default_decay_window_days")]
    pub window_days: i64,

    /// Decay score above which a decay alert is published.
    #[serde(default = "default_decay_threshold")]
    pub threshold: f64,
}

const fn default_decay_window_days() -> i64 {
    7
}

const fn default_decay_threshold() -> f64 {
    0.2
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            window_days: default_decay_window_days(),
            threshold: default_decay_threshold(),
        }
    }
}
