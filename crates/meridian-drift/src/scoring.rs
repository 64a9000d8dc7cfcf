//! Drift and decay score computation.
//!
//! Every signal is a normalised distance between the current observation
//! window and the stored training-time baseline, clamped to `[0, 1]`. The
//! overall score is the configured weighted sum, and severity is a pure
//! function of the overall score and the configured thresholds.

use std::sync::Arc;

use chrono::{Duration, Utc};
use meridian_core::ModelId;
use meridian_events::assessment::SignalScores;
use meridian_events::{DriftAssessment, Event, EventBus};
use tracing::{debug, info, warn};

use crate::baseline::ReferenceBaseline;
use crate::config::DriftConfig;
use crate::error::{DriftError, DriftResult};
use crate::observation::Observation;
use crate::stats::RunningStats;
use crate::store::DriftStore;

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentOutcome {
    /// Too few observations to classify. Nothing was persisted or published:
    /// absence of signal is never treated as absence of drift.
    NoData {
        /// How many observations were available.
        samples: usize,
    },
    /// A full assessment was computed and persisted.
    Scored(DriftAssessment),
}

impl AssessmentOutcome {
    /// Returns true when the evaluation could not classify.
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }

    /// The assessment, when one was produced.
    #[must_use]
    pub const fn assessment(&self) -> Option<&DriftAssessment> {
        match self {
            Self::Scored(assessment) => Some(assessment),
            Self::NoData { .. } => None,
        }
    }
}

/// Computes drift assessments and performance-decay scores.
pub struct ScoringEngine {
    store: Arc<dyn DriftStore>,
    bus: Arc<dyn EventBus>,
    config: DriftConfig,
}

impl ScoringEngine {
    /// Create a new scoring engine.
    ///
    /// The configuration must already be validated (see
    /// [`DriftConfig::validate`]).
    pub fn new(store: Arc<dyn DriftStore>, bus: Arc<dyn EventBus>, config: DriftConfig) -> Self {
        Self { store, bus, config }
    }

    /// Evaluate drift for one model.
    ///
    /// Pulls the most recent observation window and the stored baseline,
    /// computes the four signals, persists the assessment, and publishes a
    /// drift-detected event when the overall score exceeds the Medium
    /// threshold.
    pub async fn assess(&self, model_id: &ModelId) -> DriftResult<AssessmentOutcome> {
        let observations = self
            .store
            .recent_observations(model_id, self.config.window)
            .await?;

        if observations.len() < self.config.min_samples {
            debug!(
                model_id = %model_id,
                samples = observations.len(),
                min_samples = self.config.min_samples,
                "insufficient observations, skipping classification"
            );
            return Ok(AssessmentOutcome::NoData {
                samples: observations.len(),
            });
        }

        let baseline = self
            .store
            .get_baseline(model_id)
            .await?
            .ok_or_else(|| DriftError::MissingBaseline(model_id.to_string()))?;

        let signals = compute_signals(&observations, &baseline, &self.config);
        let overall_score = signals.weighted_overall(&self.config.weights);
        let severity = self.config.thresholds.classify(overall_score);

        let assessment = DriftAssessment {
            model_id: model_id.clone(),
            timestamp: Utc::now(),
            signals,
            overall_score,
            severity,
            sample_count: observations.len(),
        };

        self.store.append_assessment(&assessment).await?;

        info!(
            model_id = %model_id,
            overall_score,
            severity = %severity,
            samples = assessment.sample_count,
            "drift assessment recorded"
        );

        if overall_score > self.config.thresholds.medium {
            self.bus
                .publish(Event::DriftDetected {
                    model_id: model_id.clone(),
                    assessment: assessment.clone(),
                    timestamp: assessment.timestamp,
                })
                .await?;
        }

        Ok(AssessmentOutcome::Scored(assessment))
    }

    /// Compute the performance-decay score for one model.
    ///
    /// Compares the trailing-window mean of each tracked metric against its
    /// stored baseline value; `decay = max(0, (baseline - current) /
    /// baseline)` averaged across the metrics present in both. Returns
    /// `None` when no metric overlaps the baseline. A score above the
    /// configured threshold publishes a decay alert, independently of drift
    /// severity.
    pub async fn performance_decay(&self, model_id: &ModelId) -> DriftResult<Option<f64>> {
        let Some(baseline) = self.store.get_baseline(model_id).await? else {
            return Err(DriftError::MissingBaseline(model_id.to_string()));
        };

        if baseline.metric_baselines.is_empty() {
            return Ok(None);
        }

        let since = Utc::now() - Duration::days(self.config.decay.window_days);
        let samples = self.store.samples_since(model_id, since).await?;

        let mut per_metric: std::collections::BTreeMap<&str, RunningStats> = Default::default();
        for sample in &samples {
            per_metric
                .entry(sample.metric.as_str())
                .or_default()
                .update(sample.value);
        }

        let mut decays = Vec::new();
        for (metric, baseline_value) in &baseline.metric_baselines {
            let Some(current) = per_metric.get(metric.as_str()) else {
                continue;
            };
            if baseline_value.abs() < f64::EPSILON {
                warn!(model_id = %model_id, metric, "zero baseline value, skipping metric");
                continue;
            }
            let decay = ((baseline_value - current.mean()) / baseline_value).max(0.0);
            decays.push(decay);
        }

        if decays.is_empty() {
            return Ok(None);
        }

        #[allow(clippy::cast_precision_loss)]
        let decay_score = decays.iter().sum::<f64>() / decays.len() as f64;

        debug!(
            model_id = %model_id,
            decay_score,
            metrics = decays.len(),
            "performance decay computed"
        );

        if decay_score > self.config.decay.threshold {
            self.bus
                .publish(Event::PerformanceDecay {
                    model_id: model_id.clone(),
                    decay_score,
                    timestamp: Utc::now(),
                })
                .await?;
        }

        Ok(Some(decay_score))
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &DriftConfig {
        &self.config
    }
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Compute the four per-signal scores for an observation window.
#[must_use]
pub fn compute_signals(
    observations: &[Observation],
    baseline: &ReferenceBaseline,
    config: &DriftConfig,
) -> SignalScores {
    SignalScores {
        feature_drift: feature_drift(observations, baseline, config.shift_normaliser),
        label_drift: label_drift(observations, baseline, config.shift_normaliser),
        concept_drift: concept_drift(observations, baseline, config.error_normaliser),
        data_quality_drift: data_quality_drift(observations, baseline),
    }
}

/// Standardised mean/variance shift of one current distribution against its
/// baseline statistics, normalised into `[0, 1]`.
fn standardised_shift(current: &RunningStats, baseline_mean: f64, baseline_std: f64) -> f64 {
    let floor = baseline_std.max(1e-9);
    let mean_shift = (current.mean() - baseline_mean).abs() / floor;
    let spread_shift = (current.std_dev() - baseline_std).abs() / floor;
    0.5 * mean_shift + 0.5 * spread_shift
}

fn feature_drift(
    observations: &[Observation],
    baseline: &ReferenceBaseline,
    normaliser: f64,
) -> f64 {
    let mut scores = Vec::with_capacity(baseline.features.len());

    for (name, reference) in &baseline.features {
        let current = RunningStats::from_values(
            observations
                .iter()
                .filter_map(|obs| obs.features.get(name).copied().flatten()),
        );

        // A feature entirely absent from the window is a data-quality
        // problem, not a distribution shift.
        if current.count() < 2 {
            continue;
        }

        let shift = standardised_shift(&current, reference.mean, reference.std_dev);
        scores.push((shift / normaliser).clamp(0.0, 1.0));
    }

    if scores.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let score = scores.iter().sum::<f64>() / scores.len() as f64;
    score.clamp(0.0, 1.0)
}

fn label_drift(observations: &[Observation], baseline: &ReferenceBaseline, normaliser: f64) -> f64 {
    let current = RunningStats::from_values(observations.iter().map(|obs| obs.prediction));
    if current.count() < 2 {
        return 0.0;
    }

    let shift = standardised_shift(&current, baseline.label.mean, baseline.label.std_dev);
    (shift / normaliser).clamp(0.0, 1.0)
}

fn concept_drift(
    observations: &[Observation],
    baseline: &ReferenceBaseline,
    normaliser: f64,
) -> f64 {
    let Some(baseline_error) = baseline.baseline_error else {
        return 0.0;
    };

    let errors = RunningStats::from_values(
        observations
            .iter()
            .filter_map(|obs| obs.actual.map(|actual| (obs.prediction - actual).abs())),
    );
    if errors.count() < 2 {
        return 0.0;
    }

    let floor = baseline_error.max(1e-9);
    let relative_growth = ((errors.mean() - baseline_error) / floor).max(0.0);
    (relative_growth / normaliser).clamp(0.0, 1.0)
}

fn data_quality_drift(observations: &[Observation], baseline: &ReferenceBaseline) -> f64 {
    if observations.is_empty() || baseline.features.is_empty() {
        return 0.0;
    }

    let expected: std::collections::BTreeSet<&str> = baseline.expected_features().collect();
    let total_slots = observations.len() * expected.len();

    let mut missing = 0usize;
    let mut invalid = 0usize;
    let mut unknown = 0usize;

    for obs in observations {
        for name in &expected {
            match obs.features.get(*name) {
                Some(Some(value)) if value.is_finite() => {}
                Some(Some(_)) => invalid += 1,
                _ => missing += 1,
            }
        }
        unknown += obs
            .features
            .keys()
            .filter(|key| !expected.contains(key.as_str()))
            .count();
    }

    #[allow(clippy::cast_precision_loss)]
    let slots = total_slots as f64;
    #[allow(clippy::cast_precision_loss)]
    let missing_rate = missing as f64 / slots;
    #[allow(clippy::cast_precision_loss)]
    let invalid_rate = invalid as f64 / slots;
    #[allow(clippy::cast_precision_loss)]
    let unknown_rate = (unknown as f64 / slots).min(1.0);

    ((missing_rate + invalid_rate + unknown_rate) / 3.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::FeatureStats;
    use crate::store::MemoryDriftStore;
    use crate::PerformanceSample;
    use meridian_events::{InMemoryEventBus, Severity};
    use std::collections::BTreeMap;

    fn model() -> ModelId {
        ModelId::new("fraud")
    }

    fn baseline() -> ReferenceBaseline {
        ReferenceBaseline {
            model_id: model(),
            features: BTreeMap::from([(
                "amount".to_owned(),
                FeatureStats {
                    mean: 100.0,
                    std_dev: 10.0,
                },
            )]),
            label: FeatureStats {
                mean: 0.5,
                std_dev: 0.1,
            },
            baseline_error: Some(0.1),
            metric_baselines: BTreeMap::from([("accuracy".to_owned(), 0.9)]),
            captured_at: Utc::now(),
        }
    }

    fn observations_like_baseline(count: usize) -> Vec<Observation> {
        (0..count)
            .map(|i| {
                // Alternate around the baseline mean so mean and spread match.
                let offset = if i % 2 == 0 { 10.0 } else { -10.0 };
                Observation::new(
                    model(),
                    Utc::now(),
                    BTreeMap::from([("amount".to_owned(), Some(100.0 + offset))]),
                    if i % 2 == 0 { 0.6 } else { 0.4 },
                )
                .with_actual(if i % 2 == 0 { 0.55 } else { 0.45 })
            })
            .collect()
    }

    fn observations_shifted(count: usize) -> Vec<Observation> {
        (0..count)
            .map(|i| {
                let offset = if i % 2 == 0 { 10.0 } else { -10.0 };
                Observation::new(
                    model(),
                    Utc::now(),
                    BTreeMap::from([("amount".to_owned(), Some(200.0 + offset))]),
                    if i % 2 == 0 { 0.95 } else { 0.9 },
                )
                .with_actual(0.1)
            })
            .collect()
    }

    async fn engine_with(
        observations: Vec<Observation>,
    ) -> (ScoringEngine, Arc<InMemoryEventBus>) {
        let store = Arc::new(MemoryDriftStore::new());
        store.put_baseline(&baseline()).await.expect("put baseline");
        for obs in &observations {
            store.append_observation(obs).await.expect("append");
        }

        let bus = Arc::new(InMemoryEventBus::default());
        let engine = ScoringEngine::new(store, bus.clone(), DriftConfig::default());
        (engine, bus)
    }

    #[tokio::test]
    async fn stable_window_scores_low() {
        let (engine, _bus) = engine_with(observations_like_baseline(100)).await;

        let outcome = engine.assess(&model()).await.expect("assess failed");
        let assessment = outcome.assessment().expect("expected a scored outcome");

        assert!(assessment.overall_score < 0.05);
        assert_eq!(assessment.severity, Severity::None);
    }

    #[tokio::test]
    async fn shifted_window_scores_high_and_publishes() {
        let (engine, bus) = engine_with(observations_shifted(100)).await;
        let mut rx = bus.subscribe();

        let outcome = engine.assess(&model()).await.expect("assess failed");
        let assessment = outcome.assessment().expect("expected a scored outcome");

        assert!(assessment.overall_score > 0.3);
        assert_eq!(assessment.severity, Severity::Critical);

        let event = rx.try_recv().expect("drift event expected");
        assert_eq!(event.topic(), "model.drift.detected");
    }

    #[tokio::test]
    async fn below_min_samples_returns_no_data_and_publishes_nothing() {
        let store = Arc::new(MemoryDriftStore::new());
        store.put_baseline(&baseline()).await.expect("put baseline");
        for obs in observations_shifted(29) {
            store.append_observation(&obs).await.expect("append");
        }

        let bus = Arc::new(InMemoryEventBus::default());
        let mut rx = bus.subscribe();
        let engine = ScoringEngine::new(store.clone(), bus, DriftConfig::default());

        let outcome = engine.assess(&model()).await.expect("assess failed");
        assert_eq!(outcome, AssessmentOutcome::NoData { samples: 29 });

        assert!(rx.try_recv().is_err(), "no event may be published");

        // Nothing persisted either.
        let latest = store
            .latest_assessment(&model())
            .await
            .expect("query failed");
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn missing_baseline_is_an_error() {
        let store = Arc::new(MemoryDriftStore::new());
        for obs in observations_like_baseline(50) {
            store.append_observation(&obs).await.expect("append");
        }
        let bus = Arc::new(InMemoryEventBus::default());
        let engine = ScoringEngine::new(store, bus, DriftConfig::default());

        let result = engine.assess(&model()).await;
        assert!(matches!(result, Err(DriftError::MissingBaseline(_))));
    }

    #[tokio::test]
    async fn overall_score_stays_in_unit_interval() {
        // Extreme shift: scores should clamp, not overflow the interval.
        let observations: Vec<_> = (0..60)
            .map(|i| {
                Observation::new(
                    model(),
                    Utc::now(),
                    BTreeMap::from([("amount".to_owned(), Some(1e9 + f64::from(i)))]),
                    1e6,
                )
                .with_actual(-1e6)
            })
            .collect();

        let (engine, _bus) = engine_with(observations).await;
        let outcome = engine.assess(&model()).await.expect("assess failed");
        let assessment = outcome.assessment().expect("scored");

        assert!((0.0..=1.0).contains(&assessment.overall_score));
        assert_eq!(assessment.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn quality_signal_counts_missing_and_unknown() {
        let observations: Vec<_> = (0..50)
            .map(|i| {
                let features = if i % 2 == 0 {
                    // Missing the expected feature entirely.
                    BTreeMap::from([("surprise".to_owned(), Some(1.0))])
                } else {
                    BTreeMap::from([("amount".to_owned(), None)])
                };
                Observation::new(model(), Utc::now(), features, 0.5)
            })
            .collect();

        let score = data_quality_drift(&observations, &baseline());
        assert!(score > 0.3, "expected a strong quality signal, got {score}");
    }

    #[tokio::test]
    async fn decay_score_and_alert() {
        let store = Arc::new(MemoryDriftStore::new());
        store.put_baseline(&baseline()).await.expect("put baseline");

        // Accuracy fell from the 0.9 baseline to 0.6 over the window.
        for days_ago in 0..5 {
            store
                .append_sample(&PerformanceSample::new(
                    model(),
                    "accuracy",
                    0.6,
                    Utc::now() - Duration::days(days_ago),
                ))
                .await
                .expect("append");
        }

        let bus = Arc::new(InMemoryEventBus::default());
        let mut rx = bus.subscribe();
        let engine = ScoringEngine::new(store, bus, DriftConfig::default());

        let score = engine
            .performance_decay(&model())
            .await
            .expect("decay failed")
            .expect("score expected");

        assert!((score - 1.0 / 3.0).abs() < 1e-9);

        let event = rx.try_recv().expect("decay alert expected");
        assert_eq!(event.topic(), "model.performance.decay");
    }

    #[tokio::test]
    async fn decay_without_samples_is_none() {
        let store = Arc::new(MemoryDriftStore::new());
        store.put_baseline(&baseline()).await.expect("put baseline");

        let bus = Arc::new(InMemoryEventBus::default());
        let engine = ScoringEngine::new(store, bus, DriftConfig::default());

        let score = engine
            .performance_decay(&model())
            .await
            .expect("decay failed");
        assert!(score.is_none());
    }
}
