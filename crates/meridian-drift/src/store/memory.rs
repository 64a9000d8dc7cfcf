//! In-memory drift store for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use meridian_events::DriftAssessment;

use crate::baseline::ReferenceBaseline;
use crate::error::{DriftError, DriftResult};
use crate::observation::{Observation, PerformanceSample};

use super::DriftStore;

/// In-memory drift store.
///
/// Data is lost when the process exits; use [`super::PostgresDriftStore`]
/// in production.
#[derive(Debug, Default)]
pub struct MemoryDriftStore {
    observations: RwLock<HashMap<String, Vec<Observation>>>,
    baselines: RwLock<HashMap<String, ReferenceBaseline>>,
    assessments: RwLock<HashMap<String, Vec<DriftAssessment>>>,
    samples: RwLock<HashMap<String, Vec<PerformanceSample>>>,
}

impl MemoryDriftStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DriftStore for MemoryDriftStore {
    async fn append_observation(&self, observation: &Observation) -> DriftResult<()> {
        let mut observations = self
            .observations
            .write()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        observations
            .entry(observation.model_id.as_str().to_owned())
            .or_default()
            .push(observation.clone());

        Ok(())
    }

    async fn recent_observations(
        &self,
        model_id: &ModelId,
        limit: usize,
    ) -> DriftResult<Vec<Observation>> {
        let observations = self
            .observations
            .read()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        let mut results = observations
            .get(model_id.as_str())
            .cloned()
            .unwrap_or_default();

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit);

        Ok(results)
    }

    async fn get_baseline(&self, model_id: &ModelId) -> DriftResult<Option<ReferenceBaseline>> {
        let baselines = self
            .baselines
            .read()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        Ok(baselines.get(model_id.as_str()).cloned())
    }

    async fn put_baseline(&self, baseline: &ReferenceBaseline) -> DriftResult<()> {
        let mut baselines = self
            .baselines
            .write()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        baselines.insert(baseline.model_id.as_str().to_owned(), baseline.clone());

        Ok(())
    }

    async fn append_assessment(&self, assessment: &DriftAssessment) -> DriftResult<()> {
        let mut assessments = self
            .assessments
            .write()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        assessments
            .entry(assessment.model_id.as_str().to_owned())
            .or_default()
            .push(assessment.clone());

        Ok(())
    }

    async fn latest_assessment(
        &self,
        model_id: &ModelId,
    ) -> DriftResult<Option<DriftAssessment>> {
        let assessments = self
            .assessments
            .read()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        Ok(assessments
            .get(model_id.as_str())
            .and_then(|list| list.iter().max_by_key(|a| a.timestamp).cloned()))
    }

    async fn append_sample(&self, sample: &PerformanceSample) -> DriftResult<()> {
        let mut samples = self
            .samples
            .write()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        samples
            .entry(sample.model_id.as_str().to_owned())
            .or_default()
            .push(sample.clone());

        Ok(())
    }

    async fn samples_since(
        &self,
        model_id: &ModelId,
        since: DateTime<Utc>,
    ) -> DriftResult<Vec<PerformanceSample>> {
        let samples = self
            .samples
            .read()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        let mut results: Vec<_> = samples
            .get(model_id.as_str())
            .map(|list| {
                list.iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(results)
    }

    async fn list_baseline_models(&self) -> DriftResult<Vec<ModelId>> {
        let baselines = self
            .baselines
            .read()
            .map_err(|_| DriftError::internal("lock poisoned"))?;

        let mut models: Vec<_> = baselines.keys().map(|key| ModelId::new(key.as_str())).collect();
        models.sort();

        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::FeatureStats;
    use std::collections::BTreeMap;

    fn observation(ts_offset_secs: i64) -> Observation {
        Observation::new(
            ModelId::new("fraud"),
            Utc::now() + chrono::Duration::seconds(ts_offset_secs),
            BTreeMap::from([("amount".to_owned(), Some(12.5))]),
            0.7,
        )
    }

    fn baseline(model: &str) -> ReferenceBaseline {
        ReferenceBaseline {
            model_id: ModelId::new(model),
            features: BTreeMap::new(),
            label: FeatureStats {
                mean: 0.5,
                std_dev: 0.2,
            },
            baseline_error: None,
            metric_baselines: BTreeMap::new(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn recent_observations_newest_first_and_limited() {
        let store = MemoryDriftStore::new();
        for i in 0..5 {
            store
                .append_observation(&observation(i))
                .await
                .expect("append failed");
        }

        let recent = store
            .recent_observations(&ModelId::new("fraud"), 3)
            .await
            .expect("query failed");

        assert_eq!(recent.len(), 3);
        assert!(recent[0].timestamp >= recent[1].timestamp);
        assert!(recent[1].timestamp >= recent[2].timestamp);
    }

    #[tokio::test]
    async fn baseline_roundtrip_and_listing() {
        let store = MemoryDriftStore::new();
        assert!(store
            .get_baseline(&ModelId::new("fraud"))
            .await
            .expect("query failed")
            .is_none());

        store
            .put_baseline(&baseline("fraud"))
            .await
            .expect("put failed");
        store
            .put_baseline(&baseline("churn"))
            .await
            .expect("put failed");

        let models = store.list_baseline_models().await.expect("list failed");
        assert_eq!(models.len(), 2);
        assert!(models.contains(&ModelId::new("fraud")));
    }

    #[tokio::test]
    async fn latest_assessment_picks_newest_timestamp() {
        use meridian_events::{assessment::SignalScores, Severity};

        let store = MemoryDriftStore::new();
        let older = DriftAssessment {
            model_id: ModelId::new("fraud"),
            timestamp: Utc::now() - chrono::Duration::hours(1),
            signals: SignalScores::default(),
            overall_score: 0.4,
            severity: Severity::Critical,
            sample_count: 100,
        };
        let newer = DriftAssessment {
            timestamp: Utc::now(),
            overall_score: 0.02,
            severity: Severity::None,
            ..older.clone()
        };

        // Insert newest first, then the late-arriving older one.
        store.append_assessment(&newer).await.expect("append failed");
        store.append_assessment(&older).await.expect("append failed");

        let latest = store
            .latest_assessment(&ModelId::new("fraud"))
            .await
            .expect("query failed")
            .expect("assessment missing");
        assert_eq!(latest.severity, Severity::None);
    }

    #[tokio::test]
    async fn samples_since_filters_and_orders() {
        let store = MemoryDriftStore::new();
        let now = Utc::now();

        for (days_ago, value) in [(10, 0.9), (3, 0.8), (1, 0.7)] {
            store
                .append_sample(&PerformanceSample::new(
                    ModelId::new("fraud"),
                    "accuracy",
                    value,
                    now - chrono::Duration::days(days_ago),
                ))
                .await
                .expect("append failed");
        }

        let recent = store
            .samples_since(&ModelId::new("fraud"), now - chrono::Duration::days(7))
            .await
            .expect("query failed");

        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp <= recent[1].timestamp);
    }
}
