//! Periodic evaluation loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::DriftError;
use crate::scoring::ScoringEngine;
use crate::store::DriftStore;

/// Drives the scoring engine on a periodic timer.
///
/// Each tick evaluates every model with a stored baseline: a drift
/// assessment followed by a decay check. Evaluation errors are logged and
/// do not stop the loop; there is no synchronous caller to surface them to.
pub struct DriftMonitor {
    engine: Arc<ScoringEngine>,
    store: Arc<dyn DriftStore>,
    interval: Duration,
    cancel: CancellationToken,
}

impl DriftMonitor {
    /// Create a new monitor.
    pub fn new(
        engine: Arc<ScoringEngine>,
        store: Arc<dyn DriftStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            store,
            interval,
            cancel,
        }
    }

    /// Run the evaluation loop until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "drift monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.evaluate_all().await,
                () = self.cancel.cancelled() => {
                    info!("drift monitor shutting down");
                    return;
                }
            }
        }
    }

    async fn evaluate_all(&self) {
        let models = match self.store.list_baseline_models().await {
            Ok(models) => models,
            Err(e) => {
                error!(error = %e, "failed to list models for evaluation");
                return;
            }
        };

        debug!(models = models.len(), "evaluation cycle starting");

        for model_id in models {
            match self.engine.assess(&model_id).await {
                Ok(outcome) if outcome.is_no_data() => {
                    debug!(model_id = %model_id, "no data for assessment");
                }
                Ok(_) => {}
                // A vanished baseline between listing and assessment is a
                // benign race with the training pipeline.
                Err(DriftError::MissingBaseline(_)) => {}
                Err(e) => {
                    error!(model_id = %model_id, error = %e, "drift assessment failed");
                }
            }

            match self.engine.performance_decay(&model_id).await {
                Ok(_) => {}
                Err(DriftError::MissingBaseline(_)) => {}
                Err(e) => {
                    error!(model_id = %model_id, error = %e, "decay evaluation failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{FeatureStats, ReferenceBaseline};
    use crate::config::DriftConfig;
    use crate::observation::Observation;
    use crate::store::MemoryDriftStore;
    use chrono::Utc;
    use meridian_core::ModelId;
    use meridian_events::InMemoryEventBus;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn monitor_stops_on_cancel() {
        let store: Arc<dyn DriftStore> = Arc::new(MemoryDriftStore::new());
        let bus = Arc::new(InMemoryEventBus::default());
        let engine = Arc::new(ScoringEngine::new(
            store.clone(),
            bus,
            DriftConfig::default(),
        ));

        let cancel = CancellationToken::new();
        let monitor = DriftMonitor::new(
            engine,
            store,
            Duration::from_millis(10),
            cancel.clone(),
        );

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        handle.await.expect("monitor task panicked");
    }

    #[tokio::test]
    async fn monitor_assesses_baselined_models() {
        let store = Arc::new(MemoryDriftStore::new());
        let model = ModelId::new("fraud");

        store
            .put_baseline(&ReferenceBaseline {
                model_id: model.clone(),
                features: BTreeMap::from([(
                    "amount".to_owned(),
                    FeatureStats {
                        mean: 10.0,
                        std_dev: 2.0,
                    },
                )]),
                label: FeatureStats {
                    mean: 0.5,
                    std_dev: 0.2,
                },
                baseline_error: None,
                metric_baselines: BTreeMap::new(),
                captured_at: Utc::now(),
            })
            .await
            .expect("put baseline");

        for i in 0..40 {
            store
                .append_observation(&Observation::new(
                    model.clone(),
                    Utc::now(),
                    BTreeMap::from([(
                        "amount".to_owned(),
                        Some(if i % 2 == 0 { 12.0 } else { 8.0 }),
                    )]),
                    0.5,
                ))
                .await
                .expect("append");
        }

        let bus = Arc::new(InMemoryEventBus::default());
        let engine = Arc::new(ScoringEngine::new(
            store.clone(),
            bus,
            DriftConfig::default(),
        ));

        let cancel = CancellationToken::new();
        let monitor = DriftMonitor::new(
            engine,
            store.clone(),
            Duration::from_millis(5),
            cancel.clone(),
        );

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.expect("monitor task panicked");

        let latest = store
            .latest_assessment(&model)
            .await
            .expect("query failed");
        assert!(latest.is_some(), "monitor should have recorded an assessment");
    }
}
