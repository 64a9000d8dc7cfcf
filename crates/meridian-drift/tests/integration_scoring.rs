//! Integration tests for the full scoring pipeline: observations in, events
//! out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use meridian_core::ModelId;
use meridian_drift::{
    DriftConfig, DriftStore, FeatureStats, MemoryDriftStore, Observation, PerformanceSample,
    ReferenceBaseline, ScoringEngine,
};
use meridian_events::{Event, EventBus, InMemoryEventBus, Severity};

fn model() -> ModelId {
    ModelId::new("churn")
}

fn baseline() -> ReferenceBaseline {
    ReferenceBaseline {
        model_id: model(),
        features: BTreeMap::from([
            (
                "tenure_months".to_owned(),
                FeatureStats {
                    mean: 24.0,
                    std_dev: 12.0,
                },
            ),
            (
                "monthly_spend".to_owned(),
                FeatureStats {
                    mean: 80.0,
                    std_dev: 25.0,
                },
            ),
        ]),
        label: FeatureStats {
            mean: 0.2,
            std_dev: 0.15,
        },
        baseline_error: Some(0.12),
        metric_baselines: BTreeMap::from([("auc".to_owned(), 0.88)]),
        captured_at: Utc::now(),
    }
}

fn observation(tenure: f64, spend: f64, prediction: f64) -> Observation {
    Observation::new(
        model(),
        Utc::now(),
        BTreeMap::from([
            ("tenure_months".to_owned(), Some(tenure)),
            ("monthly_spend".to_owned(), Some(spend)),
        ]),
        prediction,
    )
}

async fn seeded_store(observations: Vec<Observation>) -> Arc<MemoryDriftStore> {
    let store = Arc::new(MemoryDriftStore::new());
    store.put_baseline(&baseline()).await.expect("put baseline");
    for obs in &observations {
        store.append_observation(obs).await.expect("append");
    }
    store
}

#[tokio::test]
async fn healthy_traffic_produces_no_events() {
    // Traffic distributed like the baseline.
    let observations: Vec<_> = (0..200)
        .map(|i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            observation(
                24.0 + sign * 12.0,
                80.0 + sign * 25.0,
                0.2 + sign * 0.15,
            )
        })
        .collect();

    let store = seeded_store(observations).await;
    let bus = Arc::new(InMemoryEventBus::default());
    let mut rx = bus.subscribe();
    let engine = ScoringEngine::new(store, bus, DriftConfig::default());

    let outcome = engine.assess(&model()).await.expect("assess failed");
    let assessment = outcome.assessment().expect("scored outcome expected");

    assert_eq!(assessment.severity, Severity::None);
    assert!(rx.try_recv().is_err(), "no event for healthy traffic");
}

#[tokio::test]
async fn drifted_traffic_raises_critical_event_with_assessment() {
    // Tenure collapsed and spend exploded relative to the baseline.
    let observations: Vec<_> = (0..200)
        .map(|i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            observation(2.0 + sign, 400.0 + sign * 20.0, 0.9 + sign * 0.05)
                .with_actual(0.1)
        })
        .collect();

    let store = seeded_store(observations).await;
    let bus = Arc::new(InMemoryEventBus::default());
    let mut rx = bus.subscribe();
    let engine = ScoringEngine::new(store.clone(), bus, DriftConfig::default());

    let outcome = engine.assess(&model()).await.expect("assess failed");
    let assessment = outcome.assessment().expect("scored outcome expected");
    assert_eq!(assessment.severity, Severity::Critical);

    // The event carries the same assessment that was persisted.
    match rx.try_recv().expect("drift event expected") {
        Event::DriftDetected {
            model_id,
            assessment: published,
            ..
        } => {
            assert_eq!(model_id, model());
            assert_eq!(&published, assessment);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let persisted = store
        .latest_assessment(&model())
        .await
        .expect("query failed")
        .expect("assessment persisted");
    assert_eq!(&persisted, assessment);
}

#[tokio::test]
async fn no_data_boundary_is_exact() {
    let config = DriftConfig::default();

    // One observation short of the minimum: NoData.
    let store = seeded_store(
        (0..config.min_samples - 1)
            .map(|_| observation(2.0, 400.0, 0.9))
            .collect(),
    )
    .await;
    let bus = Arc::new(InMemoryEventBus::default());
    let engine = ScoringEngine::new(store, bus, config.clone());
    let outcome = engine.assess(&model()).await.expect("assess failed");
    assert!(outcome.is_no_data());

    // Exactly the minimum: scored.
    let store = seeded_store(
        (0..config.min_samples)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                observation(2.0 + sign, 400.0 + sign, 0.9)
            })
            .collect(),
    )
    .await;
    let bus = Arc::new(InMemoryEventBus::default());
    let engine = ScoringEngine::new(store, bus, config);
    let outcome = engine.assess(&model()).await.expect("assess failed");
    assert!(!outcome.is_no_data());
}

#[tokio::test]
async fn decay_alert_flows_through_the_bus() {
    let store = Arc::new(MemoryDriftStore::new());
    store.put_baseline(&baseline()).await.expect("put baseline");

    // AUC slid well below its 0.88 baseline over the trailing week.
    for days_ago in 0..6 {
        store
            .append_sample(&PerformanceSample::new(
                model(),
                "auc",
                0.6,
                Utc::now() - chrono::Duration::days(days_ago),
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
    assert!(score > 0.2);

    match rx.try_recv().expect("decay event expected") {
        Event::PerformanceDecay {
            model_id,
            decay_score,
            ..
        } => {
            assert_eq!(model_id, model());
            assert!((decay_score - score).abs() < 1e-12);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
