//! PostgreSQL drift store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meridian_core::ModelId;
use meridian_events::{assessment::SignalScores, DriftAssessment, Severity};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::baseline::ReferenceBaseline;
use crate::error::{DriftError, DriftResult};
use crate::observation::{Observation, PerformanceSample};

use super::DriftStore;

/// PostgreSQL-backed drift store.
#[derive(Clone)]
pub struct PostgresDriftStore {
    pool: PgPool,
}

impl PostgresDriftStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str) -> DriftResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> DriftResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> DriftResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drift_observations (
                model_id TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                features JSONB NOT NULL,
                prediction DOUBLE PRECISION NOT NULL,
                actual DOUBLE PRECISION
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_drift_observations_model_ts
            ON drift_observations (model_id, ts DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drift_baselines (
                model_id TEXT PRIMARY KEY,
                baseline JSONB NOT NULL,
                captured_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drift_assessments (
                model_id TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                signals JSONB NOT NULL,
                overall_score DOUBLE PRECISION NOT NULL,
                severity TEXT NOT NULL,
                sample_count BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_drift_assessments_model_ts
            ON drift_assessments (model_id, ts DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance_samples (
                model_id TEXT NOT NULL,
                metric TEXT NOT NULL,
                value DOUBLE PRECISION NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_performance_samples_model_ts
            ON performance_samples (model_id, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_observation(row: &sqlx::postgres::PgRow) -> DriftResult<Observation> {
        let features_json: serde_json::Value = row.get("features");
        let features = serde_json::from_value(features_json).map_err(|e| {
            DriftError::Serialisation(format!("failed to deserialise features: {e}"))
        })?;

        Ok(Observation {
            model_id: ModelId::new(row.get::<String, _>("model_id")),
            timestamp: row.get("ts"),
            features,
            prediction: row.get("prediction"),
            actual: row.get("actual"),
        })
    }

    fn row_to_assessment(row: &sqlx::postgres::PgRow) -> DriftResult<DriftAssessment> {
        let signals_json: serde_json::Value = row.get("signals");
        let signals: SignalScores = serde_json::from_value(signals_json).map_err(|e| {
            DriftError::Serialisation(format!("failed to deserialise signals: {e}"))
        })?;

        let severity_str: String = row.get("severity");
        let severity: Severity = serde_json::from_value(serde_json::Value::String(severity_str))
            .map_err(|e| DriftError::Serialisation(format!("failed to parse severity: {e}")))?;

        let sample_count: i64 = row.get("sample_count");

        Ok(DriftAssessment {
            model_id: ModelId::new(row.get::<String, _>("model_id")),
            timestamp: row.get("ts"),
            signals,
            overall_score: row.get("overall_score"),
            severity,
            sample_count: usize::try_from(sample_count).unwrap_or(0),
        })
    }
}

#[async_trait]
impl DriftStore for PostgresDriftStore {
    async fn append_observation(&self, observation: &Observation) -> DriftResult<()> {
        let features_json = serde_json::to_value(&observation.features).map_err(|e| {
            DriftError::Serialisation(format!("failed to serialise features: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO drift_observations (model_id, ts, features, prediction, actual)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(observation.model_id.as_str())
        .bind(observation.timestamp)
        .bind(&features_json)
        .bind(observation.prediction)
        .bind(observation.actual)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_observations(
        &self,
        model_id: &ModelId,
        limit: usize,
    ) -> DriftResult<Vec<Observation>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT model_id, ts, features, prediction, actual
            FROM drift_observations
            WHERE model_id = $1
            ORDER BY ts DESC
            LIMIT $2
            "#,
        )
        .bind(model_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_observation).collect()
    }

    async fn get_baseline(&self, model_id: &ModelId) -> DriftResult<Option<ReferenceBaseline>> {
        let row = sqlx::query(
            r#"
            SELECT baseline FROM drift_baselines WHERE model_id = $1
            "#,
        )
        .bind(model_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let baseline_json: serde_json::Value = row.get("baseline");
                let baseline = serde_json::from_value(baseline_json).map_err(|e| {
                    DriftError::Serialisation(format!("failed to deserialise baseline: {e}"))
                })?;
                Ok(Some(baseline))
            }
            None => Ok(None),
        }
    }

    async fn put_baseline(&self, baseline: &ReferenceBaseline) -> DriftResult<()> {
        let baseline_json = serde_json::to_value(baseline).map_err(|e| {
            DriftError::Serialisation(format!("failed to serialise baseline: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO drift_baselines (model_id, baseline, captured_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (model_id)
            DO UPDATE SET baseline = EXCLUDED.baseline, captured_at = EXCLUDED.captured_at
            "#,
        )
        .bind(baseline.model_id.as_str())
        .bind(&baseline_json)
        .bind(baseline.captured_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_assessment(&self, assessment: &DriftAssessment) -> DriftResult<()> {
        let signals_json = serde_json::to_value(assessment.signals).map_err(|e| {
            DriftError::Serialisation(format!("failed to serialise signals: {e}"))
        })?;

        let sample_count = i64::try_from(assessment.sample_count).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO drift_assessments
                (model_id, ts, signals, overall_score, severity, sample_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(assessment.model_id.as_str())
        .bind(assessment.timestamp)
        .bind(&signals_json)
        .bind(assessment.overall_score)
        .bind(assessment.severity.as_str())
        .bind(sample_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_assessment(
        &self,
        model_id: &ModelId,
    ) -> DriftResult<Option<DriftAssessment>> {
        let row = sqlx::query(
            r#"
            SELECT model_id, ts, signals, overall_score, severity, sample_count
            FROM drift_assessments
            WHERE model_id = $1
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(model_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_assessment).transpose()
    }

    async fn append_sample(&self, sample: &PerformanceSample) -> DriftResult<()> {
        let metadata_json = serde_json::to_value(&sample.metadata).map_err(|e| {
            DriftError::Serialisation(format!("failed to serialise metadata: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO performance_samples (model_id, metric, value, ts, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(sample.model_id.as_str())
        .bind(&sample.metric)
        .bind(sample.value)
        .bind(sample.timestamp)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn samples_since(
        &self,
        model_id: &ModelId,
        since: DateTime<Utc>,
    ) -> DriftResult<Vec<PerformanceSample>> {
        let rows = sqlx::query(
            r#"
            SELECT model_id, metric, value, ts, metadata
            FROM performance_samples
            WHERE model_id = $1 AND ts >= $2
            ORDER BY ts ASC
            "#,
        )
        .bind(model_id.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let metadata_json: serde_json::Value = row.get("metadata");
                let metadata = serde_json::from_value(metadata_json).map_err(|e| {
                    DriftError::Serialisation(format!("failed to deserialise metadata: {e}"))
                })?;

                Ok(PerformanceSample {
                    model_id: ModelId::new(row.get::<String, _>("model_id")),
                    metric: row.get("metric"),
                    value: row.get("value"),
                    timestamp: row.get("ts"),
                    metadata,
                })
            })
            .collect()
    }

    async fn list_baseline_models(&self) -> DriftResult<Vec<ModelId>> {
        let rows = sqlx::query(
            r#"
            SELECT model_id FROM drift_baselines ORDER BY model_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ModelId::new(row.get::<String, _>("model_id")))
            .collect())
    }
}

impl std::fmt::Debug for PostgresDriftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriftStore").finish_non_exhaustive()
    }
}
