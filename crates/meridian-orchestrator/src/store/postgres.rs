//! PostgreSQL deployment store implementation.

use std::time::Duration;

use async_trait::async_trait;
use meridian_core::{DeploymentId, ModelId, VersionId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{DeployState, DeploymentData, DeploymentRecord, DeploymentSpec};

use super::{DeploymentFilter, DeploymentStore};

/// PostgreSQL-backed deployment store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str) -> OrchestratorResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> OrchestratorResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                version_id TEXT NOT NULL,
                environment TEXT NOT NULL,
                spec JSONB NOT NULL,
                endpoint TEXT,
                infra_handle TEXT,
                is_rollback BOOLEAN NOT NULL DEFAULT FALSE,
                rollback_from TEXT,
                superseded_by TEXT,
                state TEXT NOT NULL,
                failure_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                deployed_at TIMESTAMPTZ,
                activated_at TIMESTAMPTZ,
                rolled_back_at TIMESTAMPTZ,
                undeployed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_model_env
            ON deployments (model_id, environment)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_state
            ON deployments (state)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployment_leases (
                model_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> OrchestratorResult<DeploymentRecord> {
        let spec_json: serde_json::Value = row.get("spec");
        let spec: DeploymentSpec = serde_json::from_value(spec_json).map_err(|e| {
            OrchestratorError::Serialisation(format!("failed to deserialise spec: {e}"))
        })?;

        let state_str: String = row.get("state");
        let state: DeployState = state_str.parse().map_err(|e| {
            OrchestratorError::Serialisation(format!("failed to parse state '{state_str}': {e}"))
        })?;

        Ok(DeploymentRecord {
            data: DeploymentData {
                id: DeploymentId::new(row.get::<String, _>("id")),
                model_id: ModelId::new(row.get::<String, _>("model_id")),
                version_id: VersionId::new(row.get::<String, _>("version_id")),
                environment: row.get("environment"),
                spec,
                endpoint: row.get("endpoint"),
                infra_handle: row.get("infra_handle"),
                is_rollback: row.get("is_rollback"),
                rollback_from: row
                    .get::<Option<String>, _>("rollback_from")
                    .map(DeploymentId::new),
                superseded_by: row
                    .get::<Option<String>, _>("superseded_by")
                    .map(DeploymentId::new),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
                deployed_at: row.get("deployed_at"),
                activated_at: row.get("activated_at"),
                rolled_back_at: row.get("rolled_back_at"),
                undeployed_at: row.get("undeployed_at"),
                failure_reason: row.get("failure_reason"),
            },
            state,
        })
    }

    fn spec_json(record: &DeploymentRecord) -> OrchestratorResult<serde_json::Value> {
        serde_json::to_value(&record.data.spec).map_err(|e| {
            OrchestratorError::Serialisation(format!("failed to serialise spec: {e}"))
        })
    }
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn insert(&self, record: &DeploymentRecord) -> OrchestratorResult<()> {
        let spec_json = Self::spec_json(record)?;
        let data = &record.data;

        sqlx::query(
            r#"
            INSERT INTO deployments (
                id, model_id, version_id, environment, spec, endpoint,
                infra_handle, is_rollback, rollback_from, superseded_by,
                state, failure_reason, created_at, updated_at, deployed_at,
                activated_at, rolled_back_at, undeployed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(data.id.as_str())
        .bind(data.model_id.as_str())
        .bind(data.version_id.as_str())
        .bind(&data.environment)
        .bind(&spec_json)
        .bind(&data.endpoint)
        .bind(&data.infra_handle)
        .bind(data.is_rollback)
        .bind(data.rollback_from.as_ref().map(DeploymentId::as_str))
        .bind(data.superseded_by.as_ref().map(DeploymentId::as_str))
        .bind(record.state.as_str())
        .bind(&data.failure_reason)
        .bind(data.created_at)
        .bind(data.updated_at)
        .bind(data.deployed_at)
        .bind(data.activated_at)
        .bind(data.rolled_back_at)
        .bind(data.undeployed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &DeploymentId) -> OrchestratorResult<Option<DeploymentRecord>> {
        let row = sqlx::query(r#"SELECT * FROM deployments WHERE id = $1"#)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn save(
        &self,
        record: &DeploymentRecord,
        expected_state: DeployState,
    ) -> OrchestratorResult<()> {
        let spec_json = Self::spec_json(record)?;
        let data = &record.data;

        let result = sqlx::query(
            r#"
            UPDATE deployments SET
                endpoint = $2,
                infra_handle = $3,
                superseded_by = $4,
                state = $5,
                failure_reason = $6,
                updated_at = $7,
                deployed_at = $8,
                activated_at = $9,
                rolled_back_at = $10,
                undeployed_at = $11,
                spec = $12
            WHERE id = $1 AND state = $13
            "#,
        )
        .bind(data.id.as_str())
        .bind(&data.endpoint)
        .bind(&data.infra_handle)
        .bind(data.superseded_by.as_ref().map(DeploymentId::as_str))
        .bind(record.state.as_str())
        .bind(&data.failure_reason)
        .bind(data.updated_at)
        .bind(data.deployed_at)
        .bind(data.activated_at)
        .bind(data.rolled_back_at)
        .bind(data.undeployed_at)
        .bind(&spec_json)
        .bind(expected_state.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a lost CAS from a missing record.
            let actual = sqlx::query(r#"SELECT state FROM deployments WHERE id = $1"#)
                .bind(data.id.as_str())
                .fetch_optional(&self.pool)
                .await?;

            return match actual {
                Some(row) => Err(OrchestratorError::StaleState {
                    id: data.id.to_string(),
                    expected: expected_state.as_str(),
                    actual: row.get::<String, _>("state"),
                }),
                None => Err(OrchestratorError::DeploymentNotFound(data.id.to_string())),
            };
        }

        Ok(())
    }

    async fn list(&self, filter: &DeploymentFilter) -> OrchestratorResult<Vec<DeploymentRecord>> {
        // Dynamic filters bound as NULL-tolerant predicates.
        let limit = filter.limit.map_or(i64::MAX, i64::from);

        let rows = sqlx::query(
            r#"
            SELECT * FROM deployments
            WHERE ($1::TEXT IS NULL OR model_id = $1)
              AND ($2::TEXT IS NULL OR environment = $2)
              AND ($3::TEXT IS NULL OR state = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.model_id.as_ref().map(ModelId::as_str))
        .bind(filter.environment.as_deref())
        .bind(filter.state.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn list_active(
        &self,
        model_id: &ModelId,
        environment: &str,
    ) -> OrchestratorResult<Vec<DeploymentRecord>> {
        self.list(
            &DeploymentFilter::new()
                .with_model(model_id.clone())
                .with_environment(environment)
                .with_state(DeployState::Active),
        )
        .await
    }

    async fn acquire_lease(
        &self,
        model_id: &ModelId,
        holder: &str,
        ttl: Duration,
    ) -> OrchestratorResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| OrchestratorError::internal(format!("invalid lease ttl: {e}")))?;
        let expires_at = chrono::Utc::now() + ttl;

        let result = sqlx::query(
            r#"
            INSERT INTO deployment_leases (model_id, holder, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (model_id) DO UPDATE
                SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
                WHERE deployment_leases.holder = EXCLUDED.holder
                   OR deployment_leases.expires_at < NOW()
            "#,
        )
        .bind(model_id.as_str())
        .bind(holder)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::OperationInProgress {
                model: model_id.to_string(),
            });
        }

        Ok(())
    }

    async fn release_lease(&self, model_id: &ModelId, holder: &str) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            DELETE FROM deployment_leases WHERE model_id = $1 AND holder = $2
            "#,
        )
        .bind(model_id.as_str())
        .bind(holder)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
