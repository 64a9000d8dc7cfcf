//! Remediation coordinator.
//!
//! Subscribes to drift classifications and applies the severity policy:
//! `Critical` rolls back automatically to the most recent previously-active
//! version (alert-only when none exists), `High` raises a retrain signal,
//! `Medium` and `Low` are logged. Acting only at the top band, with a safe
//! fallback, keeps the loop from flapping.
//!
//! Delivery is at-least-once, so everything here is idempotent: duplicate
//! events are dropped on their `(topic, model, timestamp)` key, a rollback
//! already in flight for a model suppresses a second trigger, and an
//! assessment older than the newest one handled never re-triggers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::ModelId;
use meridian_events::{DriftAssessment, Event, EventBus, Severity};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RemediationConfig;
use crate::deployment::{DeploymentManager, RollbackTrigger};
use crate::error::OrchestratorError;
use crate::store::{DeploymentFilter, DeploymentStore};
use crate::types::{DeployState, DeploymentRecord};

/// Reacts to scoring-engine events according to the severity policy.
pub struct RemediationCoordinator {
    manager: Arc<DeploymentManager>,
    store: Arc<dyn DeploymentStore>,
    bus: Arc<dyn EventBus>,
    config: RemediationConfig,
    seen: DashMap<(String, String, DateTime<Utc>), ()>,
    last_handled: DashMap<String, DateTime<Utc>>,
    in_flight: DashMap<String, ()>,
    cooldown_until: DashMap<String, Instant>,
}

impl RemediationCoordinator {
    /// Create a new coordinator.
    pub fn new(
        manager: Arc<DeploymentManager>,
        store: Arc<dyn DeploymentStore>,
        bus: Arc<dyn EventBus>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            manager,
            store,
            bus,
            config,
            seen: DashMap::new(),
            last_handled: DashMap::new(),
            in_flight: DashMap::new(),
            cooldown_until: DashMap::new(),
        }
    }

    /// Run the event loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.bus.subscribe();
        info!("remediation coordinator started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("remediation coordinator shutting down");
                    return;
                }
                received = rx.recv() => match received {
                    Ok(event) => self.handle_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "remediation coordinator lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("event bus closed, remediation coordinator stopping");
                        return;
                    }
                },
            }
        }
    }

    /// Handle one event. Public for tests; the loop in [`Self::run`] is the
    /// production entry point.
    pub async fn handle_event(&self, event: Event) {
        let Event::DriftDetected {
            model_id,
            assessment,
            timestamp,
        } = event
        else {
            return;
        };

        if self.already_seen(&model_id, timestamp) {
            debug!(model_id = %model_id, "duplicate drift event dropped");
            return;
        }

        if self.is_stale(&model_id, timestamp) {
            debug!(model_id = %model_id, "stale drift assessment ignored");
            return;
        }

        match assessment.severity {
            Severity::Critical => self.handle_critical(&model_id, &assessment).await,
            Severity::High => {
                info!(
                    model_id = %model_id,
                    score = assessment.overall_score,
                    "high drift severity, requesting retrain"
                );
                self.publish(Event::RetrainRequired {
                    model_id: model_id.clone(),
                    reason: format!(
                        "drift severity high (overall score {:.3})",
                        assessment.overall_score
                    ),
                    timestamp: Utc::now(),
                })
                .await;
            }
            Severity::Medium | Severity::Low => {
                info!(
                    model_id = %model_id,
                    severity = %assessment.severity,
                    score = assessment.overall_score,
                    "drift noted, below action thresholds"
                );
            }
            Severity::None => {}
        }
    }

    /// Duplicate suppression on the event's idempotency key.
    fn already_seen(&self, model_id: &ModelId, timestamp: DateTime<Utc>) -> bool {
        // Coarse eviction keeps the map bounded without an LRU dependency.
        if self.seen.len() >= self.config.dedup_capacity {
            self.seen.clear();
        }

        let key = (
            "model.drift.detected".to_owned(),
            model_id.to_string(),
            timestamp,
        );
        self.seen.insert(key, ()).is_some()
    }

    /// True when a newer assessment for this model has already been handled.
    ///
    /// Late-arriving assessments are persisted by the scoring engine but
    /// must never re-trigger remediation.
    fn is_stale(&self, model_id: &ModelId, timestamp: DateTime<Utc>) -> bool {
        let key = model_id.as_str().to_owned();
        let mut stale = false;
        self.last_handled
            .entry(key)
            .and_modify(|latest| {
                if *latest >= timestamp {
                    stale = true;
                } else {
                    *latest = timestamp;
                }
            })
            .or_insert(timestamp);
        stale
    }

    async fn handle_critical(&self, model_id: &ModelId, assessment: &DriftAssessment) {
        if !self.config.auto_rollback {
            warn!(model_id = %model_id, "critical drift, automatic rollback disabled");
            self.publish(Event::Alert {
                model_id: model_id.clone(),
                message: format!(
                    "critical drift (score {:.3}) but automatic rollback is disabled",
                    assessment.overall_score
                ),
                timestamp: Utc::now(),
            })
            .await;
            return;
        }

        if let Some(until) = self.cooldown_until.get(model_id.as_str()) {
            if Instant::now() < *until {
                info!(model_id = %model_id, "critical drift within rollback cooldown, suppressed");
                return;
            }
        }

        // A rollback already in flight for this model suppresses a second
        // concurrently triggered one.
        if self
            .in_flight
            .insert(model_id.as_str().to_owned(), ())
            .is_some()
        {
            info!(model_id = %model_id, "rollback already in progress, duplicate trigger dropped");
            return;
        }

        let result = self.rollback_to_previous(model_id, assessment).await;
        self.in_flight.remove(model_id.as_str());

        match result {
            Ok(true) => {
                self.cooldown_until.insert(
                    model_id.as_str().to_owned(),
                    Instant::now() + Duration::from_secs(self.config.cooldown_secs),
                );
            }
            Ok(false) => {}
            // Background remediation errors are published as alerts; there
            // is no synchronous caller to throw to.
            Err(e) => {
                error!(model_id = %model_id, error = %e, "automatic rollback failed");
                self.publish(Event::Alert {
                    model_id: model_id.clone(),
                    message: format!("automatic rollback failed: {e}"),
                    timestamp: Utc::now(),
                })
                .await;
            }
        }
    }

    /// Attempt the automatic rollback. Returns `Ok(true)` when a rollback
    /// ran, `Ok(false)` when there was nothing to do (no active deployment
    /// or no prior version, which is alert-only).
    async fn rollback_to_previous(
        &self,
        model_id: &ModelId,
        assessment: &DriftAssessment,
    ) -> Result<bool, OrchestratorError> {
        let active = self
            .store
            .list(
                &DeploymentFilter::new()
                    .with_model(model_id.clone())
                    .with_state(DeployState::Active),
            )
            .await?;

        let Some(current) = active.first() else {
            info!(model_id = %model_id, "critical drift but no active deployment");
            return Ok(false);
        };

        let Some(target) = self.previous_active_version(current).await? else {
            warn!(
                model_id = %model_id,
                current_version = %current.data.version_id,
                "critical drift with no prior version to roll back to"
            );
            self.publish(Event::Alert {
                model_id: model_id.clone(),
                message: format!(
                    "critical drift (score {:.3}) on version {} but no previous version exists; \
                     manual intervention required",
                    assessment.overall_score, current.data.version_id
                ),
                timestamp: Utc::now(),
            })
            .await;
            return Ok(false);
        };

        info!(
            model_id = %model_id,
            from_version = %current.data.version_id,
            to_version = %target,
            "critical drift, starting automatic rollback"
        );

        self.manager
            .rollback_to(
                &current.data.id,
                &target,
                RollbackTrigger::DriftCritical,
                &CancellationToken::new(),
            )
            .await?;

        Ok(true)
    }

    /// The most recent previously-active version for the current
    /// deployment's model and environment.
    ///
    /// Previously-active records are those that once served and left service
    /// via a cutover (`Inactive` or `RolledBack`); the history chain's
    /// `superseded_by` links make this selection well-defined.
    async fn previous_active_version(
        &self,
        current: &DeploymentRecord,
    ) -> Result<Option<meridian_core::VersionId>, OrchestratorError> {
        let history = self
            .store
            .list(
                &DeploymentFilter::new()
                    .with_model(current.data.model_id.clone())
                    .with_environment(current.data.environment.clone()),
            )
            .await?;

        Ok(history
            .into_iter()
            .filter(|record| {
                matches!(record.state, DeployState::Inactive | DeployState::RolledBack)
                    && record.data.version_id != current.data.version_id
            })
            .max_by_key(|record| record.data.rolled_back_at.unwrap_or(record.data.created_at))
            .map(|record| record.data.version_id))
    }

    async fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(event).await {
            warn!(error = %e, "event publication failed");
        }
    }
}

impl std::fmt::Debug for RemediationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
