//! Meridian drift and decay scoring engine.
//!
//! Continuously evaluates production signal quality for deployed models by
//! comparing recent observations against a reference baseline captured at
//! training time. Each evaluation produces a [`DriftAssessment`] with four
//! per-signal scores, a weighted overall score, and a severity band. The
//! severity classification is the primary automatic trigger for the
//! orchestrator's remediation policy.
//!
//! # Architecture
//!
//! - [`ScoringEngine`] computes assessments and performance-decay scores and
//!   publishes threshold crossings on the event bus
//! - [`DriftStore`] persists observations, baselines, samples, and
//!   assessments (PostgreSQL in production, in-memory for tests)
//! - [`DriftMonitor`] drives the engine on a periodic timer per model
//!
//! Absence of signal is never treated as absence of drift: an evaluation
//! over fewer than the configured minimum number of observations yields
//! [`AssessmentOutcome::NoData`] and publishes nothing.
//!
//! [`DriftAssessment`]: meridian_events::DriftAssessment

#![forbid(unsafe_code)]

pub mod baseline;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observation;
pub mod scoring;
pub mod stats;
pub mod store;

pub use baseline::{FeatureStats, ReferenceBaseline};
pub use config::{DecayConfig, DriftConfig, SeverityThresholds};
pub use error::{DriftError, DriftResult};
pub use monitor::DriftMonitor;
pub use observation::{Observation, PerformanceSample};
pub use scoring::{AssessmentOutcome, ScoringEngine};
pub use stats::RunningStats;
pub use store::{DriftStore, MemoryDriftStore, PostgresDriftStore};
