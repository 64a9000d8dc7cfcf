//! Event bus contract for the Meridian control plane.
//!
//! The orchestrator and the drift scoring engine are independently scheduled
//! components coupled only through messages. This crate defines that
//! boundary: the typed payloads for every topic, the [`EventBus`] trait, and
//! an in-process implementation backed by [`tokio::sync::broadcast`] for
//! tests and single-node deployments.
//!
//! Delivery is at-least-once. Consumers must be idempotent on
//! `(topic, model_id, timestamp)`; [`Event::dedup_key`] exists for exactly
//! that purpose.

#![forbid(unsafe_code)]

pub mod assessment;
pub mod bus;
pub mod event;

pub use assessment::{DriftAssessment, Severity, SignalScores};
pub use bus::{EventBus, EventError, EventResult, InMemoryEventBus};
pub use event::Event;
