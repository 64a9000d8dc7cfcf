//! Shared types for the Meridian control plane.
//!
//! This crate holds the identifier newtypes used across the orchestrator,
//! the drift scoring engine, and the event bus. It is deliberately
//! dependency-light so every other crate can depend on it.

#![forbid(unsafe_code)]

mod ids;

pub use ids::{DeploymentId, ModelId, VersionId};
