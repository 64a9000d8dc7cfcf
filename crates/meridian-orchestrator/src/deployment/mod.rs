//! Deployment orchestration.

mod manager;

pub use manager::{DeployRequest, DeploymentManager, RollbackTrigger};
