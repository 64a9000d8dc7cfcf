//! Meridian orchestrator binary.
//!
//! Runs the drift monitor and remediation coordinator against the
//! configured stores and event bus.

use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian_orchestrator::{OrchestratorConfig, OrchestratorService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("meridian=info".parse()?),
        )
        .init();

    info!("meridian orchestrator starting");

    let config = OrchestratorConfig::load()?;
    let service = OrchestratorService::new(config);
    service.run().await?;

    Ok(())
}
