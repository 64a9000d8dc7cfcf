//! Integration tests for the deployment lifecycle.

mod common;

use common::{fixtures::DeployRequestBuilder, TestOrchestrator};
use meridian_core::{ModelId, VersionId};
use meridian_events::EventBus;
use meridian_orchestrator::provisioner::ProvisionStep;
use meridian_orchestrator::types::DeployState;
use meridian_orchestrator::{DeploymentStore, OrchestratorError};
use tokio_util::sync::CancellationToken;

fn model() -> ModelId {
    ModelId::new("fraud")
}

fn v1() -> VersionId {
    VersionId::new("v1")
}

#[tokio::test]
async fn deploy_happy_path_reaches_active_with_endpoint() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    let record = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await
        .expect("deploy failed");

    assert_eq!(record.state, DeployState::Active);
    assert!(record.data.endpoint.is_some());
    assert!(record.data.infra_handle.is_some());
    assert!(record.data.deployed_at.is_some());
    assert!(record.data.activated_at.is_some());

    // The store agrees.
    let stored = orchestrator
        .store
        .get(&record.data.id)
        .await
        .expect("get failed")
        .expect("record missing");
    assert_eq!(stored.state, DeployState::Active);
}

#[tokio::test]
async fn deploy_publishes_started_and_completed_events() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());
    let mut rx = orchestrator.bus.subscribe();

    orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await
        .expect("deploy failed");

    let first = rx.recv().await.expect("recv failed");
    let second = rx.recv().await.expect("recv failed");
    assert_eq!(first.topic(), "deployment.started");
    assert_eq!(second.topic(), "deployment.completed");
}

#[tokio::test]
async fn deploy_rejects_unready_version() {
    let orchestrator = TestOrchestrator::new();
    // Version never registered in the catalog.

    let result = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn deploy_rejects_second_active_without_force() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());
    orchestrator.register_ready(&model(), &VersionId::new("v2"));

    orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await
        .expect("first deploy failed");

    let result = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v2").build(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::AlreadyActive { .. })
    ));

    // With force the same request succeeds.
    orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v2").force().build(),
            &CancellationToken::new(),
        )
        .await
        .expect("forced deploy failed");
}

#[tokio::test]
async fn failed_provisioning_marks_failed_and_tears_down_partial() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    // Fail after infrastructure was created, so partial capacity exists.
    orchestrator
        .provisioner
        .fail_create_at(ProvisionStep::ArtifactPlacement);

    let result = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(OrchestratorError::Provisioning(_))));

    // The partially created infrastructure was torn down.
    assert_eq!(orchestrator.provisioner.torn_down().len(), 1);

    // The record is Failed with the first error recorded, never stuck in
    // Deploying.
    let deployments = orchestrator
        .store
        .list(&meridian_orchestrator::DeploymentFilter::new().with_model(model()))
        .await
        .expect("list failed");
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].state, DeployState::Failed);
    let reason = deployments[0]
        .data
        .failure_reason
        .as_deref()
        .expect("failure reason missing");
    assert!(reason.contains("artifact placement"));
}

#[tokio::test]
async fn cancelled_before_provisioning_creates_nothing() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator
        .manager
        .deploy(DeployRequestBuilder::new("fraud", "v1").build(), &cancel)
        .await;

    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    assert!(orchestrator.provisioner.created().is_empty());

    let deployments = orchestrator
        .store
        .list(&meridian_orchestrator::DeploymentFilter::new().with_model(model()))
        .await
        .expect("list failed");
    assert!(deployments.is_empty(), "no record may be created");
}

#[tokio::test]
async fn scale_applies_within_bounds_and_rejects_outside() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    let record = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").replicas(2).build(),
            &CancellationToken::new(),
        )
        .await
        .expect("deploy failed");

    let scaled = orchestrator
        .manager
        .scale(&record.data.id, 5, &CancellationToken::new())
        .await
        .expect("scale failed");
    assert_eq!(scaled.data.spec.replicas, 5);
    assert_eq!(orchestrator.provisioner.scaled().len(), 1);

    // Outside the configured bounds (default max is 10).
    let result = orchestrator
        .manager
        .scale(&record.data.id, 50, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn scale_is_illegal_while_not_active() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());
    orchestrator
        .provisioner
        .fail_create_at(ProvisionStep::Infrastructure);

    let _ = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await;

    let failed = orchestrator
        .store
        .list(&meridian_orchestrator::DeploymentFilter::new().with_model(model()))
        .await
        .expect("list failed");

    let result = orchestrator
        .manager
        .scale(&failed[0].data.id, 3, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(OrchestratorError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn undeploy_is_idempotent() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    let record = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await
        .expect("deploy failed");

    let first = orchestrator
        .manager
        .undeploy(&record.data.id)
        .await
        .expect("first undeploy failed");
    assert_eq!(first.state, DeployState::Undeployed);
    assert!(first.data.undeployed_at.is_some());
    assert_eq!(orchestrator.provisioner.torn_down().len(), 1);

    // Second call: no-op success, no second teardown.
    let second = orchestrator
        .manager
        .undeploy(&record.data.id)
        .await
        .expect("second undeploy failed");
    assert_eq!(second.state, DeployState::Undeployed);
    assert_eq!(orchestrator.provisioner.torn_down().len(), 1);
}

#[tokio::test]
async fn undeploy_is_legal_from_failed() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());
    orchestrator
        .provisioner
        .fail_create_at(ProvisionStep::Infrastructure);

    let _ = orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1").build(),
            &CancellationToken::new(),
        )
        .await;

    let failed = orchestrator
        .store
        .list(&meridian_orchestrator::DeploymentFilter::new().with_model(model()))
        .await
        .expect("list failed");

    let undeployed = orchestrator
        .manager
        .undeploy(&failed[0].data.id)
        .await
        .expect("undeploy from failed should work");
    assert_eq!(undeployed.state, DeployState::Undeployed);
}

#[tokio::test]
async fn environments_are_independent() {
    let orchestrator = TestOrchestrator::new();
    orchestrator.register_ready(&model(), &v1());

    orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1")
                .environment("staging")
                .build(),
            &CancellationToken::new(),
        )
        .await
        .expect("staging deploy failed");

    // Same model, different environment: no conflict.
    orchestrator
        .manager
        .deploy(
            DeployRequestBuilder::new("fraud", "v1")
                .environment("production")
                .build(),
            &CancellationToken::new(),
        )
        .await
        .expect("production deploy failed");
}
