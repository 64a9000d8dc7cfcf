//! HTTP provisioner client.
//!
//! Fronts an external infrastructure API (the platform that actually owns
//! compute, artifact placement, and traffic routing). Every call races the
//! request against the caller's cancellation token, and the underlying
//! client carries a hard request timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    HealthReport, InfraHandle, ProvisionError, ProvisionResult, ProvisionSpec, Provisioner,
    ProvisionStep,
};

/// HTTP client for the external infrastructure API.
#[derive(Debug, Clone)]
pub struct HttpProvisioner {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    #[serde(flatten)]
    spec: &'a ProvisionSpec,
}

#[derive(Deserialize)]
struct CreateResponse {
    handle: InfraHandle,
    /// Step reached before a failure, reported by the API on 4xx/5xx.
    #[serde(default)]
    failed_step: Option<ProvisionStep>,
}

#[derive(Serialize)]
struct SwitchRequest<'a> {
    from: &'a str,
    to: &'a str,
}

#[derive(Deserialize)]
struct HealthResponse {
    healthy: bool,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ScaleRequest {
    replicas: u32,
}

impl HttpProvisioner {
    /// Create a new provisioner client.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ProvisionResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ProvisionError::new(ProvisionStep::Infrastructure, format!("client build: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Race a request future against the cancellation token.
    async fn guarded<T>(
        &self,
        step: ProvisionStep,
        cancel: &CancellationToken,
        fut: impl std::future::Future<Output = Result<T, reqwest::Error>> + Send,
    ) -> ProvisionResult<T> {
        tokio::select! {
            result = fut => result.map_err(|e| {
                let error = ProvisionError::new(step, e.to_string());
                if e.is_timeout() { error.timed_out() } else { error }
            }),
            () = cancel.cancelled() => {
                Err(ProvisionError::new(step, "cancelled by caller").timed_out())
            }
        }
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn create_infrastructure(
        &self,
        spec: &ProvisionSpec,
        cancel: &CancellationToken,
    ) -> ProvisionResult<InfraHandle> {
        let url = format!("{}/infrastructure", self.base_url);
        debug!(deployment_id = %spec.deployment_id, url = %url, "creating infrastructure");

        let response = self
            .guarded(
                ProvisionStep::Infrastructure,
                cancel,
                self.client.post(&url).json(&CreateRequest { spec }).send(),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: CreateResponse = self
                .guarded(ProvisionStep::Infrastructure, cancel, response.json())
                .await?;
            return Ok(body.handle);
        }

        // The API reports which step failed and, when capacity was already
        // created, the partial handle to tear down.
        let body: Result<CreateResponse, _> = response.json().await;
        let error = match body {
            Ok(body) => {
                let step = body.failed_step.unwrap_or(ProvisionStep::Infrastructure);
                ProvisionError::new(step, format!("provisioner returned {status}"))
                    .with_partial(body.handle)
            }
            Err(_) => ProvisionError::new(
                ProvisionStep::Infrastructure,
                format!("provisioner returned {status}"),
            ),
        };

        Err(error)
    }

    async fn switch_traffic(
        &self,
        from: &InfraHandle,
        to: &InfraHandle,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let url = format!("{}/traffic/switch", self.base_url);
        debug!(from = %from.id, to = %to.id, "switching traffic");

        let response = self
            .guarded(
                ProvisionStep::ServingConfig,
                cancel,
                self.client
                    .post(&url)
                    .json(&SwitchRequest {
                        from: &from.id,
                        to: &to.id,
                    })
                    .send(),
            )
            .await?;

        if !response.status().is_success() {
            return Err(ProvisionError::new(
                ProvisionStep::ServingConfig,
                format!("traffic switch returned {}", response.status()),
            ));
        }

        Ok(())
    }

    async fn health_check(
        &self,
        handle: &InfraHandle,
        cancel: &CancellationToken,
    ) -> ProvisionResult<HealthReport> {
        let url = format!("{}/infrastructure/{}/health", self.base_url, handle.id);

        let response = self
            .guarded(
                ProvisionStep::ServingConfig,
                cancel,
                self.client.get(&url).send(),
            )
            .await?;

        if !response.status().is_success() {
            return Err(ProvisionError::new(
                ProvisionStep::ServingConfig,
                format!("health check returned {}", response.status()),
            ));
        }

        let body: HealthResponse = self
            .guarded(ProvisionStep::ServingConfig, cancel, response.json())
            .await?;

        Ok(HealthReport {
            healthy: body.healthy,
            latency_ms: body.latency_ms,
        })
    }

    async fn teardown(&self, handle: &InfraHandle) -> ProvisionResult<()> {
        let url = format!("{}/infrastructure/{}", self.base_url, handle.id);
        debug!(handle = %handle.id, "tearing down infrastructure");

        let response = self.client.delete(&url).send().await.map_err(|e| {
            ProvisionError::new(ProvisionStep::Infrastructure, e.to_string())
        })?;

        match response.status() {
            // Already gone counts as torn down.
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(ProvisionError::new(
                ProvisionStep::Infrastructure,
                format!("teardown returned {status}"),
            )),
        }
    }

    async fn apply_scaling(
        &self,
        handle: &InfraHandle,
        replicas: u32,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let url = format!("{}/infrastructure/{}/scale", self.base_url, handle.id);
        debug!(handle = %handle.id, replicas, "applying scaling");

        let response = self
            .guarded(
                ProvisionStep::Infrastructure,
                cancel,
                self.client
                    .put(&url)
                    .json(&ScaleRequest { replicas })
                    .send(),
            )
            .await?;

        if !response.status().is_success() {
            return Err(ProvisionError::new(
                ProvisionStep::Infrastructure,
                format!("scaling returned {}", response.status()),
            ));
        }

        Ok(())
    }
}
