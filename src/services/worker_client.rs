//! # Worker Client
//!
//! Outbound batch dispatch to worker processes. The worker answers the POST right
//! away and reports the translation later through the callback endpoint, so a 2xx
//! here only means "accepted".

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::messaging::DispatchRequest;

pub const INSTANCE_HEADER: &str = "X-Orchestrator-Instance";

#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// POST the batch to `{worker_url}/translate`
    async fn dispatch(&self, worker_url: &str, request: &DispatchRequest) -> OrchestratorResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
    instance_id: String,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration, instance_id: impl Into<String>) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            instance_id: instance_id.into(),
        })
    }
}

pub fn translate_endpoint(worker_url: &str) -> String {
    format!("{}/translate", worker_url.trim_end_matches('/'))
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn dispatch(&self, worker_url: &str, request: &DispatchRequest) -> OrchestratorResult<()> {
        let endpoint = translate_endpoint(worker_url);
        debug!(endpoint = %endpoint, batch = %request.session_id, "Dispatching batch");

        let response = self
            .client
            .post(&endpoint)
            .header(INSTANCE_HEADER, &self.instance_id)
            .json(request)
            .send()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(OrchestratorError::Remote {
            status: status.as_u16(),
            message: body.chars().take(512).collect(),
        })
    }
}
