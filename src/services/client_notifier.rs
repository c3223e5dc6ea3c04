use async_trait::async_trait;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::messaging::ClientNotification;

/// Best-effort completion callback to the submitting client
#[async_trait]
pub trait ClientNotifier: Send + Sync {
    async fn notify(&self, callback_url: &str, notification: &ClientNotification) -> OrchestratorResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpClientNotifier {
    client: reqwest::Client,
}

impl HttpClientNotifier {
    pub fn new(timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ClientNotifier for HttpClientNotifier {
    async fn notify(&self, callback_url: &str, notification: &ClientNotification) -> OrchestratorResult<()> {
        let response = self
            .client
            .post(callback_url)
            .json(notification)
            .send()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Remote {
                status: response.status().as_u16(),
                message: "client callback rejected".to_string(),
            });
        }
        Ok(())
    }
}
