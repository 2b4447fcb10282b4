use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error};

use crate::clients::traits::{ChatGateway, ChatRequest, ChatResponse, GatewayError};
use crate::config::Config;

/// Chat-completion gateway reached over HTTPS with a bearer key.
///
/// One request per call, no retries: every failure goes straight back to the
/// caller.
#[derive(Debug, Clone)]
pub struct HttpChatGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpChatGateway {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build reqwest client with timeout")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.gateway.base_url,
            config.runtime.api_key.clone(),
            Duration::from_millis(config.gateway.timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Classify a non-success upstream status. Only the status matters, never the body.
pub fn map_status(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        StatusCode::PAYMENT_REQUIRED => GatewayError::QuotaExhausted,
        other => GatewayError::Status {
            status: other.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::NotConfigured)?;

        debug!(
            "Calling chat gateway (model={}, temperature={})",
            request.model, request.temperature
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat gateway error {}: {}", status, error_text);
            return Err(map_status(status, error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to decode gateway reply: {}", e)))?;

        match body.first_text() {
            Some(text) => {
                debug!("Model reply: {}", text);
                Ok(text.to_string())
            }
            None => {
                error!("No response from AI");
                Err(GatewayError::EmptyReply)
            }
        }
    }
}
