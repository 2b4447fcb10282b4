//! The classification proxy: one image in, one gateway call, one result out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::classification::{ClassificationResult, parse_model_reply};
use crate::clients::ChatGateway;
use crate::config::Config;
use crate::error::{EcoSnapError, Result};
use crate::image::ImagePayload;
use crate::prompts::classification_request;

/// Stateless classifier. Holds only configuration and the gateway handle.
#[derive(Clone)]
pub struct Classifier {
    gateway: Arc<dyn ChatGateway>,
    model: String,
    temperature: f32,
    max_image_bytes: usize,
}

impl Classifier {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: &Config) -> Self {
        Self {
            gateway,
            model: config.gateway.model.clone(),
            temperature: config.gateway.temperature,
            max_image_bytes: config.limits.max_image_bytes,
        }
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// Classify a client payload as received on the wire.
    ///
    /// Input is validated and the credential checked before anything is sent
    /// upstream.
    pub async fn classify_base64(&self, image_base64: Option<&str>) -> Result<ClassificationResult> {
        let raw = image_base64
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EcoSnapError::invalid_input("Image data is required"))?;
        let payload = ImagePayload::parse(raw, self.max_image_bytes)?;
        self.classify(&payload).await
    }

    pub async fn classify(&self, payload: &ImagePayload) -> Result<ClassificationResult> {
        if !self.gateway.is_configured() {
            warn!("AI gateway API key is not configured");
            return Err(EcoSnapError::ServiceUnavailable {
                message: "AI service not configured".to_string(),
            });
        }

        info!(
            "Calling AI gateway for waste classification ({}, {} bytes)",
            payload.mime(),
            payload.decoded_len()
        );

        let request = classification_request(&self.model, self.temperature, &payload.to_data_url());
        let reply = self.gateway.complete(&request).await?;

        let result = parse_model_reply(&reply).inspect_err(|e| {
            warn!(kind = e.kind(), "Rejected model reply: {:?}", e);
        })?;

        info!(
            "Classified as {} (confidence={}, credits={})",
            result.category, result.confidence, result.credits_earned
        );
        Ok(result)
    }
}
