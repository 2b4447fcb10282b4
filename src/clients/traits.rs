use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EcoSnapError;

/// OpenAI-compatible chat-completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Subset of the chat-completion reply we read
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: Option<ChatReplyMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReplyMessage {
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice, if it has any
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway credentials are not configured")]
    NotConfigured,
    #[error("gateway rate limit exceeded")]
    RateLimited,
    #[error("gateway credits exhausted")]
    QuotaExhausted,
    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway reply had no content")]
    EmptyReply,
}

impl From<GatewayError> for EcoSnapError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => EcoSnapError::ServiceUnavailable {
                message: "AI service not configured".to_string(),
            },
            GatewayError::RateLimited => EcoSnapError::RateLimited,
            GatewayError::QuotaExhausted => EcoSnapError::QuotaExhausted,
            GatewayError::Status { .. } => EcoSnapError::upstream("AI classification failed"),
            GatewayError::Transport(message) => EcoSnapError::upstream(message),
            GatewayError::EmptyReply => EcoSnapError::upstream("No response from AI service"),
        }
    }
}

/// A multimodal chat-completion backend
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Whether credentials are present; checked before any call is attempted
    fn is_configured(&self) -> bool {
        true
    }

    /// Send one request and return the reply text of the first choice
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}
