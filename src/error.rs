//! Domain-specific error types for ecosnap

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the ecosnap classification service
#[derive(Error, Debug)]
pub enum EcoSnapError {
    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    PayloadTooLarge { message: String },

    #[error("{message}")]
    ServiceUnavailable { message: String },

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("AI credits exhausted. Please add credits to continue.")]
    QuotaExhausted,

    #[error("{message}")]
    Upstream { message: String },

    #[error("Failed to parse classification result")]
    MalformedModelResponse { details: String },

    #[error("Invalid classification result")]
    InvalidModelResponse { details: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{message}")]
    NotFound { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl EcoSnapError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EcoSnapError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        EcoSnapError::Upstream {
            message: message.into(),
        }
    }

    /// HTTP status the error is surfaced with
    pub fn status(&self) -> StatusCode {
        match self {
            EcoSnapError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            EcoSnapError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EcoSnapError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            EcoSnapError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            EcoSnapError::Unauthorized => StatusCode::UNAUTHORIZED,
            EcoSnapError::NotFound { .. } => StatusCode::NOT_FOUND,
            EcoSnapError::ServiceUnavailable { .. }
            | EcoSnapError::Upstream { .. }
            | EcoSnapError::MalformedModelResponse { .. }
            | EcoSnapError::InvalidModelResponse { .. }
            | EcoSnapError::Storage { .. }
            | EcoSnapError::Config { .. }
            | EcoSnapError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EcoSnapError::InvalidInput { .. } => "invalid_input",
            EcoSnapError::PayloadTooLarge { .. } => "payload_too_large",
            EcoSnapError::ServiceUnavailable { .. } => "service_unavailable",
            EcoSnapError::RateLimited => "rate_limited",
            EcoSnapError::QuotaExhausted => "quota_exhausted",
            EcoSnapError::Upstream { .. } => "upstream_error",
            EcoSnapError::MalformedModelResponse { .. } => "malformed_model_response",
            EcoSnapError::InvalidModelResponse { .. } => "invalid_model_response",
            EcoSnapError::Unauthorized => "unauthorized",
            EcoSnapError::NotFound { .. } => "not_found",
            EcoSnapError::Storage { .. } => "storage",
            EcoSnapError::Config { .. } => "config",
            EcoSnapError::Internal { .. } => "internal",
        }
    }
}

impl From<anyhow::Error> for EcoSnapError {
    fn from(err: anyhow::Error) -> Self {
        EcoSnapError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EcoSnapError {
    fn from(err: serde_json::Error) -> Self {
        EcoSnapError::Internal {
            message: format!("Serialization error: {}", err),
        }
    }
}

impl From<reqwest::Error> for EcoSnapError {
    fn from(err: reqwest::Error) -> Self {
        EcoSnapError::Upstream {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<rusqlite::Error> for EcoSnapError {
    fn from(err: rusqlite::Error) -> Self {
        EcoSnapError::Storage {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for EcoSnapError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {:?}", self);
        } else {
            tracing::debug!(kind = self.kind(), "request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for ecosnap operations
pub type Result<T> = std::result::Result<T, EcoSnapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EcoSnapError::invalid_input("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EcoSnapError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            EcoSnapError::QuotaExhausted.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            EcoSnapError::upstream("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EcoSnapError::ServiceUnavailable {
                message: "AI service not configured".into()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_errors_hide_details() {
        let err = EcoSnapError::MalformedModelResponse {
            details: "no JSON object in reply: hello".into(),
        };
        assert_eq!(err.to_string(), "Failed to parse classification result");
        let err = EcoSnapError::InvalidModelResponse {
            details: "missing category".into(),
        };
        assert_eq!(err.to_string(), "Invalid classification result");
    }
}
