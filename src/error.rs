//! Closed-sum error types per component, converted to HTTP responses only at
//! the boundary (`ApiError`). This replaces the source's tagged
//! result-with-string-reason convention.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("duplicate message id: {0}")]
    DuplicateId(String),
    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error("store backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("durable queue backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("network error: {0}")]
    Network(String),
    #[error("dns resolution failed: {0}")]
    Dns(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid response status")]
    InvalidStatus(u16),
}

impl WebhookError {
    /// The text recorded in a `DeliveryFailure.message`, carrying enough
    /// context to distinguish a transport failure from a non-success status.
    pub fn as_failure_message(&self) -> String {
        match self {
            WebhookError::InvalidStatus(_) => "invalid response status".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            WebhookError::InvalidStatus(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Crate-wide error surfaced by HTTP handlers, converted into the
/// `{message: "..."}` JSON body the admin/ingress routes promise.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => ApiError::NotFound(m),
            StoreError::DuplicateId(m) => ApiError::BadRequest(m),
            StoreError::InvalidTransition { .. } => ApiError::BadRequest(err.to_string()),
            StoreError::Backend(m) => ApiError::Internal(m),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
