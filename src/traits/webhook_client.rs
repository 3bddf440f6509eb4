//! Outbound HTTP delivery contract (C6). Mirrors the teacher's
//! `WebhookClient` trait: a single `async_trait` method, mockable in tests
//! via `mockall`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::WebhookError;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: u16,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// Performs the POST described by `request`, applying the component's
    /// fixed 8-second deadline and DNS-resolution precheck. Returns
    /// `Ok(OutboundResponse)` for *any* status code the transport
    /// completed, leaving 2xx/non-2xx classification to the caller so the
    /// caller can fold it into `WebhookError::InvalidStatus` uniformly.
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, WebhookError>;
}
