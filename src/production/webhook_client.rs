use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio::time::timeout;

use crate::error::WebhookError;
use crate::model::{DNS_TIMEOUT_SECS, HTTP_TIMEOUT_SECS};
use crate::traits::webhook_client::{OutboundRequest, OutboundResponse, WebhookClient};

/// `reqwest`-backed implementation of the delivery worker's outbound POST.
/// Adapted from the teacher's `ReqwestWebhookClient`; timeout shortened to
/// the 8-second delivery deadline and given an explicit DNS precheck ahead
/// of the request, since the teacher's client didn't need one.
pub struct ReqwestWebhookClient {
    client: reqwest::Client,
}

impl ReqwestWebhookClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("reqwest client configuration is static and always valid");
        ReqwestWebhookClient { client }
    }
}

impl Default for ReqwestWebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn validate_dns(url: &reqwest::Url) -> Result<(), WebhookError> {
    let host = url
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("missing host".to_string()))?;
    let port = url.port_or_known_default().unwrap_or(443);
    let lookup = timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        lookup_host((host, port)),
    )
    .await;
    match lookup {
        Err(_) => Err(WebhookError::Dns(format!("resolution of {host} timed out"))),
        Ok(Err(e)) => Err(WebhookError::Dns(format!("{host}: {e}"))),
        Ok(Ok(mut addrs)) => {
            if addrs.next().is_some() {
                Ok(())
            } else {
                Err(WebhookError::Dns(format!("{host} resolved to no addresses")))
            }
        }
    }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, WebhookError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;

        validate_dns(&url).await?;

        let mut builder = self.client.post(url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.header("Content-Type", "application/json").json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                WebhookError::Timeout
            } else if e.is_connect() || e.is_request() {
                WebhookError::Network(e.to_string())
            } else {
                WebhookError::Network(e.to_string())
            }
        })?;

        Ok(OutboundResponse {
            status: response.status().as_u16(),
        })
    }
}
