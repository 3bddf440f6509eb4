//! Delivery Worker (C6): builds and executes the outbound HTTP POST for a
//! message in `DELIVER`, and interprets the response. Does not itself
//! mutate message state — that's the State Manager's job (§4.5) — it only
//! reports what happened.

use std::collections::HashMap;

use crate::model::{Message, MessageStatus};
use crate::traits::webhook_client::{OutboundRequest, WebhookClient};

const RESERVED_HEADERS: [&str; 4] = ["done-message-id", "done-status", "done-retried", "user-agent"];

/// Forward headers, lowercased with any attempt to shadow a reserved
/// header name stripped, per §4.4/§6.1's "never override" rule.
fn forwarded_headers(message: &Message) -> HashMap<String, String> {
    message
        .payload
        .headers
        .forward
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .filter(|(k, _)| !RESERVED_HEADERS.contains(&k.as_str()))
        .collect()
}

pub fn build_request(message: &Message) -> OutboundRequest {
    let mut headers = forwarded_headers(message);
    headers.insert("Done-Message-Id".to_string(), message.id.clone());
    headers.insert(
        "Done-Status".to_string(),
        MessageStatus::Deliver.as_str().to_string(),
    );
    headers.insert("Done-Retried".to_string(), message.retried.to_string());
    headers.insert("User-Agent".to_string(), "Done Light".to_string());

    OutboundRequest {
        url: message.payload.url.clone(),
        headers,
        body: message.payload.data.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub status: Option<u16>,
    pub failure_message: Option<String>,
}

/// Performs the delivery attempt and classifies the result. HTTP 200/201
/// are success; anything else — non-success status, network error,
/// timeout, DNS failure — is failure.
pub async fn deliver(webhook: &dyn WebhookClient, message: &Message) -> DeliveryOutcome {
    let request = build_request(message);
    match webhook.send(request).await {
        Ok(response) if response.status == 200 || response.status == 201 => DeliveryOutcome {
            success: true,
            status: Some(response.status),
            failure_message: None,
        },
        Ok(response) => DeliveryOutcome {
            success: false,
            status: Some(response.status),
            failure_message: Some("invalid response status".to_string()),
        },
        Err(err) => DeliveryOutcome {
            success: false,
            status: err.status_code(),
            failure_message: Some(err.as_failure_message()),
        },
    }
}

/// A message that has just entered `DLQ` may carry a
/// `payload.headers.command["failure-callback"]` URL; attempt a single POST
/// there with the same body and forward headers. Failures here are logged
/// only and never change the message's state.
pub async fn send_failure_callback(webhook: &dyn WebhookClient, message: &Message) {
    let Some(url) = message.payload.headers.failure_callback() else {
        return;
    };

    let request = OutboundRequest {
        url: url.to_string(),
        headers: forwarded_headers(message),
        body: message.payload.data.clone(),
    };

    if let Err(err) = webhook.send(request).await {
        tracing::warn!(
            message_id = %message.id,
            url = %url,
            error = %err,
            "failure-callback delivery failed"
        );
    }
}
