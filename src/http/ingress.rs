//! `POST /messages/<callback-url>`: parses the `Done-*` ingress headers,
//! pre-assigns the message id, and enqueues a `MESSAGE_RECEIVED` event
//! without waiting for the State Manager to actually create the message —
//! the id and `publish_at` the 201 response promises are computed here,
//! synchronously, and carried on the event so C5 creates the same id later.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::ApiError;
use crate::http::AppState;
use crate::model::{IngressRequest, MessageHeaders, MessagePayload, SystemEvent, SystemEventData, SystemEventType};

fn parse_delay(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.len() < 2 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let n: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Splits the recognized `Done-*` ingress headers into forward/command
/// buckets and resolves the message's `publish_at`, per §6.1's header
/// table: `Done-Not-Before` wins over `Done-Delay` when both are present;
/// neither present means "publish now".
pub fn parse_ingress_headers(headers: &HeaderMap, now: DateTime<Utc>) -> (MessageHeaders, DateTime<Utc>) {
    let mut forward = HashMap::new();
    let mut command = HashMap::new();
    let mut not_before: Option<DateTime<Utc>> = None;
    let mut delay: Option<Duration> = None;

    for (name, value) in headers {
        let lower = name.as_str().to_ascii_lowercase();
        let Some(rest) = lower.strip_prefix("done-") else {
            continue;
        };
        let Ok(value_str) = value.to_str() else {
            continue;
        };

        if rest == "not-before" {
            if let Ok(secs) = value_str.parse::<i64>() {
                not_before = DateTime::from_timestamp(secs, 0);
            }
        } else if rest == "delay" {
            delay = parse_delay(value_str);
        } else if let Some(forward_name) = rest.strip_prefix("forward-") {
            forward.insert(forward_name.to_string(), value_str.to_string());
        } else {
            command.insert(rest.to_string(), value_str.to_string());
        }
    }

    let publish_at = match not_before {
        Some(t) => t,
        None => match delay {
            Some(d) => now + chrono::Duration::from_std(d).unwrap_or_default(),
            None => now,
        },
    };

    (MessageHeaders { forward, command }, publish_at)
}

pub async fn create_message(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    if rest.is_empty() {
        return Err(ApiError::BadRequest("missing target callback url".to_string()));
    }
    let url = match uri.query() {
        Some(q) if !q.is_empty() => format!("{rest}?{q}"),
        _ => rest,
    };

    let data = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?)
    };

    let now = Utc::now();
    let (message_headers, publish_at) = parse_ingress_headers(&headers, now);
    let id = format!("msg_{}", uuid::Uuid::new_v4());

    let request = IngressRequest {
        id: id.clone(),
        payload: MessagePayload {
            headers: message_headers,
            url,
            data,
        },
        publish_at,
    };

    state
        .gateway
        .enqueue_ingress(SystemEvent::new(
            SystemEventType::MessageReceived,
            SystemEventData::Ingress(request),
            now,
        ))
        .map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id, "publish_at": publish_at }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn done_delay_offsets_publish_at() {
        let mut headers = HeaderMap::new();
        headers.insert("Done-Delay", HeaderValue::from_static("5s"));
        let now = Utc::now();
        let (_, publish_at) = parse_ingress_headers(&headers, now);
        assert_eq!(publish_at, now + chrono::Duration::seconds(5));
    }

    #[test]
    fn done_not_before_takes_priority_over_delay() {
        let mut headers = HeaderMap::new();
        let target = Utc::now() + chrono::Duration::hours(1);
        headers.insert("Done-Not-Before", HeaderValue::from_str(&target.timestamp().to_string()).unwrap());
        headers.insert("Done-Delay", HeaderValue::from_static("5s"));
        let (_, publish_at) = parse_ingress_headers(&headers, Utc::now());
        assert_eq!(publish_at.timestamp(), target.timestamp());
    }

    #[test]
    fn forward_and_command_headers_are_split() {
        let mut headers = HeaderMap::new();
        headers.insert("Done-Forward-X-Custom", HeaderValue::from_static("v"));
        headers.insert("Done-Failure-Callback", HeaderValue::from_static("https://fallback.example/f"));
        let (parsed, _) = parse_ingress_headers(&headers, Utc::now());
        assert_eq!(parsed.forward.get("x-custom").unwrap(), "v");
        assert_eq!(parsed.failure_callback(), Some("https://fallback.example/f"));
    }

    #[test]
    fn no_recognized_headers_publishes_immediately() {
        let headers = HeaderMap::new();
        let now = Utc::now();
        let (parsed, publish_at) = parse_ingress_headers(&headers, now);
        assert!(parsed.forward.is_empty());
        assert!(parsed.command.is_empty());
        assert_eq!(publish_at, now);
    }
}
