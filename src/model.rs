//! Core domain types shared by every component: the message, its lifecycle
//! status, the audit log entry, the internal system event, and the stats
//! snapshot returned by the admin API.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY_SECS: i64 = 60;
pub const HTTP_TIMEOUT_SECS: u64 = 8;
pub const DNS_TIMEOUT_SECS: u64 = 4;

/// One of the seven lifecycle states a [`Message`] can be in. See
/// the transition table this type's methods enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "DELIVER")]
    Deliver,
    #[serde(rename = "SENT")]
    Sent,
    #[serde(rename = "RETRY")]
    Retry,
    #[serde(rename = "DLQ")]
    Dlq,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

pub const ALL_STATUSES: [MessageStatus; 7] = [
    MessageStatus::Created,
    MessageStatus::Queued,
    MessageStatus::Deliver,
    MessageStatus::Sent,
    MessageStatus::Retry,
    MessageStatus::Dlq,
    MessageStatus::Archived,
];

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Created => "CREATED",
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Deliver => "DELIVER",
            MessageStatus::Sent => "SENT",
            MessageStatus::Retry => "RETRY",
            MessageStatus::Dlq => "DLQ",
            MessageStatus::Archived => "ARCHIVED",
        }
    }

    /// Parses a status case-insensitively, matching the admin route's
    /// `/messages/by-status/<status>` contract.
    pub fn parse(s: &str) -> Option<MessageStatus> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Some(MessageStatus::Created),
            "QUEUED" => Some(MessageStatus::Queued),
            "DELIVER" => Some(MessageStatus::Deliver),
            "SENT" => Some(MessageStatus::Sent),
            "RETRY" => Some(MessageStatus::Retry),
            "DLQ" => Some(MessageStatus::Dlq),
            "ARCHIVED" => Some(MessageStatus::Archived),
            _ => None,
        }
    }

    /// `SENT`, `DLQ`, and `ARCHIVED` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::Dlq | MessageStatus::Archived)
    }

    /// Whether a store `update` moving from `self` to `next` is permitted
    /// by the state machine. A patch that leaves status unchanged is
    /// always permitted, since most patches touch other fields only.
    /// `ARCHIVED` is reachable from any non-terminal status (admin-only,
    /// outside the normal delivery flow).
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (MessageStatus::Created, MessageStatus::Deliver) => true,
            (MessageStatus::Created, MessageStatus::Queued) => true,
            (MessageStatus::Queued, MessageStatus::Deliver) => true,
            (MessageStatus::Retry, MessageStatus::Deliver) => true,
            (MessageStatus::Deliver, MessageStatus::Sent) => true,
            (MessageStatus::Deliver, MessageStatus::Retry) => true,
            (MessageStatus::Deliver, MessageStatus::Dlq) => true,
            (_, MessageStatus::Archived) => !self.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `payload.headers` split into the two recognized categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(default)]
    pub forward: HashMap<String, String>,
    #[serde(default)]
    pub command: HashMap<String, String>,
}

impl MessageHeaders {
    pub fn failure_callback(&self) -> Option<&str> {
        self.command.get("failure-callback").map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub headers: MessageHeaders,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One entry in a message's `last_errors` sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: MessagePayload,
    pub publish_at: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(default)]
    pub retried: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_errors: Vec<DeliveryFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::traits::message_store::MessageStore::create`]. Carries
/// an optional id/timestamps so the seeding utility can bypass the
/// server-derived defaults, per spec's requirement that callers who bypass
/// the normal create path may supply their own timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Option<String>,
    pub payload: MessagePayload,
    pub publish_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn incoming(payload: MessagePayload, publish_at: DateTime<Utc>) -> Self {
        NewMessage {
            id: None,
            payload,
            publish_at,
            status: MessageStatus::Created,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Partial update applied by [`crate::traits::message_store::MessageStore::update`].
/// Fields left `None` are preserved; `retry_at`/`delivered_at` use the
/// double-`Option` pattern so a patch can distinguish "leave alone" from
/// "clear this field".
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub status: Option<MessageStatus>,
    pub retried: Option<u32>,
    pub retry_at: Option<Option<DateTime<Utc>>>,
    pub delivered_at: Option<Option<DateTime<Utc>>>,
    pub append_errors: Vec<DeliveryFailure>,
    pub publish_at: Option<DateTime<Utc>>,
}

impl MessagePatch {
    pub fn status(status: MessageStatus) -> Self {
        MessagePatch {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub log_type: LogType,
    pub object: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub log_type: LogType,
    pub message_id: String,
    pub before_data: Option<serde_json::Value>,
    pub after_data: Option<serde_json::Value>,
}

/// The fields an ingress request needs before a `Message` exists: the id
/// is pre-assigned by the HTTP handler so it can be returned in the 201
/// response without waiting on the State Manager to persist it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRequest {
    pub id: String,
    pub payload: MessagePayload,
    pub publish_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SystemEventData {
    Ingress(IngressRequest),
    Store(StoreEventData),
    Message(Box<Message>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemEventType {
    #[serde(rename = "MESSAGE_RECEIVED")]
    MessageReceived,
    #[serde(rename = "MESSAGE_QUEUED")]
    MessageQueued,
    #[serde(rename = "MESSAGE_RETRY")]
    MessageRetry,
    #[serde(rename = "STORE_CREATE_EVENT")]
    StoreCreateEvent,
    #[serde(rename = "STORE_UPDATE_EVENT")]
    StoreUpdateEvent,
    #[serde(rename = "STORE_DELETE_EVENT")]
    StoreDeleteEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: String,
    pub event_type: SystemEventType,
    pub object: String,
    pub data: SystemEventData,
    pub created_at: DateTime<Utc>,
}

impl SystemEvent {
    pub fn new(event_type: SystemEventType, data: SystemEventData, now: DateTime<Utc>) -> Self {
        SystemEvent {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            event_type,
            object: "messages".to_string(),
            data,
            created_at: now,
        }
    }

    /// Derives the subject message/request this event applies to, per the
    /// per-event-type rule: deletes look at the before-image, create/update
    /// look at the after-image, everything else carries the subject directly.
    pub fn subject_message(&self) -> Option<&Message> {
        match &self.data {
            SystemEventData::Store(StoreEventData { before, after }) => {
                if self.event_type == SystemEventType::StoreDeleteEvent {
                    before.as_ref()
                } else {
                    after.as_ref()
                }
            }
            SystemEventData::Message(m) => Some(m),
            SystemEventData::Ingress(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub created: i64,
    pub queued: i64,
    pub deliver: i64,
    pub sent: i64,
    pub retry: i64,
    pub dlq: i64,
    pub archived: i64,
}

impl StatusCounts {
    pub fn get(&self, status: MessageStatus) -> i64 {
        match status {
            MessageStatus::Created => self.created,
            MessageStatus::Queued => self.queued,
            MessageStatus::Deliver => self.deliver,
            MessageStatus::Sent => self.sent,
            MessageStatus::Retry => self.retry,
            MessageStatus::Dlq => self.dlq,
            MessageStatus::Archived => self.archived,
        }
    }

    pub fn bump(&mut self, status: MessageStatus, delta: i64) {
        let field = match status {
            MessageStatus::Created => &mut self.created,
            MessageStatus::Queued => &mut self.queued,
            MessageStatus::Deliver => &mut self.deliver,
            MessageStatus::Sent => &mut self.sent,
            MessageStatus::Retry => &mut self.retry,
            MessageStatus::Dlq => &mut self.dlq,
            MessageStatus::Archived => &mut self.archived,
        };
        *field = (*field + delta).max(0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub incoming: i64,
    pub sent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: i64,
    pub by_status: StatusCounts,
    pub last_24h: i64,
    pub last_7d: i64,
    pub hourly_histogram: [i64; 24],
    pub daily_trend: Vec<DailyTrend>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_parse_and_display() {
        for status in ALL_STATUSES {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
            assert_eq!(MessageStatus::parse(&status.as_str().to_lowercase()), Some(status));
        }
        assert_eq!(MessageStatus::parse("not-a-status"), None);
    }

    #[test]
    fn status_counts_clamp_at_zero() {
        let mut counts = StatusCounts::default();
        counts.bump(MessageStatus::Created, -5);
        assert_eq!(counts.get(MessageStatus::Created), 0);
    }

    #[test]
    fn can_transition_to_matches_the_delivery_state_machine() {
        use MessageStatus::*;
        let allowed = [
            (Created, Deliver),
            (Created, Queued),
            (Queued, Deliver),
            (Retry, Deliver),
            (Deliver, Sent),
            (Deliver, Retry),
            (Deliver, Dlq),
        ];
        for (from, to) in allowed {
            assert!(from.can_transition_to(to), "{from} -> {to} should be allowed");
        }

        let refused = [(Created, Sent), (Queued, Sent), (Sent, Deliver), (Dlq, Retry), (Archived, Queued)];
        for (from, to) in refused {
            assert!(!from.can_transition_to(to), "{from} -> {to} should be refused");
        }

        assert!(Created.can_transition_to(Archived));
        assert!(!Sent.can_transition_to(Archived));

        for status in ALL_STATUSES {
            assert!(status.can_transition_to(status));
        }
    }
}
