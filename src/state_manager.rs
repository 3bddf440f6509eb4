//! State Manager (C5): the sole consumer of the Durable Queue, and the only
//! component that decides a message's next status. Every other component
//! only ever *reports* what happened (an HTTP POST arrived, a delivery
//! attempt succeeded or failed); this is where that gets turned into a
//! status transition.
//!
//! Dispatch is keyed first on the event type (`MESSAGE_RECEIVED` creates,
//! `MESSAGE_QUEUED`/`MESSAGE_RETRY` both mean "this message should be
//! attempted now") and otherwise on the *current* status of the event's
//! subject message, so a `STORE_CREATE_EVENT` and a `STORE_UPDATE_EVENT`
//! land in the same branch whenever they carry the same status — which is
//! what lets the Daily Activator's `CREATED -> QUEUED` promotion reuse the
//! exact same "schedule the delayed wake-up" logic that the direct
//! same-day path uses, instead of needing its own copy of it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::delivery_worker::{deliver, send_failure_callback};
use crate::model::{
    DeliveryFailure, Message, MessagePatch, MessageStatus, NewMessage, SystemEvent, SystemEventData,
    SystemEventType, MAX_RETRIES, RETRY_DELAY_SECS,
};
use crate::store_gateway::StoreGateway;
use crate::traits::durable_queue::DurableQueue;
use crate::traits::webhook_client::WebhookClient;

fn delay_until(target: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Handles the `MESSAGE_RECEIVED` event: the one case where there's no
/// existing message to dispatch on yet. Creates it using the id the HTTP
/// handler already promised the caller in its 201 response.
async fn handle_ingress(gateway: &StoreGateway, event: &SystemEvent) -> Result<(), String> {
    let SystemEventData::Ingress(request) = &event.data else {
        return Err("MESSAGE_RECEIVED event carried no ingress payload".to_string());
    };

    gateway
        .create(NewMessage {
            id: Some(request.id.clone()),
            payload: request.payload.clone(),
            publish_at: request.publish_at,
            status: MessageStatus::Created,
            created_at: None,
            updated_at: None,
        })
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Handles `MESSAGE_QUEUED`/`MESSAGE_RETRY`: the message's wake-up has
/// arrived, so move it to `DELIVER` and let the next poll's
/// `STORE_UPDATE_EVENT` reprocessing pick up the actual delivery attempt.
async fn handle_wakeup(gateway: &StoreGateway, event: &SystemEvent) -> Result<(), String> {
    let Some(message) = event.subject_message() else {
        return Err("wake-up event carried no subject message".to_string());
    };

    match message.status {
        MessageStatus::Sent | MessageStatus::Archived | MessageStatus::Dlq => Ok(()),
        _ => gateway
            .update(&message.id, MessagePatch::status(MessageStatus::Deliver))
            .map(|_| ())
            .map_err(|e| e.to_string()),
    }
}

/// Handles a delivery attempt for a message currently in `DELIVER`, and
/// applies the resulting `SENT`/`RETRY`/`DLQ` transition.
async fn handle_deliver(
    gateway: &StoreGateway,
    webhook: &dyn WebhookClient,
    message: &Message,
) -> Result<(), String> {
    let outcome = deliver(webhook, message).await;
    let now = Utc::now();

    if outcome.success {
        gateway
            .update(
                &message.id,
                MessagePatch {
                    status: Some(MessageStatus::Sent),
                    delivered_at: Some(Some(now)),
                    ..Default::default()
                },
            )
            .map_err(|e| e.to_string())?;
        return Ok(());
    }

    let failure = DeliveryFailure {
        url: message.payload.url.clone(),
        status: outcome.status,
        message: outcome.failure_message.unwrap_or_else(|| "delivery failed".to_string()),
        created_at: now,
    };

    if message.retried < MAX_RETRIES {
        let retry_at = now + chrono::Duration::seconds(RETRY_DELAY_SECS);
        let updated = gateway
            .update(
                &message.id,
                MessagePatch {
                    status: Some(MessageStatus::Retry),
                    retried: Some(message.retried + 1),
                    retry_at: Some(Some(retry_at)),
                    append_errors: vec![failure],
                    ..Default::default()
                },
            )
            .map_err(|e| e.to_string())?;

        gateway
            .enqueue_delayed(
                SystemEventType::MessageRetry,
                updated,
                delay_until(retry_at, now),
            )
            .map_err(|e| e.to_string())
    } else {
        let updated = gateway
            .update(
                &message.id,
                MessagePatch {
                    status: Some(MessageStatus::Dlq),
                    append_errors: vec![failure],
                    ..Default::default()
                },
            )
            .map_err(|e| e.to_string())?;

        send_failure_callback(webhook, &updated).await;
        Ok(())
    }
}

/// Schedules the delayed `MESSAGE_QUEUED` for a message that just became
/// `QUEUED`, regardless of whether it arrived there via the direct
/// same-day `CREATED -> QUEUED` transition or the Daily Activator's
/// promotion of a message whose publish date has arrived.
fn schedule_queued_wakeup(gateway: &StoreGateway, message: &Message) -> Result<(), String> {
    let now = Utc::now();
    gateway
        .enqueue_delayed(
            SystemEventType::MessageQueued,
            message.clone(),
            delay_until(message.publish_at, now),
        )
        .map_err(|e| e.to_string())
}

/// Dispatches on the event's subject current status, per §4.3/§4.5's
/// status-driven table. Shared by `STORE_CREATE_EVENT` and
/// `STORE_UPDATE_EVENT` alike, since both just mean "re-enter the state
/// machine for whatever status this message is now in".
async fn dispatch_on_status(
    gateway: &StoreGateway,
    webhook: &dyn WebhookClient,
    message: &Message,
) -> Result<(), String> {
    match message.status {
        MessageStatus::Created => {
            let now = Utc::now();
            if message.publish_at <= now {
                gateway
                    .update(&message.id, MessagePatch::status(MessageStatus::Deliver))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            } else if message.publish_at.date_naive() == now.date_naive() {
                gateway
                    .update(&message.id, MessagePatch::status(MessageStatus::Queued))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            } else {
                // Scheduled for a later date: stays CREATED until a future
                // Daily Activator sweep promotes it.
                Ok(())
            }
        }
        MessageStatus::Queued => schedule_queued_wakeup(gateway, message),
        MessageStatus::Deliver => handle_deliver(gateway, webhook, message).await,
        MessageStatus::Sent | MessageStatus::Archived | MessageStatus::Dlq => Ok(()),
        MessageStatus::Retry => Ok(()),
    }
}

/// Processes exactly one claimed queue entry. Pure aside from its
/// `gateway`/`webhook` dependencies, and fully testable without a running
/// consumer loop.
pub async fn process_event(
    gateway: &StoreGateway,
    webhook: &dyn WebhookClient,
    event: &SystemEvent,
) -> Result<(), String> {
    match event.event_type {
        SystemEventType::MessageReceived => handle_ingress(gateway, event).await,
        SystemEventType::MessageQueued | SystemEventType::MessageRetry => {
            handle_wakeup(gateway, event).await
        }
        SystemEventType::StoreDeleteEvent => Ok(()),
        SystemEventType::StoreCreateEvent | SystemEventType::StoreUpdateEvent => {
            match event.subject_message() {
                Some(message) => dispatch_on_status(gateway, webhook, message).await,
                None => Err("store event carried no subject message".to_string()),
            }
        }
    }
}

/// Claims and processes up to `limit` ready entries. Returns the number
/// successfully acked. A handler error is logged and the entry is left
/// unacked, so it's reclaimed and retried on a later poll.
pub async fn process_batch(
    queue: &dyn DurableQueue,
    gateway: &StoreGateway,
    webhook: &dyn WebhookClient,
    limit: usize,
) -> usize {
    let entries = match queue.claim_ready(limit) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(error = %e, "failed to claim queue entries");
            return 0;
        }
    };

    let mut processed = 0;
    for entry in entries {
        match process_event(gateway, webhook, &entry.event).await {
            Ok(()) => {
                if let Err(e) = queue.ack(&entry.entry_id) {
                    tracing::error!(error = %e, entry_id = %entry.entry_id, "failed to ack queue entry");
                } else {
                    processed += 1;
                }
            }
            Err(reason) => {
                tracing::warn!(
                    event_id = %entry.event.id,
                    event_type = ?entry.event.event_type,
                    reason = %reason,
                    "event processing failed, will retry on next poll"
                );
            }
        }
    }
    processed
}

/// Spawns the State Manager's consumer loop.
pub fn spawn_state_manager(
    queue: Arc<dyn DurableQueue>,
    gateway: Arc<StoreGateway>,
    webhook: Arc<dyn WebhookClient>,
    poll_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_ms = poll_interval.as_millis(), "state manager started");
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            process_batch(&*queue, &*gateway, &*webhook, 50).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{InMemoryDurableQueue, RecordedWebhookClient, WebhookBehavior};
    use crate::model::{MessageHeaders, MessagePayload};
    use crate::stores::kv::{KvLogStore, KvMessageStore, KvStatsService};
    use crate::stores::WalJournal;
    use std::sync::Arc as StdArc;

    fn harness() -> (StdArc<StoreGateway>, StdArc<InMemoryDurableQueue>) {
        let dir = tempfile::tempdir().unwrap();
        let journal = StdArc::new(WalJournal::open(dir.path()).unwrap());
        let queue = StdArc::new(InMemoryDurableQueue::new());
        let gateway = StdArc::new(StoreGateway::new(
            StdArc::new(KvMessageStore::open(journal.clone()).unwrap()),
            StdArc::new(KvLogStore::open(journal).unwrap()),
            StdArc::new(KvStatsService::new()),
            queue.clone(),
            true,
        ));
        (gateway, queue)
    }

    fn ingress_event(url: &str, publish_at: chrono::DateTime<Utc>) -> SystemEvent {
        let request = crate::model::IngressRequest {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            payload: MessagePayload {
                headers: MessageHeaders::default(),
                url: url.to_string(),
                data: None,
            },
            publish_at,
        };
        SystemEvent::new(
            SystemEventType::MessageReceived,
            SystemEventData::Ingress(request),
            Utc::now(),
        )
    }

    async fn drain(gateway: &StoreGateway, queue: &InMemoryDurableQueue, webhook: &dyn WebhookClient, rounds: usize) {
        for _ in 0..rounds {
            process_batch(queue, gateway, webhook, 50).await;
        }
    }

    #[tokio::test]
    async fn immediate_message_is_delivered_on_first_drain() {
        let (gateway, queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::AlwaysSucceed { status: 200 });
        queue.enqueue(ingress_event("https://example.com/a", Utc::now()), None).unwrap();

        drain(&gateway, &queue, &webhook, 4).await;

        let messages = gateway.fetch_all().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Sent);
        assert_eq!(webhook.call_count(), 1);
    }

    #[tokio::test]
    async fn future_publish_at_is_queued_not_delivered_immediately() {
        let (gateway, queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::AlwaysSucceed { status: 200 });
        let future = Utc::now() + chrono::Duration::hours(2);
        queue.enqueue(ingress_event("https://example.com/a", future), None).unwrap();

        drain(&gateway, &queue, &webhook, 4).await;

        let messages = gateway.fetch_all().unwrap();
        assert_eq!(messages[0].status, MessageStatus::Queued);
        assert_eq!(webhook.call_count(), 0);
        // The delayed MESSAGE_QUEUED exists but isn't due yet.
        assert!(queue.claim_ready(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn multi_day_future_publish_at_stays_created_for_daily_activator() {
        let (gateway, queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::AlwaysSucceed { status: 200 });
        let future = Utc::now() + chrono::Duration::days(3);
        queue.enqueue(ingress_event("https://example.com/a", future), None).unwrap();

        drain(&gateway, &queue, &webhook, 4).await;

        let messages = gateway.fetch_all().unwrap();
        assert_eq!(messages[0].status, MessageStatus::Created);
        assert_eq!(webhook.call_count(), 0);
    }

    /// Mirrors the State Manager's own path back into `DELIVER`: a
    /// `MESSAGE_RETRY` wake-up event re-enters `handle_wakeup`, which is
    /// what actually performs the `RETRY -> DELIVER` transition between
    /// attempts (`handle_deliver` only ever runs against a message
    /// currently in `DELIVER`).
    async fn redeliver(gateway: &StoreGateway, message: &Message) -> Message {
        let event = SystemEvent::new(
            SystemEventType::MessageRetry,
            SystemEventData::Message(Box::new(message.clone())),
            Utc::now(),
        );
        handle_wakeup(gateway, &event).await.unwrap();
        gateway.fetch_one(&message.id).unwrap()
    }

    #[tokio::test]
    async fn exhausting_retries_moves_to_dlq_and_fires_failure_callback() {
        let (gateway, _queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::AlwaysFail(
            crate::error::WebhookError::Network("refused".to_string()),
        ));

        let mut headers = MessageHeaders::default();
        headers
            .command
            .insert("failure-callback".to_string(), "https://example.com/fail".to_string());

        let mut message = gateway
            .create(NewMessage {
                id: None,
                payload: MessagePayload {
                    headers,
                    url: "https://example.com/a".to_string(),
                    data: None,
                },
                publish_at: Utc::now(),
                status: MessageStatus::Deliver,
                created_at: None,
                updated_at: None,
            })
            .unwrap();

        // retried: 0 -> 1 -> 2 -> 3 (RETRY each time, re-entering DELIVER via
        // the wake-up in between), then the 4th attempt with retried already
        // at the cap transitions straight to DLQ.
        for i in 0..4 {
            if i > 0 {
                message = redeliver(&gateway, &message).await;
            }
            handle_deliver(&gateway, &webhook, &message).await.unwrap();
            message = gateway.fetch_one(&message.id).unwrap();
        }

        assert_eq!(message.status, MessageStatus::Dlq);
        assert_eq!(message.retried, MAX_RETRIES);
        assert_eq!(message.last_errors.len(), 4);
        // 4 delivery attempts plus one failure-callback POST.
        assert_eq!(webhook.call_count(), 5);
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_recovers_through_two_retries() {
        let (gateway, _queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::FailNTimesThenSucceed {
            failures: 2,
            error: crate::error::WebhookError::InvalidStatus(503),
            success_status: 200,
        });

        let mut message = gateway
            .create(NewMessage {
                id: None,
                payload: MessagePayload {
                    headers: MessageHeaders::default(),
                    url: "https://example.com/a".to_string(),
                    data: None,
                },
                publish_at: Utc::now(),
                status: MessageStatus::Deliver,
                created_at: None,
                updated_at: None,
            })
            .unwrap();

        handle_deliver(&gateway, &webhook, &message).await.unwrap();
        message = gateway.fetch_one(&message.id).unwrap();
        assert_eq!(message.status, MessageStatus::Retry);
        assert_eq!(message.retried, 1);

        message = redeliver(&gateway, &message).await;
        handle_deliver(&gateway, &webhook, &message).await.unwrap();
        message = gateway.fetch_one(&message.id).unwrap();
        assert_eq!(message.status, MessageStatus::Retry);
        assert_eq!(message.retried, 2);

        message = redeliver(&gateway, &message).await;
        handle_deliver(&gateway, &webhook, &message).await.unwrap();
        message = gateway.fetch_one(&message.id).unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.last_errors.len(), 2);
        assert_eq!(webhook.call_count(), 3);
    }

    #[tokio::test]
    async fn delete_event_is_a_pure_noop() {
        let (gateway, queue) = harness();
        let webhook = RecordedWebhookClient::new(WebhookBehavior::AlwaysSucceed { status: 200 });
        let event = SystemEvent::new(
            SystemEventType::StoreDeleteEvent,
            SystemEventData::Store(crate::model::StoreEventData { before: None, after: None }),
            Utc::now(),
        );
        assert!(process_event(&gateway, &webhook, &event).await.is_ok());
    }
}
