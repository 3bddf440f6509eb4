//! Glues the Message Store (C1), Log Store (C2), Stats Service (C3), and
//! Durable Queue (C4) together for every write path, so "Stats updated in
//! lockstep with C1 writes" and "a STORE_*_EVENT is enqueued for every
//! transition" hold by construction rather than by each call site
//! remembering to do all four things.
//!
//! This is the redesign §9 asks for: the store write returns a value
//! (the before/after pair) and *this* layer enqueues the event, rather than
//! the store reaching back into the queue itself from inside its write
//! path. Per §5, writes are serialized — here with one coarse mutex rather
//! than a per-id lock, since admin reset already needs an exclusive section
//! and a single mutex trivially satisfies both.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::error::StoreError;
use crate::model::{
    Message, MessagePatch, MessageStatus, NewLogEntry, NewMessage, StatsSnapshot, StoreEventData,
    SystemEvent, SystemEventType,
};
use crate::traits::durable_queue::DurableQueue;
use crate::traits::log_store::LogStore;
use crate::traits::message_store::MessageStore;
use crate::traits::stats::StatsService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    Messages,
    Logs,
    All,
}

impl ResetScope {
    /// `None` means the match string is refused (the `migrations` case).
    pub fn parse(raw: Option<&str>) -> Option<ResetScope> {
        match raw {
            None | Some("") => Some(ResetScope::All),
            Some("messages") => Some(ResetScope::Messages),
            Some("logs") => Some(ResetScope::Logs),
            Some("migrations") => None,
            Some(_) => None,
        }
    }
}

pub struct StoreGateway {
    messages: std::sync::Arc<dyn MessageStore>,
    logs: std::sync::Arc<dyn LogStore>,
    stats: std::sync::Arc<dyn StatsService>,
    queue: std::sync::Arc<dyn DurableQueue>,
    logging_enabled: bool,
    write_lock: Mutex<()>,
}

impl StoreGateway {
    pub fn new(
        messages: std::sync::Arc<dyn MessageStore>,
        logs: std::sync::Arc<dyn LogStore>,
        stats: std::sync::Arc<dyn StatsService>,
        queue: std::sync::Arc<dyn DurableQueue>,
        logging_enabled: bool,
    ) -> Self {
        StoreGateway {
            messages,
            logs,
            stats,
            queue,
            logging_enabled,
            write_lock: Mutex::new(()),
        }
    }

    pub fn create(&self, draft: NewMessage) -> Result<Message, StoreError> {
        let _guard = self.write_lock.lock().expect("store gateway mutex poisoned");
        let message = self.messages.create(draft)?;

        self.stats.increment(message.status, message.created_at)?;

        if self.logging_enabled {
            self.logs.create(NewLogEntry {
                log_type: crate::model::LogType::Create,
                message_id: message.id.clone(),
                before_data: None,
                after_data: Some(serde_json::to_value(&message).expect("Message always serializes")),
            })?;
        }

        self.queue
            .enqueue(
                SystemEvent::new(
                    SystemEventType::StoreCreateEvent,
                    StoreEventData {
                        before: None,
                        after: Some(message.clone()),
                    }
                    .into(),
                    Utc::now(),
                ),
                None,
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(message)
    }

    pub fn update(&self, id: &str, patch: MessagePatch) -> Result<Message, StoreError> {
        let _guard = self.write_lock.lock().expect("store gateway mutex poisoned");
        let (before, after) = self.messages.update(id, patch)?;
        let now = Utc::now();

        if before.status != after.status {
            self.stats.decrement(before.status, now)?;
            self.stats.increment(after.status, now)?;
        }

        if self.logging_enabled {
            self.logs.create(NewLogEntry {
                log_type: crate::model::LogType::Update,
                message_id: after.id.clone(),
                before_data: Some(serde_json::to_value(&before).expect("Message always serializes")),
                after_data: Some(serde_json::to_value(&after).expect("Message always serializes")),
            })?;
        }

        // Always enqueued, even when the patch didn't change status — an
        // open question in the source resolved conservatively in favor of
        // audit completeness (see DESIGN.md).
        self.queue
            .enqueue(
                SystemEvent::new(
                    SystemEventType::StoreUpdateEvent,
                    StoreEventData {
                        before: Some(before),
                        after: Some(after.clone()),
                    }
                    .into(),
                    now,
                ),
                None,
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(after)
    }

    /// Enqueues a delayed `MESSAGE_QUEUED`/`MESSAGE_RETRY` follow-up on
    /// C4. Kept separate from `update` since the State Manager, not this
    /// gateway, decides when a delayed re-entry is needed.
    pub fn enqueue_delayed(
        &self,
        event_type: SystemEventType,
        message: Message,
        delay: Duration,
    ) -> Result<(), StoreError> {
        self.queue
            .enqueue(
                SystemEvent::new(event_type, crate::model::SystemEventData::Message(Box::new(message)), Utc::now()),
                Some(delay),
            )
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn enqueue_ingress(&self, event: SystemEvent) -> Result<(), StoreError> {
        self.queue
            .enqueue(event, None)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().expect("store gateway mutex poisoned");
        let removed = self.messages.delete(id)?;
        let Some(message) = removed else {
            return Ok(false);
        };
        let now = Utc::now();

        self.stats.record_delete(message.status, now)?;

        if self.logging_enabled {
            self.logs.create(NewLogEntry {
                log_type: crate::model::LogType::Delete,
                message_id: message.id.clone(),
                before_data: Some(serde_json::to_value(&message).expect("Message always serializes")),
                after_data: None,
            })?;
        }

        self.queue
            .enqueue(
                SystemEvent::new(
                    SystemEventType::StoreDeleteEvent,
                    StoreEventData {
                        before: Some(message),
                        after: None,
                    }
                    .into(),
                    now,
                ),
                None,
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(true)
    }

    pub fn fetch_one(&self, id: &str) -> Result<Message, StoreError> {
        self.messages.fetch_one(id)
    }

    pub fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>, StoreError> {
        self.messages.fetch_by_status(status)
    }

    pub fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Message>, StoreError> {
        self.messages.fetch_by_date(date)
    }

    pub fn fetch_all(&self) -> Result<Vec<Message>, StoreError> {
        self.messages.fetch_all()
    }

    pub fn stats_snapshot(&self) -> Result<StatsSnapshot, StoreError> {
        self.stats.get()
    }

    pub fn logs_for_message(&self, message_id: &str) -> Result<Vec<crate::model::LogEntry>, StoreError> {
        self.logs.fetch_by_message_id(message_id)
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<crate::model::LogEntry>, StoreError> {
        self.logs.fetch_all(limit)
    }

    /// Rebuilds the Stats Service from the Message Store, the documented
    /// recovery path for a crash between a message write and its counter
    /// write.
    pub fn reconcile_stats(&self) -> Result<(), StoreError> {
        let messages = self.messages.fetch_all()?;
        self.stats.initialize_from_messages(&messages)
    }

    pub fn reset(&self, scope: ResetScope) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("store gateway mutex poisoned");
        match scope {
            ResetScope::Messages => {
                self.messages.reset()?;
                self.logs.reset()?;
                self.stats.reset()?;
            }
            ResetScope::Logs => {
                self.logs.reset()?;
            }
            ResetScope::All => {
                self.messages.reset()?;
                self.logs.reset()?;
                self.stats.reset()?;
            }
        }
        Ok(())
    }
}

impl From<StoreEventData> for crate::model::SystemEventData {
    fn from(data: StoreEventData) -> Self {
        crate::model::SystemEventData::Store(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::InMemoryDurableQueue;
    use crate::model::{MessageHeaders, MessagePayload};
    use crate::stores::kv::{KvLogStore, KvMessageStore, KvStatsService};
    use crate::stores::WalJournal;
    use std::sync::Arc;

    fn gateway(logging_enabled: bool) -> StoreGateway {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(WalJournal::open(dir.path()).unwrap());
        StoreGateway::new(
            Arc::new(KvMessageStore::open(journal.clone()).unwrap()),
            Arc::new(KvLogStore::open(journal).unwrap()),
            Arc::new(KvStatsService::new()),
            Arc::new(InMemoryDurableQueue::new()),
            logging_enabled,
        )
    }

    fn draft() -> NewMessage {
        NewMessage::incoming(
            MessagePayload {
                headers: MessageHeaders::default(),
                url: "https://example.com".to_string(),
                data: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn create_bumps_stats_and_enqueues_store_create_event() {
        let gw = gateway(false);
        let message = gw.create(draft()).unwrap();
        assert_eq!(gw.stats_snapshot().unwrap().total, 1);
        assert_eq!(message.status, MessageStatus::Created);
    }

    #[test]
    fn logging_disabled_skips_log_entries() {
        let gw = gateway(false);
        let message = gw.create(draft()).unwrap();
        assert!(gw.logs_for_message(&message.id).unwrap().is_empty());
    }

    #[test]
    fn logging_enabled_records_create_and_update() {
        let gw = gateway(true);
        let message = gw.create(draft()).unwrap();
        gw.update(&message.id, MessagePatch::status(MessageStatus::Deliver)).unwrap();
        let logs = gw.logs_for_message(&message.id).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn delete_decrements_total_but_create_and_update_do_not() {
        let gw = gateway(false);
        let message = gw.create(draft()).unwrap();
        gw.update(&message.id, MessagePatch::status(MessageStatus::Deliver)).unwrap();
        assert_eq!(gw.stats_snapshot().unwrap().total, 1);
        gw.delete(&message.id).unwrap();
        assert_eq!(gw.stats_snapshot().unwrap().total, 0);
    }

    #[test]
    fn reset_messages_also_clears_logs() {
        let gw = gateway(true);
        let message = gw.create(draft()).unwrap();
        gw.reset(ResetScope::Messages).unwrap();
        assert!(gw.fetch_one(&message.id).is_err());
        assert!(gw.recent_logs(100).unwrap().is_empty());
    }
}
