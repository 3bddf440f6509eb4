//! Key-value `MessageStore` backend. Primary key is the message id; two
//! secondary indexes (`BY_STATUS`, `BY_PUBLISH_DATE`) are maintained
//! explicitly alongside the primary map, per the spec's key-value layout.
//! Durability comes from journaling every mutation through the shared
//! `WalJournal` and replaying it on open.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Message, MessagePatch, MessageStatus, NewMessage};
use crate::stores::wal_journal::WalJournal;
use crate::traits::message_store::MessageStore;

const STREAM: &str = "messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum MessageRecord {
    Upsert(Message),
    Delete { id: String },
}

#[derive(Default)]
struct Indexes {
    by_status: HashMap<MessageStatus, HashSet<String>>,
    by_date: HashMap<NaiveDate, HashSet<String>>,
}

impl Indexes {
    fn remove(&mut self, message: &Message) {
        if let Some(set) = self.by_status.get_mut(&message.status) {
            set.remove(&message.id);
        }
        let date = message.publish_at.date_naive();
        if let Some(set) = self.by_date.get_mut(&date) {
            set.remove(&message.id);
        }
    }

    fn insert(&mut self, message: &Message) {
        self.by_status
            .entry(message.status)
            .or_default()
            .insert(message.id.clone());
        self.by_date
            .entry(message.publish_at.date_naive())
            .or_default()
            .insert(message.id.clone());
    }
}

#[derive(Default)]
struct State {
    messages: HashMap<String, Message>,
    indexes: Indexes,
}

pub struct KvMessageStore {
    journal: Arc<WalJournal>,
    state: Mutex<State>,
}

impl KvMessageStore {
    pub fn open(journal: Arc<WalJournal>) -> Result<Self, StoreError> {
        let records: Vec<MessageRecord> = journal
            .read_all_json(STREAM)
            .map_err(StoreError::from)?;

        let mut state = State::default();
        for record in records {
            match record {
                MessageRecord::Upsert(message) => {
                    if let Some(prior) = state.messages.get(&message.id) {
                        state.indexes.remove(prior);
                    }
                    state.indexes.insert(&message);
                    state.messages.insert(message.id.clone(), message);
                }
                MessageRecord::Delete { id } => {
                    if let Some(prior) = state.messages.remove(&id) {
                        state.indexes.remove(&prior);
                    }
                }
            }
        }

        Ok(KvMessageStore {
            journal,
            state: Mutex::new(state),
        })
    }
}

impl MessageStore for KvMessageStore {
    fn create(&self, draft: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.state.lock().expect("kv message store mutex poisoned");

        let id = draft
            .id
            .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4()));
        if state.messages.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        let now = Utc::now();
        let message = Message {
            id: id.clone(),
            payload: draft.payload,
            publish_at: draft.publish_at,
            status: draft.status,
            retried: 0,
            retry_at: None,
            delivered_at: None,
            last_errors: Vec::new(),
            created_at: draft.created_at.unwrap_or(now),
            updated_at: draft.updated_at.unwrap_or(now),
        };

        self.journal
            .append_json(STREAM, &MessageRecord::Upsert(message.clone()))
            .map_err(StoreError::from)?;

        state.indexes.insert(&message);
        state.messages.insert(id, message.clone());
        Ok(message)
    }

    fn fetch_one(&self, id: &str) -> Result<Message, StoreError> {
        let state = self.state.lock().expect("kv message store mutex poisoned");
        state
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().expect("kv message store mutex poisoned");
        let mut out: Vec<Message> = state
            .indexes
            .by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().expect("kv message store mutex poisoned");
        let mut out: Vec<Message> = state
            .indexes
            .by_date
            .get(&date)
            .into_iter()
            .flatten()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect();
        out.sort_by(|a, b| a.publish_at.cmp(&b.publish_at));
        Ok(out)
    }

    fn update(&self, id: &str, patch: MessagePatch) -> Result<(Message, Message), StoreError> {
        let mut state = self.state.lock().expect("kv message store mutex poisoned");
        let before = state
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut after = before.clone();
        if let Some(status) = patch.status {
            if !before.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    from: before.status.as_str(),
                    to: status.as_str(),
                });
            }
            after.status = status;
        }
        if let Some(retried) = patch.retried {
            after.retried = retried;
        }
        if let Some(retry_at) = patch.retry_at {
            after.retry_at = retry_at;
        }
        if let Some(delivered_at) = patch.delivered_at {
            after.delivered_at = delivered_at;
        }
        if let Some(publish_at) = patch.publish_at {
            after.publish_at = publish_at;
        }
        after.last_errors.extend(patch.append_errors);
        after.updated_at = Utc::now();

        self.journal
            .append_json(STREAM, &MessageRecord::Upsert(after.clone()))
            .map_err(StoreError::from)?;

        state.indexes.remove(&before);
        state.indexes.insert(&after);
        state.messages.insert(id.to_string(), after.clone());

        Ok((before, after))
    }

    fn delete(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let mut state = self.state.lock().expect("kv message store mutex poisoned");
        let removed = state.messages.remove(id);
        if let Some(message) = &removed {
            self.journal
                .append_json(STREAM, &MessageRecord::Delete { id: id.to_string() })
                .map_err(StoreError::from)?;
            state.indexes.remove(message);
        }
        Ok(removed)
    }

    fn fetch_all(&self) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().expect("kv message store mutex poisoned");
        Ok(state.messages.values().cloned().collect())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv message store mutex poisoned");
        self.journal
            .append_reset_marker(STREAM)
            .map_err(StoreError::from)?;
        *state = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageHeaders;
    use crate::model::MessagePayload;

    fn journal() -> Arc<WalJournal> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(WalJournal::open(dir.path()).unwrap())
    }

    fn draft(url: &str) -> NewMessage {
        NewMessage::incoming(
            MessagePayload {
                headers: MessageHeaders::default(),
                url: url.to_string(),
                data: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn create_then_fetch_round_trips() {
        let store = KvMessageStore::open(journal()).unwrap();
        let created = store.create(draft("https://example.com/a")).unwrap();
        let fetched = store.fetch_one(&created.id).unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, MessageStatus::Created);
    }

    #[test]
    fn fetch_by_status_reflects_updates() {
        let store = KvMessageStore::open(journal()).unwrap();
        let created = store.create(draft("https://example.com/a")).unwrap();
        store
            .update(&created.id, MessagePatch::status(MessageStatus::Queued))
            .unwrap();

        assert!(store
            .fetch_by_status(MessageStatus::Created)
            .unwrap()
            .is_empty());
        assert_eq!(store.fetch_by_status(MessageStatus::Queued).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = KvMessageStore::open(journal()).unwrap();
        let mut d = draft("https://example.com/a");
        d.id = Some("msg_fixed".to_string());
        store.create(d.clone()).unwrap();
        let err = store.create(d).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[test]
    fn reset_clears_state_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(WalJournal::open(dir.path()).unwrap());
        let store = KvMessageStore::open(journal.clone()).unwrap();
        store.create(draft("https://example.com/a")).unwrap();
        store.reset().unwrap();
        assert!(store.fetch_all().unwrap().is_empty());

        let reopened = KvMessageStore::open(journal).unwrap();
        assert!(reopened.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn update_rejects_a_transition_the_state_machine_never_allows() {
        let store = KvMessageStore::open(journal()).unwrap();
        let created = store.create(draft("https://example.com/a")).unwrap();
        let err = store
            .update(&created.id, MessagePatch::status(MessageStatus::Sent))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.fetch_one(&created.id).unwrap().status, MessageStatus::Created);
    }

    #[test]
    fn replay_reconstructs_state_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(WalJournal::open(dir.path()).unwrap());
        let id = {
            let store = KvMessageStore::open(journal.clone()).unwrap();
            store.create(draft("https://example.com/a")).unwrap().id
        };

        let reopened = KvMessageStore::open(journal).unwrap();
        let fetched = reopened.fetch_one(&id).unwrap();
        assert_eq!(fetched.id, id);
    }
}
