use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{LogEntry, NewLogEntry};
#[cfg(test)]
use crate::model::LogType;
use crate::stores::wal_journal::WalJournal;
use crate::traits::log_store::LogStore;

const STREAM: &str = "logs";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord(LogEntry);

pub struct KvLogStore {
    journal: Arc<WalJournal>,
    entries: Mutex<Vec<LogEntry>>,
}

impl KvLogStore {
    pub fn open(journal: Arc<WalJournal>) -> Result<Self, StoreError> {
        let records: Vec<LogRecord> = journal.read_all_json(STREAM).map_err(StoreError::from)?;
        Ok(KvLogStore {
            journal,
            entries: Mutex::new(records.into_iter().map(|r| r.0).collect()),
        })
    }
}

impl LogStore for KvLogStore {
    fn create(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let log_entry = LogEntry {
            id: format!("log_{}", uuid::Uuid::new_v4()),
            log_type: entry.log_type,
            object: "messages".to_string(),
            message_id: entry.message_id,
            before_data: entry.before_data,
            after_data: entry.after_data,
            created_at: chrono::Utc::now(),
        };

        self.journal
            .append_json(STREAM, &LogRecord(log_entry.clone()))
            .map_err(StoreError::from)?;

        self.entries
            .lock()
            .expect("kv log store mutex poisoned")
            .push(log_entry.clone());
        Ok(log_entry)
    }

    fn fetch_by_message_id(&self, message_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let entries = self.entries.lock().expect("kv log store mutex poisoned");
        let mut out: Vec<LogEntry> = entries
            .iter()
            .filter(|e| e.message_id == message_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn fetch_all(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        let entries = self.entries.lock().expect("kv log store mutex poisoned");
        let mut out = entries.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.journal
            .append_reset_marker(STREAM)
            .map_err(StoreError::from)?;
        self.entries.lock().expect("kv log store mutex poisoned").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal() -> Arc<WalJournal> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(WalJournal::open(dir.path()).unwrap())
    }

    #[test]
    fn fetch_all_orders_newest_first_and_respects_limit() {
        let store = KvLogStore::open(journal()).unwrap();
        for i in 0..3 {
            store
                .create(NewLogEntry {
                    log_type: LogType::Create,
                    message_id: format!("msg_{i}"),
                    before_data: None,
                    after_data: None,
                })
                .unwrap();
        }
        let all = store.fetch_all(2).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);
    }

    #[test]
    fn fetch_by_message_id_is_chronological() {
        let store = KvLogStore::open(journal()).unwrap();
        store
            .create(NewLogEntry {
                log_type: LogType::Create,
                message_id: "msg_1".to_string(),
                before_data: None,
                after_data: None,
            })
            .unwrap();
        store
            .create(NewLogEntry {
                log_type: LogType::Update,
                message_id: "msg_1".to_string(),
                before_data: None,
                after_data: None,
            })
            .unwrap();
        let logs = store.fetch_by_message_id("msg_1").unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].log_type, LogType::Create);
        assert_eq!(logs[1].log_type, LogType::Update);
    }
}
