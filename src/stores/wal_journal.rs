//! Thin JSON-record wrapper around `nano_wal::Wal`, shared by the KV
//! message/log stores and the durable queue. Each logical stream (messages,
//! logs, queue) is a distinct WAL key, so a single on-disk journal directory
//! backs all three without them interleaving.
//!
//! Grounded on `aovestdipaperino-nano-wal`'s public API: `append_entry` for
//! the journal write, `enumerate_records` for full-stream replay on
//! startup. A long retention window is used since, unlike the crate's
//! typical use case, these records must survive until a message finishes
//! its lifecycle, not just for a rolling window.

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use nano_wal::{Wal, WalOptions};
use serde::{de::DeserializeOwned, Serialize};

const RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 30);

#[derive(Debug)]
pub struct JournalError(pub String);

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "journal failure: {}", self.0)
    }
}

impl From<nano_wal::WalError> for JournalError {
    fn from(e: nano_wal::WalError) -> Self {
        JournalError(e.to_string())
    }
}

impl From<JournalError> for crate::error::StoreError {
    fn from(e: JournalError) -> Self {
        crate::error::StoreError::Backend(e.0)
    }
}

impl From<JournalError> for crate::error::QueueError {
    fn from(e: JournalError) -> Self {
        crate::error::QueueError::Backend(e.0)
    }
}

pub struct WalJournal {
    wal: Mutex<Wal>,
}

impl WalJournal {
    pub fn open(dir: &std::path::Path) -> Result<Self, JournalError> {
        let options = WalOptions::default()
            .retention(RETENTION)
            .segments_per_retention_period(30);
        let wal = Wal::new(dir.to_string_lossy().as_ref(), options)?;
        Ok(WalJournal { wal: Mutex::new(wal) })
    }

    pub fn append_json<T: Serialize>(&self, stream: &str, record: &T) -> Result<(), JournalError> {
        let content = Bytes::from(serde_json::to_vec(record).map_err(|e| JournalError(e.to_string()))?);
        let mut wal = self.wal.lock().expect("wal mutex poisoned");
        wal.log_entry(stream, None, content)?;
        Ok(())
    }

    /// Appends a marker that causes `read_all_json` to discard every record
    /// accumulated before it. `nano_wal` has no per-key delete, so admin
    /// reset is modeled as "everything before the most recent marker is
    /// dead" rather than physically removed.
    pub fn append_reset_marker(&self, stream: &str) -> Result<(), JournalError> {
        let marker = serde_json::json!({ "__marker__": RESET_SENTINEL });
        self.append_json(stream, &marker)
    }

    /// Replays every record ever appended under `stream`, in arrival order,
    /// honoring reset markers.
    pub fn read_all_json<T: DeserializeOwned>(&self, stream: &str) -> Result<Vec<T>, JournalError> {
        let wal = self.wal.lock().expect("wal mutex poisoned");
        let mut out = Vec::new();
        for bytes in wal.enumerate_records(stream)? {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                if value.get("__marker__").and_then(|v| v.as_str()) == Some(RESET_SENTINEL) {
                    out.clear();
                    continue;
                }
            }
            let record: T = serde_json::from_slice(&bytes).map_err(|e| JournalError(e.to_string()))?;
            out.push(record);
        }
        Ok(out)
    }
}

const RESET_SENTINEL: &str = "__wal_journal_reset__";
