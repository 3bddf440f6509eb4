//! Append-only audit log of state transitions, indexed by message id (C2).

use crate::error::StoreError;
use crate::model::{LogEntry, NewLogEntry};

pub trait LogStore: Send + Sync {
    fn create(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;

    /// Ordered ascending by `created_at`.
    fn fetch_by_message_id(&self, message_id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// Ordered descending by `created_at`, capped at `limit`.
    fn fetch_all(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError>;

    fn reset(&self) -> Result<(), StoreError>;
}
