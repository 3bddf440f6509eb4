//! Durable CRUD over messages (C1). Two backends — relational and
//! key-value — conform to this single contract; see `crate::stores::sql`
//! and `crate::stores::kv`.

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::model::{Message, MessagePatch, MessageStatus, NewMessage};

pub trait MessageStore: Send + Sync {
    /// Assigns an id if `draft.id` is absent, stamps `created_at`/`updated_at`
    /// unless the caller supplied them (the seeding utility's bypass path),
    /// and persists. Does not itself touch stats, logs, or the durable
    /// queue; see `crate::store_gateway::StoreGateway` for that
    /// orchestration.
    fn create(&self, draft: NewMessage) -> Result<Message, StoreError>;

    fn fetch_one(&self, id: &str) -> Result<Message, StoreError>;

    /// Ordered by `created_at` descending.
    fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>, StoreError>;

    /// Matches on `publish_at`'s UTC calendar day. Ordered by `publish_at`
    /// ascending.
    fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Message>, StoreError>;

    /// Reads prior state, merges the partial patch, writes with a fresh
    /// `updated_at`. Returns the message as it stood before the patch so
    /// the caller can diff old/new status for stats and logging.
    fn update(&self, id: &str, patch: MessagePatch) -> Result<(Message, Message), StoreError>;

    /// Returns whether a row was actually removed.
    fn delete(&self, id: &str) -> Result<Option<Message>, StoreError>;

    /// All currently stored messages, for stats reconciliation
    /// (`initialize_from_messages`) and the admin raw dump.
    fn fetch_all(&self) -> Result<Vec<Message>, StoreError>;

    /// Truncates every row. Used by admin reset.
    fn reset(&self) -> Result<(), StoreError>;
}
