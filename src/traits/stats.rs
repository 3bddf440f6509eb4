//! Running counters per status and per hour/day (C3). A derived projection:
//! authoritative enough for admin reads but always recomputable from the
//! Message Store.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Message, MessageStatus, StatsSnapshot};

pub trait StatsService: Send + Sync {
    /// Bumps the per-status/hour bucket for `status` at `timestamp`. Also
    /// bumps the all-time total, but only when `status == Created` — the
    /// total is incremented on genuine new messages only, per the
    /// component's contract.
    fn increment(&self, status: MessageStatus, timestamp: DateTime<Utc>) -> Result<(), StoreError>;

    /// Bumps the per-status/hour bucket down, clamped at zero. Never
    /// touches the all-time total — only `record_delete` does that.
    fn decrement(&self, status: MessageStatus, timestamp: DateTime<Utc>) -> Result<(), StoreError>;

    /// Admin delete: decrements the per-status counter *and* the all-time
    /// total, the one case where the total moves outside of creation.
    fn record_delete(&self, status: MessageStatus, timestamp: DateTime<Utc>) -> Result<(), StoreError>;

    fn get(&self) -> Result<StatsSnapshot, StoreError>;

    /// Rebuilds every counter from scratch against the given message set.
    /// The documented recovery path for a crash between a message write and
    /// its counter write.
    fn initialize_from_messages(&self, messages: &[Message]) -> Result<(), StoreError>;

    fn reset(&self) -> Result<(), StoreError>;
}
