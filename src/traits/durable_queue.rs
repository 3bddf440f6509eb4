//! Delay-capable FIFO of system events (C4). Process-wide, single-consumer,
//! survives restarts. At-least-once: a claimed entry stays claimable by a
//! future restart until explicitly acked, so the consumer must be (and is,
//! by construction, since every handler is status-driven) idempotent.

use std::time::Duration;

use crate::error::QueueError;
use crate::model::SystemEvent;

/// A claimed entry: `entry_id` is opaque and only meaningful to `ack`.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub entry_id: String,
    pub event: SystemEvent,
}

pub trait DurableQueue: Send + Sync {
    /// Enqueues `event`, visible immediately if `delay` is `None` or zero,
    /// otherwise visible only once `delay` has elapsed.
    fn enqueue(&self, event: SystemEvent, delay: Option<Duration>) -> Result<(), QueueError>;

    /// Claims up to `limit` entries whose visibility time has passed, in
    /// arrival order among those eligible.
    fn claim_ready(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError>;

    /// Marks an entry consumed. Until acked, the entry survives a restart
    /// and will be claimed again.
    fn ack(&self, entry_id: &str) -> Result<(), QueueError>;

    fn pending_count(&self) -> Result<usize, QueueError>;
}
