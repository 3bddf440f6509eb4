//! `nano_wal`-backed `DurableQueue` (C4), shared infrastructure independent
//! of which `MessageStore` backend (`STORAGE_TYPE`) is selected. Visibility
//! state (`in_flight`) lives only in memory: on restart everything claimed
//! but not acked simply becomes claimable again, which is exactly the
//! at-least-once, idempotent-consumer contract the queue promises.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::model::SystemEvent;
use crate::stores::wal_journal::WalJournal;
use crate::traits::durable_queue::{DurableQueue, QueueEntry};

const STREAM: &str = "queue";

#[derive(Debug, Clone, Serialize, Deserialize)]
enum QueueRecord {
    Enqueue {
        entry_id: String,
        event: SystemEvent,
        visible_at: DateTime<Utc>,
    },
    Ack {
        entry_id: String,
    },
}

struct PendingEntry {
    event: SystemEvent,
    visible_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    pending: HashMap<String, PendingEntry>,
    in_flight: HashSet<String>,
}

pub struct WalDurableQueue {
    journal: Arc<WalJournal>,
    state: Mutex<State>,
}

impl WalDurableQueue {
    pub fn open(journal: Arc<WalJournal>) -> Result<Self, QueueError> {
        let records: Vec<QueueRecord> = journal.read_all_json(STREAM).map_err(QueueError::from)?;
        let mut state = State::default();
        for record in records {
            match record {
                QueueRecord::Enqueue {
                    entry_id,
                    event,
                    visible_at,
                } => {
                    state.pending.insert(entry_id, PendingEntry { event, visible_at });
                }
                QueueRecord::Ack { entry_id } => {
                    state.pending.remove(&entry_id);
                }
            }
        }
        Ok(WalDurableQueue {
            journal,
            state: Mutex::new(state),
        })
    }
}

impl DurableQueue for WalDurableQueue {
    fn enqueue(&self, event: SystemEvent, delay: Option<Duration>) -> Result<(), QueueError> {
        let visible_at = match delay {
            Some(d) if !d.is_zero() => {
                Utc::now()
                    + chrono::Duration::from_std(d)
                        .map_err(|e| QueueError::Backend(e.to_string()))?
            }
            _ => Utc::now(),
        };
        let entry_id = format!("qe_{}", uuid::Uuid::new_v4());

        self.journal
            .append_json(
                STREAM,
                &QueueRecord::Enqueue {
                    entry_id: entry_id.clone(),
                    event: event.clone(),
                    visible_at,
                },
            )
            .map_err(QueueError::from)?;

        let mut state = self.state.lock().expect("wal queue mutex poisoned");
        state.pending.insert(entry_id, PendingEntry { event, visible_at });
        Ok(())
    }

    fn claim_ready(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError> {
        let mut state = self.state.lock().expect("wal queue mutex poisoned");
        let now = Utc::now();

        let mut eligible: Vec<(String, DateTime<Utc>)> = state
            .pending
            .iter()
            .filter(|(id, entry)| !state.in_flight.contains(*id) && entry.visible_at <= now)
            .map(|(id, entry)| (id.clone(), entry.visible_at))
            .collect();
        eligible.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        eligible.truncate(limit);

        let mut claimed = Vec::with_capacity(eligible.len());
        for (entry_id, _) in eligible {
            state.in_flight.insert(entry_id.clone());
            let event = state.pending[&entry_id].event.clone();
            claimed.push(QueueEntry { entry_id, event });
        }
        Ok(claimed)
    }

    fn ack(&self, entry_id: &str) -> Result<(), QueueError> {
        self.journal
            .append_json(
                STREAM,
                &QueueRecord::Ack {
                    entry_id: entry_id.to_string(),
                },
            )
            .map_err(QueueError::from)?;

        let mut state = self.state.lock().expect("wal queue mutex poisoned");
        state.pending.remove(entry_id);
        state.in_flight.remove(entry_id);
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, QueueError> {
        let state = self.state.lock().expect("wal queue mutex poisoned");
        Ok(state.pending.len())
    }
}
