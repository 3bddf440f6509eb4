//! Test doubles, adapted from the teacher's `mocks/mod.rs`. Kept as
//! hand-rolled fakes (not `mockall`) for the stateful ones — `mockall` is
//! reserved for simple single-call traits like `WebhookClient` where the
//! teacher already reaches for it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{QueueError, WebhookError};
use crate::model::SystemEvent;
use crate::traits::durable_queue::{DurableQueue, QueueEntry};
use crate::traits::webhook_client::{OutboundRequest, OutboundResponse, WebhookClient};

/// In-memory `DurableQueue`, mirroring `WalDurableQueue`'s claim/ack
/// semantics without a backing journal — restarts aren't a concept for an
/// in-process test double, so there's nothing to replay.
pub struct InMemoryDurableQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: HashMap<String, (SystemEvent, DateTime<Utc>)>,
    in_flight: HashSet<String>,
    next_id: u64,
}

impl InMemoryDurableQueue {
    pub fn new() -> Self {
        InMemoryDurableQueue {
            state: Mutex::new(QueueState::default()),
        }
    }
}

impl Default for InMemoryDurableQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableQueue for InMemoryDurableQueue {
    fn enqueue(&self, event: SystemEvent, delay: Option<Duration>) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("mock queue mutex poisoned");
        let visible_at = match delay {
            Some(d) if !d.is_zero() => {
                Utc::now()
                    + chrono::Duration::from_std(d).map_err(|e| QueueError::Backend(e.to_string()))?
            }
            _ => Utc::now(),
        };
        state.next_id += 1;
        let id = format!("qe_{}", state.next_id);
        state.pending.insert(id, (event, visible_at));
        Ok(())
    }

    fn claim_ready(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError> {
        let mut state = self.state.lock().expect("mock queue mutex poisoned");
        let now = Utc::now();
        let mut eligible: Vec<(String, DateTime<Utc>)> = state
            .pending
            .iter()
            .filter(|(id, (_, visible_at))| !state.in_flight.contains(*id) && *visible_at <= now)
            .map(|(id, (_, visible_at))| (id.clone(), *visible_at))
            .collect();
        eligible.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        eligible.truncate(limit);

        let mut claimed = Vec::with_capacity(eligible.len());
        for (entry_id, _) in eligible {
            state.in_flight.insert(entry_id.clone());
            let event = state.pending[&entry_id].0.clone();
            claimed.push(QueueEntry { entry_id, event });
        }
        Ok(claimed)
    }

    fn ack(&self, entry_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("mock queue mutex poisoned");
        state.pending.remove(entry_id);
        state.in_flight.remove(entry_id);
        Ok(())
    }

    fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().expect("mock queue mutex poisoned").pending.len())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// Scripted response behavior for [`RecordedWebhookClient`], mirroring the
/// teacher's `WebhookBehavior`.
#[derive(Clone)]
pub enum WebhookBehavior {
    AlwaysSucceed { status: u16 },
    AlwaysFail(WebhookError),
    FailNTimesThenSucceed { failures: usize, error: WebhookError, success_status: u16 },
}

pub struct RecordedWebhookClient {
    behavior: WebhookBehavior,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordedWebhookClient {
    pub fn new(behavior: WebhookBehavior) -> Self {
        RecordedWebhookClient {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("recorder mutex poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("recorder mutex poisoned").len()
    }
}

#[async_trait]
impl WebhookClient for RecordedWebhookClient {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, WebhookError> {
        let call_index = {
            let mut requests = self.requests.lock().expect("recorder mutex poisoned");
            requests.push(RecordedRequest {
                url: request.url,
                headers: request.headers,
                body: request.body,
            });
            requests.len() - 1
        };

        match &self.behavior {
            WebhookBehavior::AlwaysSucceed { status } => Ok(OutboundResponse { status: *status }),
            WebhookBehavior::AlwaysFail(err) => Err(err.clone()),
            WebhookBehavior::FailNTimesThenSucceed {
                failures,
                error,
                success_status,
            } => {
                if call_index < *failures {
                    Err(error.clone())
                } else {
                    Ok(OutboundResponse { status: *success_status })
                }
            }
        }
    }
}
