//! Daily Activator (C7): a midnight-UTC sweep that promotes any `CREATED`
//! message whose `publish_at` falls on today's date, as a reconciliation
//! backstop for the normal ingest-time `CREATED -> QUEUED`/`DELIVER`
//! dispatch (e.g. messages imported directly into the store, or a crash
//! between the store write and its dispatch). Adapted from the teacher's
//! `scheduled_worker.rs` 60-second-interval idiom, but gated on UTC
//! midnight rather than a per-binding schedule.
//!
//! Promoting to `QUEUED` (rather than deciding `DELIVER` directly) re-enters
//! the state machine via the same `STORE_UPDATE_EVENT` path the direct
//! same-day ingest transition uses, so the State Manager's
//! `QUEUED`-status dispatch branch schedules the delayed wake-up exactly
//! the same way regardless of which path got the message there.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::model::{MessagePatch, MessageStatus};
use crate::store_gateway::StoreGateway;

/// Promotes every `CREATED` message whose `publish_at` date is today.
/// Returns the number promoted; failures to update a single message are
/// logged and don't stop the sweep.
pub fn run_sweep(gateway: &StoreGateway) -> usize {
    let today = Utc::now().date_naive();
    let due = match gateway.fetch_by_date(today) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!(error = %e, "daily activator failed to read today's messages");
            return 0;
        }
    };

    let mut promoted = 0;
    for message in due.into_iter().filter(|m| m.status == MessageStatus::Created) {
        match gateway.update(&message.id, MessagePatch::status(MessageStatus::Queued)) {
            Ok(_) => promoted += 1,
            Err(e) => tracing::error!(
                message_id = %message.id,
                error = %e,
                "daily activator failed to promote message"
            ),
        }
    }

    if promoted > 0 {
        tracing::info!(promoted, "daily activator promoted messages to QUEUED");
    }
    promoted
}

fn duration_until_next_midnight_utc(now: chrono::DateTime<Utc>) -> Duration {
    let next_midnight = (now.date_naive() + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc();
    (next_midnight - now).to_std().unwrap_or(Duration::from_secs(1))
}

/// Spawns the midnight-UTC sweep loop.
pub fn spawn_daily_activator(gateway: Arc<StoreGateway>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("daily activator started");
        loop {
            let sleep_for = duration_until_next_midnight_utc(Utc::now());
            tokio::time::sleep(sleep_for).await;
            run_sweep(&gateway);
        }
    })
}
