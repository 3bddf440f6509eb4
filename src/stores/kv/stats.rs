//! In-memory `StatsService` for the KV backend. The all-time total is a
//! plain counter (per spec: "from a counter on KV backends"), rebuildable
//! via `initialize_from_messages`.

use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc};

use crate::error::StoreError;
use crate::model::{DailyTrend, Message, MessageStatus, StatsSnapshot, StatusCounts};

#[derive(Default, Clone)]
struct HourBucket {
    incoming: i64,
    sent: i64,
}

#[derive(Default)]
struct State {
    total: i64,
    by_status: StatusCounts,
    hourly: std::collections::HashMap<(NaiveDate, u32), HourBucket>,
}

pub struct KvStatsService {
    state: Mutex<State>,
}

impl KvStatsService {
    pub fn new() -> Self {
        KvStatsService {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for KvStatsService {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::traits::stats::StatsService for KvStatsService {
    fn increment(&self, status: MessageStatus, timestamp: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv stats mutex poisoned");
        state.by_status.bump(status, 1);
        if status == MessageStatus::Created {
            state.total += 1;
        }
        if status == MessageStatus::Created || status == MessageStatus::Sent {
            let bucket = state
                .hourly
                .entry((timestamp.date_naive(), timestamp.hour()))
                .or_default();
            if status == MessageStatus::Created {
                bucket.incoming += 1;
            } else {
                bucket.sent += 1;
            }
        }
        Ok(())
    }

    fn decrement(&self, status: MessageStatus, _timestamp: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv stats mutex poisoned");
        state.by_status.bump(status, -1);
        Ok(())
    }

    fn record_delete(&self, status: MessageStatus, _timestamp: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv stats mutex poisoned");
        state.by_status.bump(status, -1);
        state.total = (state.total - 1).max(0);
        Ok(())
    }

    fn get(&self) -> Result<StatsSnapshot, StoreError> {
        let state = self.state.lock().expect("kv stats mutex poisoned");
        let now = Utc::now();
        let today = now.date_naive();

        let mut hourly_histogram = [0i64; 24];
        let mut last_24h = 0i64;
        let mut last_7d = 0i64;
        let cutoff_24h = now - ChronoDuration::hours(24);
        let cutoff_7d = now - ChronoDuration::days(7);

        for (&(date, hour), bucket) in state.hourly.iter() {
            if date == today {
                hourly_histogram[hour as usize] += bucket.incoming;
            }
            let bucket_instant = date
                .and_hms_opt(hour, 0, 0)
                .expect("hour from Timelike::hour() is always in 0..24")
                .and_utc();
            if bucket_instant >= cutoff_24h {
                last_24h += bucket.incoming;
            }
            if bucket_instant >= cutoff_7d {
                last_7d += bucket.incoming;
            }
        }

        let mut daily_trend = Vec::with_capacity(7);
        for days_ago in (0..7).rev() {
            let date = today - ChronoDuration::days(days_ago);
            let (incoming, sent) = state
                .hourly
                .iter()
                .filter(|((d, _), _)| *d == date)
                .fold((0i64, 0i64), |(inc, sent), (_, bucket)| {
                    (inc + bucket.incoming, sent + bucket.sent)
                });
            daily_trend.push(DailyTrend { date, incoming, sent });
        }

        Ok(StatsSnapshot {
            total: state.total,
            by_status: state.by_status.clone(),
            last_24h,
            last_7d,
            hourly_histogram,
            daily_trend,
        })
    }

    fn initialize_from_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv stats mutex poisoned");
        *state = State::default();
        // `total` reconciles to "one message currently in the store == one
        // past create", independent of current status: every surviving row
        // was created exactly once, so `increment`'s created-only rule
        // would undercount anything that has since progressed past CREATED.
        state.total = messages.len() as i64;
        for message in messages {
            state.by_status.bump(message.status, 1);
            let created_bucket = state
                .hourly
                .entry((message.created_at.date_naive(), message.created_at.hour()))
                .or_default();
            created_bucket.incoming += 1;
            if let Some(delivered_at) = message.delivered_at {
                let sent_bucket = state
                    .hourly
                    .entry((delivered_at.date_naive(), delivered_at.hour()))
                    .or_default();
                sent_bucket.sent += 1;
            }
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("kv stats mutex poisoned");
        *state = State::default();
        Ok(())
    }
}
