//! SQL-backed `StatsService`. `total` and the per-status breakdown are
//! derived live from `messages` (per spec: "derived from the Message Store
//! count on SQL backends"), so `decrement`/`record_delete` have nothing to
//! maintain — the row is already gone from `messages` by the time they're
//! called. `message_stats` only tracks the hourly/daily histogram, which is
//! an append-only history of arrivals and completions, not a live gauge.

use chrono::{Datelike, Duration as ChronoDuration, Timelike, Utc};
use rusqlite::params;

use crate::error::StoreError;
use crate::model::{DailyTrend, Message, MessageStatus, StatsSnapshot, StatusCounts};
use crate::stores::sql::SharedConnection;
use crate::traits::stats::StatsService;

pub struct SqlStatsService {
    conn: SharedConnection,
}

impl SqlStatsService {
    pub fn new(conn: SharedConnection) -> Self {
        SqlStatsService { conn }
    }

    fn bump_bucket(&self, date: chrono::NaiveDate, hour: u32, status: MessageStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        conn.execute(
            "INSERT INTO message_stats (date, hour, status, count) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(date, hour, status) DO UPDATE SET count = count + 1",
            params![date.format("%Y-%m-%d").to_string(), hour, status.as_str()],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl StatsService for SqlStatsService {
    fn increment(&self, status: MessageStatus, timestamp: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        self.bump_bucket(timestamp.date_naive(), timestamp.hour(), status)
    }

    fn decrement(&self, _status: MessageStatus, _timestamp: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }

    fn record_delete(&self, _status: MessageStatus, _timestamp: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self) -> Result<StatsSnapshot, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");

        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut by_status = StatusCounts::default();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM messages GROUP BY status")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for row in rows {
            let (status_str, count) = row.map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Some(status) = MessageStatus::parse(&status_str) {
                by_status.bump(status, count);
            }
        }

        let now = Utc::now();
        let today = now.date_naive();

        let mut hourly_histogram = [0i64; 24];
        let mut hstmt = conn
            .prepare("SELECT hour, count FROM message_stats WHERE date = ?1 AND status = ?2")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let hrows = hstmt
            .query_map(
                params![today.format("%Y-%m-%d").to_string(), MessageStatus::Created.as_str()],
                |row| {
                    let hour: i64 = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((hour, count))
                },
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for row in hrows {
            let (hour, count) = row.map_err(|e| StoreError::Backend(e.to_string()))?;
            if (0..24).contains(&hour) {
                hourly_histogram[hour as usize] += count;
            }
        }

        let mut last_24h = 0i64;
        let mut last_7d = 0i64;
        let mut dstmt = conn
            .prepare("SELECT date, hour, count FROM message_stats WHERE status = ?1")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let drows = dstmt
            .query_map(params![MessageStatus::Created.as_str()], |row| {
                let date: String = row.get(0)?;
                let hour: i64 = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((date, hour, count))
            })
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let cutoff_24h = now - ChronoDuration::hours(24);
        let cutoff_7d = now - ChronoDuration::days(7);
        for row in drows {
            let (date_str, hour, count) = row.map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Ok(date) = chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
                if let Some(naive) = date.and_hms_opt(hour.clamp(0, 23) as u32, 0, 0) {
                    let instant = naive.and_utc();
                    if instant >= cutoff_24h {
                        last_24h += count;
                    }
                    if instant >= cutoff_7d {
                        last_7d += count;
                    }
                }
            }
        }

        let mut daily_trend = Vec::with_capacity(7);
        for days_ago in (0..7).rev() {
            let date = today - ChronoDuration::days(days_ago);
            let date_str = date.format("%Y-%m-%d").to_string();
            let incoming: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(count), 0) FROM message_stats WHERE date = ?1 AND status = ?2",
                    params![date_str, MessageStatus::Created.as_str()],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let sent: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(count), 0) FROM message_stats WHERE date = ?1 AND status = ?2",
                    params![date_str, MessageStatus::Sent.as_str()],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            daily_trend.push(DailyTrend { date, incoming, sent });
        }

        Ok(StatsSnapshot {
            total,
            by_status,
            last_24h,
            last_7d,
            hourly_histogram,
            daily_trend,
        })
    }

    fn initialize_from_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        {
            let conn = self.conn.lock().expect("sql connection mutex poisoned");
            conn.execute("DELETE FROM message_stats", [])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        for message in messages {
            self.bump_bucket(
                message.created_at.date_naive(),
                message.created_at.hour(),
                MessageStatus::Created,
            )?;
            if let Some(delivered_at) = message.delivered_at {
                self.bump_bucket(delivered_at.date_naive(), delivered_at.hour(), MessageStatus::Sent)?;
            }
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        conn.execute("DELETE FROM message_stats", [])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
