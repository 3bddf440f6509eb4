//! Relational `MessageStore`/`LogStore`/`StatsService` backend
//! (`STORAGE_TYPE=TURSO`), realized with `rusqlite` in WAL mode — the
//! teacher's own storage crate, standing in for Turso's SQLite-compatible
//! wire protocol. Schema matches §6.3: `messages`, `logs`, `message_stats`,
//! `migrations`.

pub mod log_store;
pub mod message_store;
pub mod stats;

pub use log_store::SqlLogStore;
pub use message_store::SqlMessageStore;
pub use stats::SqlStatsService;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::StoreError;

pub type SharedConnection = Arc<Mutex<Connection>>;

/// Opens the connection named by `TURSO_DB_URL`: `:memory:`, `file:<path>`,
/// or a bare filesystem path, per §6.2. Enables WAL mode for file-backed
/// databases (a no-op, harmlessly rejected, for `:memory:`).
pub fn open(url: &str) -> Result<SharedConnection, StoreError> {
    let conn = if url == ":memory:" {
        Connection::open_in_memory()
    } else if let Some(path) = url.strip_prefix("file:") {
        Connection::open(path)
    } else {
        Connection::open(url)
    }
    .map_err(|e| StoreError::Backend(e.to_string()))?;

    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            publish_at TEXT NOT NULL,
            delivered_at TEXT,
            retry_at TEXT,
            retried INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            last_errors TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
        CREATE INDEX IF NOT EXISTS idx_messages_publish_at ON messages(publish_at);

        CREATE TABLE IF NOT EXISTS logs (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            object TEXT NOT NULL,
            message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            before_data TEXT,
            after_data TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_logs_message_id ON logs(message_id);
        CREATE INDEX IF NOT EXISTS idx_logs_type ON logs(type);
        CREATE INDEX IF NOT EXISTS idx_logs_created_at ON logs(created_at);

        CREATE TABLE IF NOT EXISTS message_stats (
            date TEXT NOT NULL,
            hour INTEGER NOT NULL,
            status TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (date, hour, status)
        );

        CREATE TABLE IF NOT EXISTS migrations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}
