use chrono::Utc;
use rusqlite::{params, Row};

use crate::error::StoreError;
use crate::model::{LogEntry, LogType, NewLogEntry};
use crate::stores::sql::SharedConnection;
use crate::traits::log_store::LogStore;

pub struct SqlLogStore {
    conn: SharedConnection,
}

impl SqlLogStore {
    pub fn new(conn: SharedConnection) -> Self {
        SqlLogStore { conn }
    }
}

fn log_type_str(t: LogType) -> &'static str {
    match t {
        LogType::Create => "CREATE",
        LogType::Update => "UPDATE",
        LogType::Delete => "DELETE",
    }
}

fn log_type_parse(s: &str) -> Result<LogType, StoreError> {
    match s {
        "CREATE" => Ok(LogType::Create),
        "UPDATE" => Ok(LogType::Update),
        "DELETE" => Ok(LogType::Delete),
        other => Err(StoreError::Backend(format!("unrecognized log type {other:?}"))),
    }
}

fn row_to_log(row: &Row) -> rusqlite::Result<(String, LogEntry)> {
    let type_str: String = row.get("type")?;
    let before_data: Option<String> = row.get("before_data")?;
    let after_data: Option<String> = row.get("after_data")?;
    Ok((
        type_str.clone(),
        LogEntry {
            id: row.get("id")?,
            log_type: LogType::Create, // placeholder, fixed up by caller
            object: row.get("object")?,
            message_id: row.get("message_id")?,
            before_data: before_data.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            after_data: after_data.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            created_at: row.get("created_at")?,
        },
    ))
}

fn finalize(pairs: Vec<(String, LogEntry)>) -> Result<Vec<LogEntry>, StoreError> {
    pairs
        .into_iter()
        .map(|(type_str, mut entry)| {
            entry.log_type = log_type_parse(&type_str)?;
            Ok(entry)
        })
        .collect()
}

impl LogStore for SqlLogStore {
    fn create(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let log_entry = LogEntry {
            id: format!("log_{}", uuid::Uuid::new_v4()),
            log_type: entry.log_type,
            object: "messages".to_string(),
            message_id: entry.message_id,
            before_data: entry.before_data,
            after_data: entry.after_data,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO logs (id, type, object, message_id, before_data, after_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log_entry.id,
                log_type_str(log_entry.log_type),
                log_entry.object,
                log_entry.message_id,
                log_entry
                    .before_data
                    .as_ref()
                    .map(|v| serde_json::to_string(v).unwrap()),
                log_entry
                    .after_data
                    .as_ref()
                    .map(|v| serde_json::to_string(v).unwrap()),
                log_entry.created_at,
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(log_entry)
    }

    fn fetch_by_message_id(&self, message_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM logs WHERE message_id = ?1 ORDER BY created_at ASC")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![message_id], row_to_log)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        finalize(rows)
    }

    fn fetch_all(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM logs ORDER BY created_at DESC LIMIT ?1")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_log)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        finalize(rows)
    }

    fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        conn.execute("DELETE FROM logs", [])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::sql;

    #[test]
    fn create_and_fetch_by_message_id() {
        let conn = sql::open(":memory:").unwrap();
        sql::SqlMessageStore::new(conn.clone())
            .create(crate::model::NewMessage::incoming(
                crate::model::MessagePayload {
                    headers: crate::model::MessageHeaders::default(),
                    url: "https://example.com".to_string(),
                    data: None,
                },
                Utc::now(),
            ))
            .map(|m| m.id)
            .map(|id| {
                let store = SqlLogStore::new(conn.clone());
                store
                    .create(NewLogEntry {
                        log_type: LogType::Create,
                        message_id: id.clone(),
                        before_data: None,
                        after_data: Some(serde_json::json!({"status": "CREATED"})),
                    })
                    .unwrap();
                let logs = store.fetch_by_message_id(&id).unwrap();
                assert_eq!(logs.len(), 1);
                assert_eq!(logs[0].log_type, LogType::Create);
            })
            .unwrap();
    }
}
