use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{DeliveryFailure, Message, MessagePatch, MessagePayload, MessageStatus, NewMessage};
use crate::stores::sql::SharedConnection;
use crate::traits::message_store::MessageStore;

pub struct SqlMessageStore {
    conn: SharedConnection,
}

impl SqlMessageStore {
    pub fn new(conn: SharedConnection) -> Self {
        SqlMessageStore { conn }
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let payload_json: String = row.get("payload")?;
    let last_errors_json: String = row.get("last_errors")?;
    let status_str: String = row.get("status")?;

    let payload: MessagePayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let last_errors: Vec<DeliveryFailure> = serde_json::from_str(&last_errors_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = MessageStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unrecognized stored status {status_str:?}"),
            )),
        )
    })?;

    Ok(Message {
        id: row.get("id")?,
        payload,
        publish_at: row.get("publish_at")?,
        status,
        retried: row.get("retried")?,
        retry_at: row.get("retry_at")?,
        delivered_at: row.get("delivered_at")?,
        last_errors,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn insert_or_replace(conn: &rusqlite::Connection, message: &Message) -> Result<(), StoreError> {
    let payload_json = serde_json::to_string(&message.payload).map_err(|e| StoreError::Backend(e.to_string()))?;
    let last_errors_json =
        serde_json::to_string(&message.last_errors).map_err(|e| StoreError::Backend(e.to_string()))?;

    conn.execute(
        "INSERT OR REPLACE INTO messages
         (id, payload, publish_at, delivered_at, retry_at, retried, status, last_errors, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message.id,
            payload_json,
            message.publish_at,
            message.delivered_at,
            message.retry_at,
            message.retried,
            message.status.as_str(),
            last_errors_json,
            message.created_at,
            message.updated_at,
        ],
    )
    .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

impl MessageStore for SqlMessageStore {
    fn create(&self, draft: NewMessage) -> Result<Message, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");

        let id = draft.id.unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4()));
        let exists: bool = conn
            .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .is_some();
        if exists {
            return Err(StoreError::DuplicateId(id));
        }

        let now = Utc::now();
        let message = Message {
            id,
            payload: draft.payload,
            publish_at: draft.publish_at,
            status: draft.status,
            retried: 0,
            retry_at: None,
            delivered_at: None,
            last_errors: Vec::new(),
            created_at: draft.created_at.unwrap_or(now),
            updated_at: draft.updated_at.unwrap_or(now),
        };
        insert_or_replace(&conn, &message)?;
        Ok(message)
    }

    fn fetch_one(&self, id: &str) -> Result<Message, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        conn.query_row("SELECT * FROM messages WHERE id = ?1", params![id], row_to_message)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Backend(other.to_string()),
            })
    }

    fn fetch_by_status(&self, status: MessageStatus) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM messages WHERE status = ?1 ORDER BY created_at DESC")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_message)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let prefix = format!("{}", date.format("%Y-%m-%d"));
        let mut stmt = conn
            .prepare("SELECT * FROM messages WHERE substr(publish_at, 1, 10) = ?1 ORDER BY publish_at ASC")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![prefix], row_to_message)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn update(&self, id: &str, patch: MessagePatch) -> Result<(Message, Message), StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let before = conn
            .query_row("SELECT * FROM messages WHERE id = ?1", params![id], row_to_message)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Backend(other.to_string()),
            })?;

        let mut after = before.clone();
        if let Some(status) = patch.status {
            if !before.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    from: before.status.as_str(),
                    to: status.as_str(),
                });
            }
            after.status = status;
        }
        if let Some(retried) = patch.retried {
            after.retried = retried;
        }
        if let Some(retry_at) = patch.retry_at {
            after.retry_at = retry_at;
        }
        if let Some(delivered_at) = patch.delivered_at {
            after.delivered_at = delivered_at;
        }
        if let Some(publish_at) = patch.publish_at {
            after.publish_at = publish_at;
        }
        after.last_errors.extend(patch.append_errors);
        after.updated_at = Utc::now();

        insert_or_replace(&conn, &after)?;
        Ok((before, after))
    }

    fn delete(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let existing = conn
            .query_row("SELECT * FROM messages WHERE id = ?1", params![id], row_to_message)
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if existing.is_some() {
            conn.execute("DELETE FROM messages WHERE id = ?1", params![id])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(existing)
    }

    fn fetch_all(&self) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM messages")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_message)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sql connection mutex poisoned");
        conn.execute("DELETE FROM messages", [])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
