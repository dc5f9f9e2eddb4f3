//! Chat message persistence.
//!
//! Messages are append-only. Each insert writes the message row, its
//! ordered product references and the owning session's `updated_at` in a
//! single transaction.

use std::sync::Arc;

use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::debug;

use storey_core::error::StoreyError;
use storey_core::types::{ChatMessage, MessageType};

use crate::db::{from_millis, sql_err, to_millis, Database};

/// Repository for chat messages.
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message to its session. The session must already exist.
    pub fn insert(&self, message: &ChatMessage) -> Result<(), StoreyError> {
        let extra = serde_json::to_string(&message.extra_data)?;
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(sql_err)?;
            tx.execute(
                "INSERT INTO messages (id, session_id, content, is_bot, message_type, extra_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id,
                    message.session_id,
                    message.content,
                    message.is_bot,
                    message.message_type.as_str(),
                    extra,
                    to_millis(&message.created_at),
                ],
            )
            .map_err(|e| StoreyError::Storage(format!("Failed to save message: {}", e)))?;

            for (position, product_id) in message.product_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO message_products (message_id, position, product_id)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![message.id, position as i64, product_id],
                )
                .map_err(sql_err)?;
            }

            tx.execute(
                "UPDATE chat_sessions SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
                rusqlite::params![message.session_id, to_millis(&message.created_at)],
            )
            .map_err(sql_err)?;

            tx.commit().map_err(sql_err)?;
            Ok(())
        })?;
        debug!(
            message_id = %message.id,
            session_id = %message.session_id,
            is_bot = message.is_bot,
            "Message saved"
        );
        Ok(())
    }

    /// The first `limit` messages of the session in chronological order.
    pub fn history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, content, is_bot, message_type, extra_data, created_at
                     FROM messages
                     WHERE session_id = ?1
                     ORDER BY created_at ASC, seq ASC
                     LIMIT ?2",
                )
                .map_err(sql_err)?;
            let rows = stmt
                .query_map(rusqlite::params![session_id, limit as i64], row_to_parts)
                .map_err(sql_err)?;

            let mut messages = Vec::new();
            for row in rows {
                let parts = row.map_err(sql_err)?;
                messages.push(assemble(conn, parts)?);
            }
            Ok(messages)
        })
    }

    pub fn count_for_session(&self, session_id: &str) -> Result<u64, StoreyError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                    [session_id],
                    |row| row.get(0),
                )
                .map_err(sql_err)?;
            Ok(n as u64)
        })
    }
}

// ============================================================================
// Helper functions for row-to-entity conversion.
// ============================================================================

struct MessageParts {
    id: String,
    session_id: String,
    content: String,
    is_bot: bool,
    message_type: String,
    extra_data: String,
    created_at: i64,
}

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageParts> {
    Ok(MessageParts {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        is_bot: row.get(3)?,
        message_type: row.get(4)?,
        extra_data: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn assemble(conn: &Connection, parts: MessageParts) -> Result<ChatMessage, StoreyError> {
    let extra_data: Map<String, Value> = serde_json::from_str(&parts.extra_data)?;
    let product_ids = load_product_refs(conn, &parts.id)?;
    Ok(ChatMessage {
        id: parts.id,
        session_id: parts.session_id,
        content: parts.content,
        is_bot: parts.is_bot,
        message_type: MessageType::from_tag(&parts.message_type),
        product_ids,
        extra_data,
        created_at: from_millis(parts.created_at),
    })
}

fn load_product_refs(conn: &Connection, message_id: &str) -> Result<Vec<String>, StoreyError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT product_id FROM message_products WHERE message_id = ?1 ORDER BY position ASC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([message_id], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
}
