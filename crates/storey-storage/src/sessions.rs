//! Chat session persistence.
//!
//! Sessions are created on first use and only ever deactivated. The
//! ordered `message_ids` list is derived from the `messages` table.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, info};

use storey_core::error::StoreyError;
use storey_core::types::ChatSession;

use crate::db::{from_millis, sql_err, to_millis, Database};

/// Repository for chat sessions.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load a session by id, including its message ids in order.
    pub fn find(&self, id: &str) -> Result<Option<ChatSession>, StoreyError> {
        self.db.with_conn(|conn| find_session(conn, id))
    }

    /// Persist a new session. Fails if the id is already taken.
    pub fn create(&self, session: &ChatSession) -> Result<(), StoreyError> {
        let data = serde_json::to_string(&session.session_data)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, session_data, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    session.id,
                    session.user_id,
                    data,
                    session.is_active,
                    to_millis(&session.created_at),
                    to_millis(&session.updated_at),
                ],
            )
            .map_err(|e| StoreyError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;
        info!(session_id = %session.id, "Chat session created");
        Ok(())
    }

    /// Load the session, creating an active one with empty state if absent.
    ///
    /// The lookup and insert run under one connection lock so two callers
    /// cannot both create the same id.
    pub fn get_or_create(
        &self,
        id: &str,
        user_id: Option<&str>,
    ) -> Result<ChatSession, StoreyError> {
        let created = self.db.with_conn(|conn| {
            if let Some(existing) = find_session(conn, id)? {
                return Ok((existing, false));
            }
            let session = ChatSession::new(id, user_id);
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, session_data, is_active, created_at, updated_at)
                 VALUES (?1, ?2, '{}', 1, ?3, ?4)",
                rusqlite::params![
                    session.id,
                    session.user_id,
                    to_millis(&session.created_at),
                    to_millis(&session.updated_at),
                ],
            )
            .map_err(|e| StoreyError::Storage(format!("Failed to create session: {}", e)))?;
            Ok((session, true))
        })?;
        if created.1 {
            info!(session_id = %id, "Chat session created");
        }
        Ok(created.0)
    }

    /// Replace the session's opaque state map.
    pub fn set_state(&self, id: &str, data: &Map<String, Value>) -> Result<(), StoreyError> {
        let json = serde_json::to_string(data)?;
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE chat_sessions SET session_data = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, json, to_millis(&Utc::now())],
                )
                .map_err(sql_err)?;
            if updated == 0 {
                return Err(StoreyError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
    }

    /// Mark the session inactive. Returns whether a session was changed.
    pub fn deactivate(&self, id: &str) -> Result<bool, StoreyError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_sessions SET is_active = 0, updated_at = ?2
                 WHERE id = ?1 AND is_active = 1",
                rusqlite::params![id, to_millis(&Utc::now())],
            )
            .map_err(sql_err)
        })?;
        debug!(session_id = %id, changed, "Session deactivate");
        Ok(changed > 0)
    }
}

fn find_session(conn: &Connection, id: &str) -> Result<Option<ChatSession>, StoreyError> {
    let row = conn
        .query_row(
            "SELECT id, user_id, session_data, is_active, created_at, updated_at
             FROM chat_sessions WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()
        .map_err(sql_err)?;

    let Some((id, user_id, data, is_active, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let session_data: Map<String, Value> = serde_json::from_str(&data)?;
    let message_ids = load_message_ids(conn, &id)?;

    Ok(Some(ChatSession {
        id,
        user_id,
        session_data,
        is_active,
        created_at: from_millis(created_at),
        updated_at: from_millis(updated_at),
        message_ids,
    }))
}

fn load_message_ids(conn: &Connection, session_id: &str) -> Result<Vec<String>, StoreyError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id FROM messages WHERE session_id = ?1 ORDER BY created_at ASC, seq ASC",
        )
        .map_err(sql_err)?;
    let rows = stmt
        .query_map([session_id], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sql_err)
}
