//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and foreign keys on initialization, registers the
//! `fold_case` SQL function, then runs pending migrations.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::info;

use storey_core::error::StoreyError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The connection is wrapped in a Mutex since rusqlite Connection is not
/// Sync. Every repository shares one `Arc<Database>`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn new(path: &Path) -> Result<Self, StoreyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreyError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| StoreyError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreyError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreyError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| StoreyError::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreyError> {
        register_functions(&conn)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure, so a
    /// transaction opened inside it cannot interleave with other writers.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreyError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreyError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreyError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// `fold_case(text)` lowercases with full Unicode rules. SQLite's built-in
/// `lower()` only folds ASCII, so case-insensitive matching goes through
/// this instead. NULL stays NULL.
fn register_functions(conn: &Connection) -> Result<(), StoreyError> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
    .map_err(|e| StoreyError::Storage(format!("Failed to register SQL functions: {}", e)))
}

/// Map any rusqlite error into the shared storage error.
pub(crate) fn sql_err(e: rusqlite::Error) -> StoreyError {
    StoreyError::Storage(e.to_string())
}

/// Timestamps are stored as epoch milliseconds.
pub(crate) fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
