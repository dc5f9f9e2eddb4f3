//! Database schema migrations.
//!
//! Version 1 creates the catalog, chat and cart tables. List-valued fields
//! (product features, message product references) are child tables with an
//! explicit position column; opaque maps are JSON columns.

use rusqlite::Connection;
use tracing::info;

use storey_core::error::StoreyError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| StoreyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), StoreyError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id              TEXT PRIMARY KEY NOT NULL,
            name            TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            price           REAL NOT NULL CHECK (price >= 0),
            original_price  REAL,
            category        TEXT NOT NULL,
            subcategory     TEXT,
            brand           TEXT NOT NULL DEFAULT '',
            rating          REAL NOT NULL DEFAULT 0,
            review_count    INTEGER NOT NULL DEFAULT 0,
            image_url       TEXT,
            stock           INTEGER NOT NULL DEFAULT 0,
            is_on_sale      INTEGER NOT NULL DEFAULT 0,
            sale_percentage INTEGER,
            is_active       INTEGER NOT NULL DEFAULT 1,
            embedding_id    TEXT,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_rating
            ON products (rating DESC);

        CREATE INDEX IF NOT EXISTS idx_products_category
            ON products (category);

        CREATE TABLE IF NOT EXISTS product_features (
            product_id  TEXT NOT NULL,
            position    INTEGER NOT NULL,
            feature     TEXT NOT NULL,
            PRIMARY KEY (product_id, position),
            FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS chat_sessions (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT,
            session_data    TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(session_data)),
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_sessions_user
            ON chat_sessions (user_id)
            WHERE user_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            session_id      TEXT NOT NULL,
            content         TEXT NOT NULL,
            is_bot          INTEGER NOT NULL,
            message_type    TEXT NOT NULL DEFAULT 'text'
                            CHECK (message_type IN ('text', 'product')),
            extra_data      TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(extra_data)),
            created_at      INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages (session_id, created_at ASC, seq ASC);

        -- No FK to products: a message keeps its references after the
        -- product is removed from the catalog.
        CREATE TABLE IF NOT EXISTS message_products (
            message_id  TEXT NOT NULL,
            position    INTEGER NOT NULL,
            product_id  TEXT NOT NULL,
            PRIMARY KEY (message_id, position),
            FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS cart_items (
            user_id     TEXT NOT NULL,
            product_id  TEXT NOT NULL,
            quantity    INTEGER NOT NULL CHECK (quantity > 0),
            added_at    INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY (user_id, product_id),
            FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| StoreyError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
