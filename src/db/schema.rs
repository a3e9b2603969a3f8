//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::{db_err, StorageError};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(db_err("Failed to create schema_version table"))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(db_err("Failed to clear schema_version"))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(db_err("Failed to set schema_version"))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(db_err("Failed to create catalog tables"))?;

    conn.execute_batch(GUIDE_SCHEMA)
        .map_err(db_err("Failed to create guide tables"))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(db_err("Failed to create indexes"))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    // v1 is the first released schema; later versions add their steps here.
    if from_version < 1 {
        create_tables(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Categories, content items and breaking news
const CATALOG_SCHEMA: &str = r#"
-- Category forest, one per kind
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('product', 'script')),
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES categories(id) ON DELETE RESTRICT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Products and scripts, filed under exactly one category of the same kind
CREATE TABLE IF NOT EXISTS content_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('product', 'script')),
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE RESTRICT,

    -- Ordered list of text/image blocks as JSON
    blocks_json TEXT NOT NULL DEFAULT '[]',

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (kind, slug)
);

-- Announcements derived from a content item
CREATE TABLE IF NOT EXISTS breaking_news (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('product', 'script')),
    content_item_id INTEGER NOT NULL REFERENCES content_items(id) ON DELETE RESTRICT,
    title TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Guided call-flow nodes
const GUIDE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS guide_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    main_type TEXT NOT NULL CHECK (main_type IN ('call', 'info', 'request', 'complaint')),
    parent_id INTEGER REFERENCES guide_nodes(id) ON DELETE RESTRICT,
    node_type TEXT NOT NULL CHECK (node_type IN ('menu', 'step')),
    label TEXT NOT NULL,

    -- menu
    ui_mode TEXT,

    -- step: script / input / link
    step_kind TEXT,
    title TEXT,
    body TEXT,
    input_key TEXT,
    input_label TEXT,
    input_placeholder TEXT,
    input_required INTEGER,
    link_kind TEXT,
    link_slug TEXT,

    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(kind, parent_id);

CREATE INDEX IF NOT EXISTS idx_content_items_category ON content_items(category_id);
CREATE INDEX IF NOT EXISTS idx_content_items_kind_title ON content_items(kind, title);

CREATE INDEX IF NOT EXISTS idx_breaking_news_item ON breaking_news(content_item_id);
CREATE INDEX IF NOT EXISTS idx_breaking_news_active ON breaking_news(is_active);

CREATE INDEX IF NOT EXISTS idx_guide_nodes_parent ON guide_nodes(main_type, parent_id);
CREATE INDEX IF NOT EXISTS idx_guide_nodes_order ON guide_nodes(parent_id, sort_order);
"#;
