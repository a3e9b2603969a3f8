//! SQLite database module for the catalog
//!
//! ## Tables
//!
//! - `categories` - Category forest per kind (self-referencing `parent_id`)
//! - `content_items` - Products and scripts, unique `(kind, slug)`
//! - `breaking_news` - Announcements pointing at a content item
//! - `guide_nodes` - Guided call-flow forest per main type
//!
//! Repository functions are free functions over `&Connection`; services
//! reach them through [`CatalogDb::with_conn`] / [`CatalogDb::with_conn_mut`].

pub mod schema;
pub mod models;
pub mod categories;
pub mod content_items;
pub mod breaking_news;
pub mod guide_nodes;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{db_err, StorageError};

/// SQLite database for categories, content, breaking news and guide nodes
pub struct CatalogDb {
    conn: Mutex<Connection>,
}

impl CatalogDb {
    /// Open or create `catalog.db` inside `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(storage_dir)?;
        Self::open_path(&storage_dir.join("catalog.db"))
    }

    /// Open or create the database at an explicit file path
    pub fn open_path(db_path: &Path) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path).map_err(db_err("Failed to open SQLite"))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(db_err("Failed to set PRAGMA"))?;
        register_functions(&conn)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(db_err("Failed to open in-memory SQLite"))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(db_err("Failed to set PRAGMA"))?;
        register_functions(&conn)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.with_conn(schema::init_schema)
    }

    /// Run a read (or single-statement write) against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, StorageError> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(db_err("Query failed"))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                category_count: count("SELECT COUNT(*) FROM categories")?,
                content_item_count: count("SELECT COUNT(*) FROM content_items")?,
                active_breaking_news: count(
                    "SELECT COUNT(*) FROM breaking_news WHERE is_active = 1",
                )?,
                guide_node_count: count("SELECT COUNT(*) FROM guide_nodes")?,
            })
        })
    }
}

/// Register `fold(text)`, a Unicode lowercase used for case-insensitive
/// ordering, comparison and search. SQLite's own `lower()` and `LIKE` only
/// fold ASCII.
fn register_functions(conn: &Connection) -> Result<(), StorageError> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_lowercase()))
        },
    )
    .map_err(db_err("Failed to register fold()"))
}

/// Current UTC timestamp in the format stored in `created_at`/`updated_at`
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub category_count: u64,
    pub content_item_count: u64,
    pub active_breaking_news: u64,
    pub guide_node_count: u64,
}

// Re-exports
pub use models::{ContentBlock, ContentKind, GuideNodeKind, GuideStep, MainType, UiMode};
pub use categories::{CategoryRow, NewCategory};
pub use content_items::{ContentItemRow, ContentQuery, ItemWrite};
pub use breaking_news::BreakingNewsRow;
pub use guide_nodes::{GuideNode, GuideNodeInput};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory_stats_empty() {
        let db = CatalogDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.category_count, 0);
        assert_eq!(stats.content_item_count, 0);
        assert_eq!(stats.guide_node_count, 0);
    }

    #[test]
    fn test_fold_lowercases_unicode() {
        let db = CatalogDb::open_in_memory().unwrap();
        let folded: Option<String> = db
            .with_conn(|conn| {
                conn.query_row("SELECT fold('ÜBER Émas'), fold(NULL)", [], |row| {
                    let a: String = row.get(0)?;
                    let b: Option<String> = row.get(1)?;
                    assert!(b.is_none());
                    Ok(Some(a))
                })
                .map_err(db_err("fold"))
            })
            .unwrap();
        assert_eq!(folded.as_deref(), Some("über émas"));
    }

    #[test]
    fn test_reopen_file_database_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let db = CatalogDb::open(dir.path()).unwrap();
            db.with_conn(|conn| {
                categories::insert_category(
                    conn,
                    &NewCategory {
                        kind: ContentKind::Product,
                        name: "Kredit".into(),
                        parent_id: None,
                    },
                )
            })
            .unwrap();
        }

        let db = CatalogDb::open(dir.path()).unwrap();
        assert_eq!(db.stats().unwrap().category_count, 1);
    }
}
