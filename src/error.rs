//! Error types for cchelper-storage

use rusqlite::ffi;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// HTTP status class a request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::InvalidInput(_) | StorageError::Duplicate(_) => 400,
            StorageError::NotFound(_) => 404,
            StorageError::Constraint(_) => 409,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StorageError::Duplicate(_))
    }

    /// Classify a SQLite error, prefixing the message with `context`.
    ///
    /// Unique and primary-key violations become `Duplicate`, every other
    /// constraint failure becomes `Constraint`.
    pub fn from_sqlite(context: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == ffi::ErrorCode::ConstraintViolation =>
            {
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StorageError::Duplicate(format!("{}: {}", context, err))
                    }
                    _ => StorageError::Constraint(format!("{}: {}", context, err)),
                }
            }
            _ => StorageError::Database(format!("{}: {}", context, err)),
        }
    }
}

/// Shorthand for `map_err` on rusqlite results.
pub(crate) fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| StorageError::from_sqlite(context, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StorageError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(StorageError::Duplicate("x".into()).status_code(), 400);
        assert_eq!(StorageError::NotFound("x".into()).status_code(), 404);
        assert_eq!(StorageError::Constraint("x".into()).status_code(), 409);
        assert_eq!(StorageError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .map_err(db_err("Insert failed"))
            .unwrap_err();
        assert!(err.is_duplicate(), "got {:?}", err);
    }

    #[test]
    fn test_foreign_key_violation_maps_to_constraint() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE p (id INTEGER PRIMARY KEY);
             CREATE TABLE c (id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p(id));",
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO c (p_id) VALUES (42)", [])
            .map_err(db_err("Insert failed"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)), "got {:?}", err);
    }
}
