use std::path::Path;

use rusqlite::Connection;

use crate::errors::{BlockRefError, Result};

/// The embedded SQL schema applied when initializing a new database.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite database holding the `blocks` and `refs` tables.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Creates a new database at `db_path`, creating parent directories if needed.
    ///
    /// Opens a SQLite connection, applies performance pragmas, and executes the
    /// full schema (tables and indexes).
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BlockRefError::Database {
                message: format!("failed to create database directory: {e}"),
                operation: "initialize".to_string(),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| BlockRefError::Database {
            message: format!("failed to open database: {e}"),
            operation: "initialize".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| BlockRefError::Database {
                message: format!("failed to apply schema: {e}"),
                operation: "initialize".to_string(),
            })?;

        Ok(Self { conn })
    }

    /// Opens an existing database at `db_path` and applies performance pragmas.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| BlockRefError::Database {
            message: format!("failed to open database: {e}"),
            operation: "open".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        Ok(Self { conn })
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the `Database`, closing the underlying connection.
    pub fn close(self) {
        drop(self.conn);
    }

    /// Applies performance-oriented SQLite pragmas.
    fn apply_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 120000;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -65536;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| BlockRefError::Database {
            message: format!("failed to apply pragmas: {e}"),
            operation: "apply_pragmas".to_string(),
        })
    }
}
