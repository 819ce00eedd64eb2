use thiserror::Error;

/// Errors that can occur while maintaining or querying the block store.
#[derive(Error, Debug)]
pub enum BlockRefError {
    #[error("database error: {message} (operation: {operation})")]
    Database { message: String, operation: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Convenience alias for results using `BlockRefError`.
pub type Result<T> = std::result::Result<T, BlockRefError>;
