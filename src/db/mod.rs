/// SQLite connection handling and schema bootstrap.
pub mod connection;

/// Row mappers and maintenance operations over the `blocks` and `refs` tables.
pub mod queries;

pub use connection::Database;
pub use queries::{row_to_block, row_to_ref};
