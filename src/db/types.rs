use thiserror::Error;

/// Database-layer errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Read an INTEGER column as a bool flag.
pub(crate) fn flag(value: i64) -> bool {
    value != 0
}
