use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A UNIQUE constraint rejected the write (duplicate username or email).
    #[error("Duplicate value for {0}")]
    Duplicate(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Map a rusqlite error, turning UNIQUE violations into [`StoreError::Duplicate`].
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref code, Some(ref msg)) = err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("UNIQUE") {
                let column = msg.rsplit('.').next().unwrap_or("value").to_string();
                return StoreError::Duplicate(column);
            }
        }
        StoreError::Sqlite(err)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
