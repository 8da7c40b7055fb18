use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An update targeted a row that does not exist.
    #[error("Record not found")]
    NotFound,

    #[error("Migration error: {0}")]
    Migration(String),

    /// Encoding a list or map column.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// A child record points at a parent that is not stored.
    #[error("Missing parent record: {0}")]
    MissingParent(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
