//! Object store errors

use thiserror::Error;

/// Errors that can occur when reading or writing the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend is unreachable; callers must reconnect before retrying
    #[error("No connection: {0}")]
    NoConnection(String),

    /// Stored version moved on since the document was read
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// Collection name is not a valid identifier
    #[error("Invalid collection: {0}")]
    InvalidCollection(String),

    /// Persist mode name not recognised
    #[error("Unknown persist mode: {0}")]
    UnknownMode(String),

    /// Stored record could not be decoded
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Filesystem error (journal backend)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite error (relational backend)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl StoreError {
    /// Builds the conflict error for a rejected compare-and-swap
    pub fn conflict(collection: &str, uuid: &str, expected: u64, actual: u64) -> Self {
        Self::Conflict(format!(
            "{collection}/{uuid}: expected version {expected}, found {actual}"
        ))
    }

    /// Returns true for errors a caller should resolve by re-reading and retrying
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
