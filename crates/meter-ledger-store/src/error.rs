//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A record for this `(identity, session_id)` already exists.
    #[error("session {session_id} already recorded for {identity}")]
    AlreadyExists { identity: String, session_id: String },

    /// Column (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage, or a record passed to the wrong operation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking task panicked or a lock was poisoned.
    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
