//! Storage-specific error types.
//!
//! Write paths and partition listing return [`StorageError`] on failure.
//! Read paths never do: an absent or unreadable partition reads as empty.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation did not finish within its time bound.
    #[error("storage operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Internal error (e.g., blocking task join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tempfile::PersistError> for StorageError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
