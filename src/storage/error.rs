//! Storage failures

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for the snapshot
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The snapshot on disk does not parse
    #[error("Corrupt snapshot at {}: {reason}", .path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional write found the record changed, or a batch already in
    /// flight for the cycle
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn not_found<E: fmt::Display>(what: E) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict<E: fmt::Display>(msg: E) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn unavailable<E: fmt::Display>(msg: E) -> Self {
        Self::Unavailable(msg.to_string())
    }

    /// The same call may succeed later without any other change
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(StorageError::conflict("selection version 3").is_conflict());
        assert!(!StorageError::conflict("selection version 3").is_retryable());
        assert!(StorageError::unavailable("disk").is_retryable());
        assert!(!StorageError::not_found("batch b1").is_retryable());

        let corrupt = StorageError::CorruptSnapshot {
            path: PathBuf::from("/tmp/state.json"),
            reason: "expected value".into(),
        };
        assert!(!corrupt.is_retryable());
        assert_eq!(
            corrupt.to_string(),
            "Corrupt snapshot at /tmp/state.json: expected value"
        );
    }
}
