use lectern_core::IngestError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Move failed: {0}")]
    MoveFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Upload exceeds {max} bytes")]
    LimitExceeded { max: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LimitExceeded { max } => IngestError::FileTooLarge {
                size: max.saturating_add(1),
                max,
            },
            StorageError::InvalidKey(key) => IngestError::PathTraversal(key),
            other => IngestError::Storage(other.to_string()),
        }
    }
}
