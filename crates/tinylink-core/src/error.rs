use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code is deleted: {0}")]
    Deleted(String),
    #[error("url already shortened as {existing_code}")]
    UniqueViolation { existing_code: String },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Returns `true` for outcomes callers are expected to branch on
    /// rather than treat as incidents.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_)
                | StorageError::Deleted(_)
                | StorageError::UniqueViolation { .. }
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}
