use thiserror::Error;
use tinylink_core::StorageError;
use tinylink_generator::GeneratorError;
use tinylink_workerpool::PoolError;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("input cannot be empty: {0}")]
    EmptyInput(String),
    #[error("invalid short code length: {0}")]
    InvalidLength(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    /// The URL was shortened before; `short_url` is the existing link.
    #[error("url already shortened as {short_url}")]
    UniqueViolation { code: String, short_url: String },
    #[error("short code is deleted: {0}")]
    Deleted(String),
    /// Deletion could not be queued. Callers should retry later.
    #[error("deletion queue is closed")]
    PoolClosed,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<GeneratorError> for ShortenerError {
    fn from(value: GeneratorError) -> Self {
        match value {
            GeneratorError::EmptyInput => Self::EmptyInput("url".to_string()),
            err @ GeneratorError::InvalidLength { .. } => Self::InvalidLength(err.to_string()),
        }
    }
}

impl From<PoolError> for ShortenerError {
    fn from(value: PoolError) -> Self {
        match value {
            PoolError::Closed => Self::PoolClosed,
            PoolError::InvalidSettings(message) => Self::InvalidConfig(message),
        }
    }
}

/// Converts a storage failure, keeping its kind.
///
/// `UniqueViolation` needs the base URL to build the existing link, so the
/// service handles it before falling back to this conversion.
impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(code) => Self::NotFound(code),
            StorageError::Deleted(code) => Self::Deleted(code),
            StorageError::UniqueViolation { existing_code } => Self::UniqueViolation {
                short_url: existing_code.clone(),
                code: existing_code,
            },
            other @ (StorageError::Unavailable(_)
            | StorageError::Timeout(_)
            | StorageError::Query(_)
            | StorageError::InvalidData(_)) => Self::StorageUnavailable(other.to_string()),
        }
    }
}
