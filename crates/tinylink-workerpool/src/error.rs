use thiserror::Error;

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("invalid pool settings: {0}")]
    InvalidSettings(String),
}
