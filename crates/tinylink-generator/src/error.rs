use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("url cannot be empty")]
    EmptyInput,
    #[error("code length must be between 1 and {max}, got {length}")]
    InvalidLength { length: usize, max: usize },
}
