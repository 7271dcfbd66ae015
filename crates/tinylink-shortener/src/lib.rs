//! URL shortener service implementation.
//!
//! This crate composes the code generator, a record store and the deletion
//! worker pool into the operations protocol adapters call.

pub mod error;
pub mod job;
pub mod service;
pub mod shortener;

pub use error::{Result, ShortenerError};
pub use job::DeleteJob;
pub use service::{ServiceSettings, ShortenerService};
pub use shortener::{BatchItem, BatchResult, Shortener, UserUrl};
