//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the record model, the short code type and the
//! repository contract shared by the storage backends and the shortener
//! service.

pub mod error;
pub mod record;
pub mod repository;
pub mod shortcode;

pub use error::StorageError;
pub use record::{Record, Stats};
pub use repository::{ReadRepository, Repository};
pub use shortcode::ShortCode;
