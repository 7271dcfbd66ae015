//! Storage backends for the tinylink repository contract.

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::{Storage, StorageConfig};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use tinylink_core::{ReadRepository, Record, Repository, ShortCode, Stats, StorageError};
