use crate::error::Result;
use crate::record::{Record, Stats};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

pub use crate::error::StorageError;

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Resolves a short code to its original URL.
    ///
    /// Fails with [`StorageError::NotFound`] when the code is unknown and with
    /// [`StorageError::Deleted`] when the record exists but is soft-deleted.
    async fn get_record(&self, code: &ShortCode) -> Result<String>;

    /// Returns the live records owned by `owner_id`, in no particular order.
    async fn get_user_records(&self, owner_id: &str) -> Result<Vec<Record>>;

    /// Counts live records and their distinct owners.
    async fn stats(&self) -> Result<Stats>;

    /// Checks that the underlying medium is reachable.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Stores a record.
    ///
    /// Backends enforcing original URL uniqueness return
    /// [`StorageError::UniqueViolation`] carrying the existing code and write nothing.
    async fn add_record(&self, record: Record) -> Result<()>;

    /// Stores a batch of records. Atomicity depends on the backend.
    async fn add_records(&self, records: Vec<Record>) -> Result<()>;

    /// Soft-deletes each code owned by `owner_id`.
    /// Unknown codes and codes owned by someone else are skipped.
    async fn delete_urls(&self, owner_id: &str, codes: &[ShortCode]) -> Result<()>;

    /// Releases the underlying resources. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}
