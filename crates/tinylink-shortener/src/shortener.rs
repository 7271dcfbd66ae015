use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tinylink_core::Stats;

/// One URL in a batch request, tagged by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// The short link created for a [`BatchItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// A live link owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub original_url: String,
    pub short_url: String,
}

/// The operations protocol adapters call.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens `url` for `owner_id` and returns the absolute short link.
    ///
    /// If the backend already holds this URL the call fails with
    /// [`UniqueViolation`](crate::ShortenerError::UniqueViolation) carrying the
    /// existing link.
    async fn encode(&self, url: &str, owner_id: &str) -> Result<String>;

    /// Shortens every item, echoing each correlation id.
    async fn encode_batch(&self, items: Vec<BatchItem>, owner_id: &str)
        -> Result<Vec<BatchResult>>;

    /// Resolves a short code to the original URL.
    async fn decode(&self, code: &str) -> Result<String>;

    /// Lists the live links owned by `owner_id`.
    async fn list_user(&self, owner_id: &str) -> Result<Vec<UserUrl>>;

    /// Queues the deletion of `codes` and returns without waiting for it.
    async fn request_delete(&self, owner_id: &str, codes: Vec<String>) -> Result<()>;

    async fn statistics(&self) -> Result<Stats>;

    async fn ping(&self) -> Result<()>;
}
