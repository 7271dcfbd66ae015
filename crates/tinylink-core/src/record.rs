use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// A stored URL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The original URL that was shortened.
    pub original_url: String,
    /// The generated key for this record.
    pub short_code: ShortCode,
    /// The user who created the record.
    pub owner_id: String,
    /// Soft-delete flag. Once set it is never cleared.
    pub deleted: bool,
}

impl Record {
    /// Creates a live record.
    pub fn new(
        original_url: impl Into<String>,
        short_code: impl Into<ShortCode>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            original_url: original_url.into(),
            short_code: short_code.into(),
            owner_id: owner_id.into(),
            deleted: false,
        }
    }
}

/// Aggregate counters over live records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of records not marked deleted.
    pub urls: u64,
    /// Number of distinct owners among those records.
    pub users: u64,
}
