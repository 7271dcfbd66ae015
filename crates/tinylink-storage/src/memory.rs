use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{ReadRepository, Record, Repository, ShortCode, Stats};

/// In-memory implementation of the repository contract.
///
/// A single map guarded by one reader/writer lock. Writes overwrite any record
/// already stored under the same short code; original URLs are not deduplicated.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    storage: RwLock<HashMap<ShortCode, Record>>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Number of stored records, deleted ones included.
    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.read().is_empty()
    }

    /// Inserts a record and returns the number of stored records afterwards.
    pub(crate) fn put(&self, record: Record) -> usize {
        let mut storage = self.storage.write();
        storage.insert(record.short_code.clone(), record);
        storage.len()
    }

    pub(crate) fn mark_deleted(&self, owner_id: &str, codes: &[ShortCode]) -> usize {
        let mut storage = self.storage.write();
        let mut marked = 0;
        for code in codes {
            if let Some(record) = storage.get_mut(code) {
                if record.owner_id == owner_id && !record.deleted {
                    record.deleted = true;
                    marked += 1;
                }
            }
        }
        marked
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get_record(&self, code: &ShortCode) -> Result<String> {
        let storage = self.storage.read();

        let Some(record) = storage.get(code) else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        if record.deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        Ok(record.original_url.clone())
    }

    async fn get_user_records(&self, owner_id: &str) -> Result<Vec<Record>> {
        let storage = self.storage.read();
        Ok(storage
            .values()
            .filter(|record| record.owner_id == owner_id && !record.deleted)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<Stats> {
        let storage = self.storage.read();
        let live = storage.values().filter(|record| !record.deleted);

        let mut urls = 0;
        let mut users = HashSet::new();
        for record in live {
            urls += 1;
            users.insert(record.owner_id.as_str());
        }

        Ok(Stats {
            urls,
            users: users.len() as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn add_record(&self, record: Record) -> Result<()> {
        self.put(record);
        Ok(())
    }

    async fn add_records(&self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.add_record(record).await?;
        }
        Ok(())
    }

    async fn delete_urls(&self, owner_id: &str, codes: &[ShortCode]) -> Result<()> {
        self.mark_deleted(owner_id, codes);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
