use crate::{FileRepository, InMemoryRepository, PostgresRepository};
use async_trait::async_trait;
use std::path::PathBuf;
use tinylink_core::error::Result;
use tinylink_core::{ReadRepository, Record, Repository, ShortCode, Stats};
use tracing::info;

/// Where records are kept.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// PostgreSQL connection string. Takes precedence over everything else.
    pub database_dsn: Option<String>,
    /// Path of the durability log for the file-backed store.
    pub file_storage_path: Option<PathBuf>,
}

/// The configured storage backend.
///
/// Chosen once by [`Storage::open`] and used through the repository traits.
#[derive(Debug)]
pub enum Storage {
    Memory(InMemoryRepository),
    File(FileRepository),
    Postgres(PostgresRepository),
}

impl Storage {
    /// Opens the backend selected by `config`: a DSN selects PostgreSQL
    /// (creating its database and schema when missing), otherwise a file path
    /// selects the file-backed store, otherwise memory.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let dsn = config.database_dsn.as_deref().filter(|dsn| !dsn.is_empty());
        let path = config
            .file_storage_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty());

        if let Some(dsn) = dsn {
            PostgresRepository::ensure_database(dsn).await?;
            let repository = PostgresRepository::connect(dsn).await?;
            repository.initialize().await?;
            info!(backend = "postgres", "storage ready");
            return Ok(Storage::Postgres(repository));
        }

        if let Some(path) = path {
            let repository = FileRepository::open(path).await?;
            info!(backend = "file", path = %path.display(), "storage ready");
            return Ok(Storage::File(repository));
        }

        info!(backend = "memory", "storage ready");
        Ok(Storage::Memory(InMemoryRepository::new()))
    }

    /// Short name of the active backend.
    pub fn kind(&self) -> &'static str {
        match self {
            Storage::Memory(_) => "memory",
            Storage::File(_) => "file",
            Storage::Postgres(_) => "postgres",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $repo:ident => $call:expr) => {
        match $self {
            Storage::Memory($repo) => $call,
            Storage::File($repo) => $call,
            Storage::Postgres($repo) => $call,
        }
    };
}

#[async_trait]
impl ReadRepository for Storage {
    async fn get_record(&self, code: &ShortCode) -> Result<String> {
        delegate!(self, repo => repo.get_record(code).await)
    }

    async fn get_user_records(&self, owner_id: &str) -> Result<Vec<Record>> {
        delegate!(self, repo => repo.get_user_records(owner_id).await)
    }

    async fn stats(&self) -> Result<Stats> {
        delegate!(self, repo => repo.stats().await)
    }

    async fn ping(&self) -> Result<()> {
        delegate!(self, repo => repo.ping().await)
    }
}

#[async_trait]
impl Repository for Storage {
    async fn add_record(&self, record: Record) -> Result<()> {
        delegate!(self, repo => repo.add_record(record).await)
    }

    async fn add_records(&self, records: Vec<Record>) -> Result<()> {
        delegate!(self, repo => repo.add_records(records).await)
    }

    async fn delete_urls(&self, owner_id: &str, codes: &[ShortCode]) -> Result<()> {
        delegate!(self, repo => repo.delete_urls(owner_id, codes).await)
    }

    async fn close(&self) -> Result<()> {
        delegate!(self, repo => repo.close().await)
    }
}
