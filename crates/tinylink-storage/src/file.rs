use crate::memory::InMemoryRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{ReadRepository, Record, Repository, ShortCode, Stats};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument, Span};

/// One line of the durability log.
#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    #[serde(default)]
    id: u64,
    original_url: String,
    short_code: ShortCode,
    owner_id: String,
    #[serde(default)]
    is_deleted: bool,
}

impl LogLine {
    fn new(id: usize, record: &Record) -> Self {
        Self {
            id: id as u64,
            original_url: record.original_url.clone(),
            short_code: record.short_code.clone(),
            owner_id: record.owner_id.clone(),
            is_deleted: record.deleted,
        }
    }

    fn into_record(self) -> Record {
        Record {
            original_url: self.original_url,
            short_code: self.short_code,
            owner_id: self.owner_id,
            deleted: self.is_deleted,
        }
    }
}

/// File-backed repository.
///
/// Reads are served from an [`InMemoryRepository`]. Every created record is
/// also appended to a JSON-lines log which is replayed on [`open`](Self::open).
///
/// Deletions only touch the in-memory copy and are never written to the log,
/// so a restart brings deleted records back as live.
#[derive(Debug)]
pub struct FileRepository {
    cache: InMemoryRepository,
    writer: Mutex<Option<BufWriter<File>>>,
    path: PathBuf,
    span: Span,
}

impl FileRepository {
    /// Opens (creating if needed) the log at `path` and replays it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let span = tracing::info_span!("file_repository", path = %path.as_ref().display());
        Self::open_with_span(path, span).await
    }

    /// Same as [`open`](Self::open), logging inside the given span.
    pub async fn open_with_span(path: impl AsRef<Path>, span: Span) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let repository = Self {
            cache: InMemoryRepository::new(),
            writer: Mutex::new(Some(BufWriter::new(file))),
            path,
            span,
        };
        let span = repository.span.clone();
        repository.replay().instrument(span).await?;

        Ok(repository)
    }

    /// Returns the path of the durability log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn replay(&self) -> Result<()> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();

        let mut number = 0usize;
        let mut restored = 0usize;
        while let Some(line) = lines.next_line().await? {
            number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(&line) {
                Ok(entry) => {
                    self.cache.put(entry.into_record());
                    restored += 1;
                }
                Err(err) => warn!(line = number, error = %err, "skipping malformed log line"),
            }
        }

        info!(restored, "replayed durability log");
        Ok(())
    }
}

fn closed() -> StorageError {
    StorageError::Unavailable("file storage is closed".to_string())
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get_record(&self, code: &ShortCode) -> Result<String> {
        self.cache.get_record(code).await
    }

    async fn get_user_records(&self, owner_id: &str) -> Result<Vec<Record>> {
        self.cache.get_user_records(owner_id).await
    }

    async fn stats(&self) -> Result<Stats> {
        self.cache.stats().await
    }

    async fn ping(&self) -> Result<()> {
        if self.writer.lock().await.is_some() {
            Ok(())
        } else {
            Err(closed())
        }
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn add_record(&self, record: Record) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(closed)?;

        let line = serde_json::to_vec(&LogLine::new(self.cache.put(record.clone()), &record))
            .map_err(|e| StorageError::InvalidData(format!("cannot encode record: {e}")))?;

        writer.write_all(&line).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        debug!(parent: &self.span, code = %record.short_code, "appended record");
        Ok(())
    }

    async fn add_records(&self, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.add_record(record).await?;
        }
        Ok(())
    }

    async fn delete_urls(&self, owner_id: &str, codes: &[ShortCode]) -> Result<()> {
        let _guard = self.writer.lock().await;
        let marked = self.cache.mark_deleted(owner_id, codes);
        debug!(parent: &self.span, owner_id, marked, "marked records deleted");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        writer.flush().await?;
        info!(parent: &self.span, "closed durability log");
        Ok(())
    }
}
