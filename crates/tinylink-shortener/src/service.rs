use crate::error::{Result, ShortenerError};
use crate::job::DeleteJob;
use crate::shortener::{BatchItem, BatchResult, Shortener, UserUrl};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tinylink_core::{Record, Repository, ShortCode, Stats, StorageError};
use tinylink_generator::Generator;
use tinylink_workerpool::WorkerPool;
use tracing::{debug, info, warn, Instrument, Span};
use typed_builder::TypedBuilder;

/// Configures a [`ShortenerService`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceSettings {
    /// Prefix of every short link, e.g. `http://localhost:8080`.
    #[builder(setter(into))]
    pub base_url: String,
    #[builder(default = tracing::info_span!("shortener"))]
    pub span: Span,
}

/// A concrete implementation of the [`Shortener`] trait.
///
/// Wraps a [`Repository`] and a [`Generator`]. Deletions are handed to a
/// [`WorkerPool`] and acknowledged as soon as they are queued.
///
/// No collision retry is performed: the generator salts every code with the
/// clock, and a clash on the URL itself is reported as `UniqueViolation`.
pub struct ShortenerService<R, G> {
    repository: Arc<R>,
    generator: Arc<G>,
    pool: Arc<WorkerPool>,
    base_url: String,
    span: Span,
}

impl<R: Repository, G: Generator> ShortenerService<R, G> {
    pub fn new(repository: R, generator: G, pool: Arc<WorkerPool>, settings: ServiceSettings) -> Self {
        Self {
            repository: Arc::new(repository),
            generator: Arc::new(generator),
            pool,
            base_url: settings.base_url,
            span: settings.span,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }

    fn storage_error(&self, err: StorageError) -> ShortenerError {
        storage_to_shortener_error(err, &self.base_url)
    }
}

#[async_trait]
impl<R: Repository, G: Generator> Shortener for ShortenerService<R, G> {
    async fn encode(&self, url: &str, owner_id: &str) -> Result<String> {
        if url.is_empty() {
            return Err(ShortenerError::EmptyInput("url".to_string()));
        }

        let code = self.generator.generate(url)?;
        let record = Record::new(url, code.clone(), owner_id);

        match self
            .repository
            .add_record(record)
            .instrument(self.span.clone())
            .await
        {
            Ok(()) => {
                debug!(parent: &self.span, code = %code, owner_id, "url shortened");
                Ok(self.short_url(&code))
            }
            Err(err) => {
                if !err.is_expected() {
                    warn!(parent: &self.span, error = %err, "failed to store url");
                }
                Err(self.storage_error(err))
            }
        }
    }

    async fn encode_batch(
        &self,
        items: Vec<BatchItem>,
        owner_id: &str,
    ) -> Result<Vec<BatchResult>> {
        if items.is_empty() {
            return Err(ShortenerError::EmptyInput("batch".to_string()));
        }

        let mut records = Vec::with_capacity(items.len());
        let mut results = Vec::with_capacity(items.len());
        // A URL repeated within the batch is stored once and shares its code.
        let mut codes: HashMap<String, ShortCode> = HashMap::with_capacity(items.len());
        for item in items {
            if item.correlation_id.is_empty() {
                return Err(ShortenerError::EmptyInput("correlation_id".to_string()));
            }
            if item.original_url.is_empty() {
                return Err(ShortenerError::EmptyInput("original_url".to_string()));
            }

            let code = match codes.get(&item.original_url) {
                Some(code) => code.clone(),
                None => {
                    let code = self.generator.generate(&item.original_url)?;
                    codes.insert(item.original_url.clone(), code.clone());
                    records.push(Record::new(item.original_url, code.clone(), owner_id));
                    code
                }
            };
            results.push(BatchResult {
                correlation_id: item.correlation_id,
                short_url: self.short_url(&code),
            });
        }

        self.repository
            .add_records(records)
            .instrument(self.span.clone())
            .await
            .map_err(|err| self.storage_error(err))?;

        debug!(parent: &self.span, owner_id, count = results.len(), "batch shortened");
        Ok(results)
    }

    async fn decode(&self, code: &str) -> Result<String> {
        if code.is_empty() {
            return Err(ShortenerError::EmptyInput("short code".to_string()));
        }

        self.repository
            .get_record(&ShortCode::new(code))
            .instrument(self.span.clone())
            .await
            .map_err(|err| self.storage_error(err))
    }

    async fn list_user(&self, owner_id: &str) -> Result<Vec<UserUrl>> {
        let records = self
            .repository
            .get_user_records(owner_id)
            .instrument(self.span.clone())
            .await
            .map_err(|err| self.storage_error(err))?;

        Ok(records
            .into_iter()
            .map(|record| UserUrl {
                short_url: self.short_url(&record.short_code),
                original_url: record.original_url,
            })
            .collect())
    }

    async fn request_delete(&self, owner_id: &str, codes: Vec<String>) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let codes: Vec<ShortCode> = codes.into_iter().map(ShortCode::from).collect();
        let count = codes.len();
        let job = DeleteJob::new(
            Arc::clone(&self.repository),
            owner_id.to_string(),
            codes,
            self.span.clone(),
        );

        self.pool.submit(job).await?;
        info!(parent: &self.span, owner_id, codes = count, "deletion queued");
        Ok(())
    }

    async fn statistics(&self) -> Result<Stats> {
        self.repository
            .stats()
            .instrument(self.span.clone())
            .await
            .map_err(|err| self.storage_error(err))
    }

    async fn ping(&self) -> Result<()> {
        self.repository
            .ping()
            .await
            .map_err(|err| self.storage_error(err))
    }
}

/// Converts a StorageError to a ShortenerError, building the existing link for
/// a `UniqueViolation`.
fn storage_to_shortener_error(e: StorageError, base_url: &str) -> ShortenerError {
    match e {
        StorageError::UniqueViolation { existing_code } => {
            let code = ShortCode::new(existing_code);
            ShortenerError::UniqueViolation {
                short_url: code.to_url(base_url),
                code: code.into_inner(),
            }
        }
        other => other.into(),
    }
}
