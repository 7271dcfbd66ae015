use async_trait::async_trait;
use std::sync::Arc;
use tinylink_core::{Repository, ShortCode};
use tinylink_workerpool::{CancellationToken, Job};
use tracing::{error, info, Instrument, Span};

/// Soft-deletes a user's codes in the background.
///
/// The outcome is only logged. Failures are not retried.
pub struct DeleteJob<R> {
    repository: Arc<R>,
    owner_id: String,
    codes: Vec<ShortCode>,
    span: Span,
}

impl<R: Repository> DeleteJob<R> {
    pub fn new(repository: Arc<R>, owner_id: String, codes: Vec<ShortCode>, span: Span) -> Self {
        Self {
            repository,
            owner_id,
            codes,
            span,
        }
    }
}

#[async_trait]
impl<R: Repository> Job for DeleteJob<R> {
    async fn execute(self: Box<Self>, _token: CancellationToken) {
        let span = self.span.clone();
        let result = self
            .repository
            .delete_urls(&self.owner_id, &self.codes)
            .instrument(span.clone())
            .await;

        match result {
            Ok(()) => info!(
                parent: &span,
                owner_id = %self.owner_id,
                codes = self.codes.len(),
                "urls deleted"
            ),
            Err(err) => error!(
                parent: &span,
                owner_id = %self.owner_id,
                error = %err,
                "failed to delete urls"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinylink_core::{ReadRepository, Record, StorageError};
    use tinylink_storage::InMemoryRepository;

    #[tokio::test]
    async fn executes_delete_for_owner() {
        let repository = Arc::new(InMemoryRepository::new());
        repository
            .add_record(Record::new("https://example.com", "abc", "alice"))
            .await
            .unwrap();

        let job = DeleteJob::new(
            Arc::clone(&repository),
            "alice".to_string(),
            vec![ShortCode::new("abc")],
            Span::none(),
        );
        Box::new(job).execute(CancellationToken::new()).await;

        assert!(matches!(
            repository.get_record(&ShortCode::new("abc")).await,
            Err(StorageError::Deleted(_))
        ));
    }
}
