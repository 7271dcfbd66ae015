use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// An opaque unit of work executed by a pool worker.
///
/// The token is cancelled when the pool shuts down. Jobs that never look at
/// it run to completion.
#[async_trait]
pub trait Job: Send + 'static {
    async fn execute(self: Box<Self>, token: CancellationToken);
}

#[async_trait]
impl<F, Fut> Job for F
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn execute(self: Box<Self>, token: CancellationToken) {
        (*self)(token).await
    }
}
