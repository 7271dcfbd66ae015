use crate::error::{PoolError, Result};
use crate::job::Job;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, Instrument, Span};
use typed_builder::TypedBuilder;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

type BoxedJob = Box<dyn Job>;
type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<BoxedJob>>>;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configures a [`WorkerPool`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PoolSettings {
    /// Number of concurrently running workers.
    #[builder(default = default_workers())]
    pub workers: usize,
    /// Jobs that may wait in the queue before submitters block.
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Span the workers log in.
    #[builder(default = tracing::info_span!("worker_pool"))]
    pub span: Span,
}

/// Lifecycle of a [`WorkerPool`]. It only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PoolState {
    Created = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Created,
            1 => PoolState::Running,
            2 => PoolState::Draining,
            _ => PoolState::Stopped,
        }
    }
}

/// A fixed set of workers consuming one bounded job queue.
///
/// [`submit`](Self::submit) waits while the queue is full instead of dropping
/// work. [`shutdown`](Self::shutdown) stops intake and cancels the token handed
/// to jobs; workers keep draining whatever is already queued until the queue is
/// empty, and [`wait`](Self::wait) resolves once they have all exited. Any
/// number of callers may wait at the same time.
pub struct WorkerPool {
    workers: usize,
    span: Span,
    sender: Mutex<Option<mpsc::Sender<BoxedJob>>>,
    receiver: SharedReceiver,
    closed: AtomicBool,
    state: AtomicU8,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(settings: PoolSettings) -> Result<Self> {
        if settings.workers == 0 {
            return Err(PoolError::InvalidSettings(
                "at least one worker is required".to_string(),
            ));
        }
        if settings.queue_capacity == 0 {
            return Err(PoolError::InvalidSettings(
                "queue capacity must be positive".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(settings.queue_capacity);

        Ok(Self {
            workers: settings.workers,
            span: settings.span,
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            closed: AtomicBool::new(false),
            state: AtomicU8::new(PoolState::Created as u8),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Creates a pool with `workers` workers and the default queue capacity.
    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::new(PoolSettings::builder().workers(workers).build())
    }

    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers. Only the first call has an effect, and a pool that
    /// has already been shut down never starts.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self
            .state
            .compare_exchange(
                PoolState::Created as u8,
                PoolState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        for id in 0..self.workers {
            let receiver = Arc::clone(&self.receiver);
            let token = self.token.clone();
            let span = tracing::debug_span!(parent: &self.span, "worker", id);
            self.tracker
                .spawn(run_worker(receiver, token).instrument(span));
        }

        info!(parent: &self.span, workers = self.workers, "worker pool started");
    }

    /// Queues a job, waiting for a free slot while the queue is full.
    ///
    /// Fails with [`PoolError::Closed`] once [`shutdown`](Self::shutdown) has been called.
    pub async fn submit<J: Job>(&self, job: J) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let sender = self.sender.lock().clone().ok_or(PoolError::Closed)?;
        sender
            .send(Box::new(job))
            .await
            .map_err(|_| PoolError::Closed)
    }

    /// Stops accepting jobs and closes the queue. Later calls do nothing.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Dropping the last sender closes the queue once in-flight submits finish.
        self.sender.lock().take();
        self.token.cancel();
        self.tracker.close();

        // A pool that already stopped keeps its state.
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state < PoolState::Draining as u8).then_some(PoolState::Draining as u8)
            })
            .ok();

        info!(parent: &self.span, "worker pool shutting down");
        Ok(())
    }

    /// Waits until every worker has drained the queue and exited.
    ///
    /// Only resolves after [`shutdown`](Self::shutdown); before that the
    /// workers keep waiting for new jobs.
    pub async fn wait(&self) {
        // Resolves only once the tracker is closed and every worker is gone.
        self.tracker.wait().await;

        let previous = self
            .state
            .swap(PoolState::Stopped as u8, Ordering::AcqRel);
        if previous != PoolState::Stopped as u8 {
            info!(parent: &self.span, "worker pool stopped");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_worker(receiver: SharedReceiver, token: CancellationToken) {
    debug!("worker started");

    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        // Run on its own task so a panicking job does not take the worker down.
        let task = tokio::spawn(job.execute(token.clone()).in_current_span());
        if let Err(err) = task.await {
            error!(error = %err, "job panicked");
        }
    }

    debug!("worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn pool(workers: usize, queue_capacity: usize) -> WorkerPool {
        WorkerPool::new(
            PoolSettings::builder()
                .workers(workers)
                .queue_capacity(queue_capacity)
                .build(),
        )
        .unwrap()
    }

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl Job {
        let counter = Arc::clone(counter);
        move |_token: CancellationToken| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn blocking_job(release: &Arc<Notify>, counter: &Arc<AtomicUsize>) -> impl Job {
        let release = Arc::clone(release);
        let counter = Arc::clone(counter);
        move |_token: CancellationToken| async move {
            release.notified().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = pool(4, DEFAULT_QUEUE_CAPACITY);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        for _ in 0..50 {
            pool.submit(counting_job(&counter)).await.unwrap();
        }

        pool.shutdown().unwrap();
        pool.wait().await;

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn rejects_invalid_settings() {
        assert!(matches!(
            WorkerPool::with_workers(0),
            Err(PoolError::InvalidSettings(_))
        ));
        assert!(matches!(
            WorkerPool::new(PoolSettings::builder().queue_capacity(0).build()),
            Err(PoolError::InvalidSettings(_))
        ));
    }

    #[tokio::test]
    async fn default_settings() {
        let settings = PoolSettings::builder().build();
        assert_eq!(settings.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(settings.workers >= 1);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let pool = pool(1, 1);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        pool.shutdown().unwrap();

        let err = pool.submit(counting_job(&counter)).await.unwrap_err();
        assert_eq!(err, PoolError::Closed);
        pool.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let pool = pool(3, 4);

        pool.start();
        pool.start();

        assert_eq!(pool.tracker.len(), 3);
        assert_eq!(pool.state(), PoolState::Running);

        pool.shutdown().unwrap();
        pool.wait().await;
    }

    #[tokio::test]
    async fn lifecycle_moves_forward_only() {
        let pool = pool(2, 4);
        assert_eq!(pool.state(), PoolState::Created);

        pool.start();
        assert_eq!(pool.state(), PoolState::Running);

        pool.shutdown().unwrap();
        assert_eq!(pool.state(), PoolState::Draining);

        pool.start();
        assert_eq!(pool.state(), PoolState::Draining);

        pool.wait().await;
        assert_eq!(pool.state(), PoolState::Stopped);

        pool.shutdown().unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_before_start_never_starts() {
        let pool = pool(2, 4);

        pool.shutdown().unwrap();
        pool.start();

        assert!(pool.tracker.is_empty());
        pool.wait().await;
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_shutdown_closes_once() {
        let pool = Arc::new(pool(2, 4));
        pool.start();

        let mut handles = vec![];
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.shutdown() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }

        assert!(pool.sender.lock().is_none());
        assert!(pool.token.is_cancelled());
        pool.wait().await;
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn full_queue_blocks_submitter() {
        let pool = pool(1, 1);
        let release = Arc::new(Notify::new());
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        // The worker holds the first job; the second one fills the only slot.
        pool.submit(blocking_job(&release, &counter)).await.unwrap();
        pool.submit(counting_job(&counter)).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(100), pool.submit(counting_job(&counter)))
                .await;
        assert!(blocked.is_err(), "submit should wait for a free slot");

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), pool.submit(counting_job(&counter)))
            .await
            .expect("slot frees up once the worker drains")
            .unwrap();

        pool.shutdown().unwrap();
        pool.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn queued_jobs_are_drained_after_shutdown() {
        let pool = pool(1, 8);
        let release = Arc::new(Notify::new());
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        pool.submit(blocking_job(&release, &counter)).await.unwrap();
        for _ in 0..5 {
            pool.submit(counting_job(&counter)).await.unwrap();
        }

        pool.shutdown().unwrap();
        release.notify_one();
        pool.wait().await;

        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn jobs_observe_cancellation() {
        let pool = pool(1, 1);
        let cancelled = Arc::new(AtomicBool::new(false));
        pool.start();

        let flag = Arc::clone(&cancelled);
        pool.submit(move |token: CancellationToken| async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

        pool.shutdown().unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("cancelled job finishes");

        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrent_waiters_block_until_drained() {
        let pool = Arc::new(pool(1, 4));
        let release = Arc::new(Notify::new());
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        pool.submit(blocking_job(&release, &counter)).await.unwrap();
        pool.submit(counting_job(&counter)).await.unwrap();
        pool.shutdown().unwrap();

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(waiters.iter().all(|waiter| !waiter.is_finished()));
        assert_eq!(pool.state(), PoolState::Draining);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        release.notify_one();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter resolves after the drain")
                .unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn panicking_job_keeps_worker_alive() {
        let pool = pool(1, 4);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.start();

        pool.submit(|_token: CancellationToken| async move {
            panic!("job failed");
        })
        .await
        .unwrap();
        pool.submit(counting_job(&counter)).await.unwrap();

        pool.shutdown().unwrap();
        pool.wait().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
