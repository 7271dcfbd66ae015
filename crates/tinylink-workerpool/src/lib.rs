//! A fixed-size pool of async workers draining one bounded job queue.
//!
//! Submitting a job only waits for a free queue slot, never for the job
//! itself. What a job does and whether it succeeds is invisible to the
//! submitter; jobs log their own outcome.

pub mod error;
pub mod job;
pub mod pool;

pub use error::PoolError;
pub use job::Job;
pub use pool::{PoolSettings, PoolState, WorkerPool, DEFAULT_QUEUE_CAPACITY};
pub use tokio_util::sync::CancellationToken;
