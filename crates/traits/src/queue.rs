//! Job queue contract.
//!
//! At-least-once delivery to one consumer group, a per-job attempt budget with
//! backoff between attempts, and a visibility timeout after which a running job
//! counts as stalled and is redelivered.

use async_trait::async_trait;
use fable_types::{BookId, BookJob, JobId};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by the queue itself (as opposed to by a job).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Invalid job options: {0}")]
    InvalidOptions(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// Outcome of a failed delivery, reported by a [`JobHandler`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("Job handler panicked")]
    Panicked,

    #[error("Job exceeded its {0:?} timeout")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Delay schedule between attempts of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial_delay: Duration,
}

impl Backoff {
    pub fn exponential(initial_delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial_delay,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial_delay: delay,
        }
    }

    /// Delay before the next attempt once `failed_attempts` attempts have failed.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.initial_delay,
            BackoffKind::Exponential => {
                let exponent = failed_attempts.saturating_sub(1).min(16);
                self.initial_delay.saturating_mul(1u32 << exponent)
            }
        }
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Total deliveries allowed, including the first.
    pub attempts: u32,
    pub backoff: Backoff,
    /// Visibility timeout for one delivery.
    pub timeout: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(60)),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(QueueError::InvalidOptions(
                "timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One delivery of a job to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub job_id: JobId,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
    pub max_attempts: u32,
    pub job: BookJob,
}

impl Delivery {
    pub fn book_id(&self) -> BookId {
        self.job.book_id()
    }

    /// No redelivery follows if this attempt fails.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Lifecycle notifications emitted by a queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Completed {
        job_id: JobId,
        book_id: BookId,
        attempt: u32,
    },
    Failed {
        job_id: JobId,
        book_id: BookId,
        attempt: u32,
        error: String,
        /// `false` once the attempt budget is exhausted.
        will_retry: bool,
    },
    Stalled {
        job_id: JobId,
        book_id: BookId,
        attempt: u32,
    },
}

impl QueueEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            QueueEvent::Completed { job_id, .. }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::Stalled { job_id, .. } => *job_id,
        }
    }

    pub fn book_id(&self) -> BookId {
        match self {
            QueueEvent::Completed { book_id, .. }
            | QueueEvent::Failed { book_id, .. }
            | QueueEvent::Stalled { book_id, .. } => *book_id,
        }
    }
}

/// Producer side of a queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job. The payload is already validated by construction.
    async fn enqueue(&self, job: BookJob, options: JobOptions) -> Result<JobId, QueueError>;

    /// Receive lifecycle events emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<QueueEvent>;
}

/// Consumer side: processes one delivery. Returning `Err` fails the delivery
/// and lets the queue decide whether to redeliver.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), JobError>;
}
