//! Process-local job queue on top of `async_channel`.
//!
//! Delivery is at-least-once to a pool of worker tasks sharing one receiver.
//! Each delivery runs in its own task bounded by the job's visibility timeout.
//! A failed delivery is redelivered after the job's backoff until its attempt
//! budget is spent; a delivery that outlives the timeout is aborted, reported
//! as stalled and redelivered at once.

use async_trait::async_trait;
use fable_traits::{Delivery, JobError, JobHandler, JobOptions, JobQueue, QueueError, QueueEvent};
use fable_types::{BookJob, JobId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Envelope {
    job_id: JobId,
    job: BookJob,
    options: JobOptions,
    /// 1-based attempt number of the next delivery.
    attempt: u32,
}

#[derive(Clone)]
pub struct InMemoryJobQueue {
    tx: async_channel::Sender<Envelope>,
    rx: async_channel::Receiver<Envelope>,
    events: broadcast::Sender<QueueEvent>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles of the worker tasks consuming a queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every worker to drain. Call after [`InMemoryJobQueue::close`].
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Queue worker ended abnormally: {}", e);
            }
        }
    }

    /// Stops the workers without waiting for in-flight jobs.
    pub fn abort(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx, rx, events }
    }

    /// Number of deliveries waiting for a worker.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Stops accepting jobs. Already queued deliveries are still handed out;
    /// delayed redeliveries scheduled after this point are dropped.
    pub fn close(&self) {
        self.tx.close();
    }

    /// Spawns `workers` consumer tasks that feed deliveries to `handler`.
    pub fn start(&self, handler: Arc<dyn JobHandler>, workers: usize) -> WorkerPool {
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let queue = self.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    debug!(worker_id, "Queue worker started");
                    while let Ok(envelope) = queue.rx.recv().await {
                        queue.process(worker_id, handler.clone(), envelope).await;
                    }
                    debug!(worker_id, "Queue worker stopped");
                })
            })
            .collect();
        WorkerPool { handles }
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn process(&self, worker_id: usize, handler: Arc<dyn JobHandler>, envelope: Envelope) {
        let delivery = Delivery {
            job_id: envelope.job_id,
            attempt: envelope.attempt,
            max_attempts: envelope.options.attempts,
            job: envelope.job.clone(),
        };
        let book_id = delivery.book_id();
        let timeout = envelope.options.timeout;
        info!(
            worker_id,
            job_id = %delivery.job_id,
            book_id = %book_id,
            attempt = delivery.attempt,
            max_attempts = delivery.max_attempts,
            "Delivering job"
        );

        let mut task = tokio::spawn(async move { handler.handle(&delivery).await });
        let outcome = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => Err(JobError::Panicked),
            Ok(Err(join)) => Err(JobError::Failed(join.to_string())),
            Err(_) => {
                task.abort();
                Err(JobError::TimedOut(timeout))
            }
        };

        let job_id = envelope.job_id;
        let attempt = envelope.attempt;
        let error = match outcome {
            Ok(()) => {
                info!(job_id = %job_id, book_id = %book_id, attempt, "Job completed");
                self.emit(QueueEvent::Completed {
                    job_id,
                    book_id,
                    attempt,
                });
                return;
            }
            Err(e) => e,
        };

        let stalled = matches!(error, JobError::TimedOut(_));
        if stalled {
            warn!(job_id = %job_id, book_id = %book_id, attempt, "Job stalled after {:?}", timeout);
            self.emit(QueueEvent::Stalled {
                job_id,
                book_id,
                attempt,
            });
        }

        let will_retry = attempt < envelope.options.attempts;
        if will_retry && stalled {
            // The stall already cost this attempt; nothing to wait for.
            self.requeue(envelope, std::time::Duration::ZERO);
            return;
        }

        warn!(
            job_id = %job_id,
            book_id = %book_id,
            attempt,
            will_retry,
            error = %error,
            "Job attempt failed"
        );
        self.emit(QueueEvent::Failed {
            job_id,
            book_id,
            attempt,
            error: error.to_string(),
            will_retry,
        });
        if will_retry {
            let delay = envelope.options.backoff.delay_for(attempt);
            self.requeue(envelope, delay);
        } else {
            error!(job_id = %job_id, book_id = %book_id, "Job exhausted {} attempts", attempt);
        }
    }

    fn requeue(&self, mut envelope: Envelope, delay: std::time::Duration) {
        envelope.attempt += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let job_id = envelope.job_id;
            if tx.send(envelope).await.is_err() {
                warn!(job_id = %job_id, "Queue closed before redelivery");
            }
        });
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: BookJob, options: JobOptions) -> Result<JobId, QueueError> {
        options.validate()?;
        let job_id = JobId::new();
        let envelope = Envelope {
            job_id,
            job,
            options,
            attempt: 1,
        };
        debug!(job_id = %job_id, book_id = %envelope.job.book_id(), "Enqueueing {}", BookJob::KIND);
        self.tx.send(envelope).await.map_err(|_| QueueError::Closed)?;
        Ok(job_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }
}
