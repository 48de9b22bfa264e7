use chrono::Utc;
use fable_traits::{BookStore, BookUpdate, QueueEvent, StoreError};
use fable_types::BookStatus;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Translates a queue event into a book update, if it carries one.
pub fn update_for(event: &QueueEvent) -> Option<BookUpdate> {
    match event {
        QueueEvent::Stalled { job_id, .. } => Some(BookUpdate {
            stalled_at: Some(Utc::now()),
            stalled_job_id: Some(job_id.to_string()),
            ..BookUpdate::default()
        }),
        QueueEvent::Failed {
            error,
            will_retry: false,
            ..
        } => Some(BookUpdate {
            failed_at: Some(Utc::now()),
            ..BookUpdate::status(BookStatus::Failed).with_error(error.clone())
        }),
        QueueEvent::Failed { .. } | QueueEvent::Completed { .. } => None,
    }
}

/// Writes stall and terminal-failure events back onto the affected books.
///
/// Runs until the queue's event channel closes.
pub fn spawn_event_recorder(
    store: Arc<dyn BookStore>,
    mut events: broadcast::Receiver<QueueEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event recorder fell behind the queue");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(update) = update_for(&event) else {
                continue;
            };
            let book_id = event.book_id();
            match store.update_fields(book_id, update).await {
                Ok(book) => info!(
                    book_id = %book_id,
                    job_id = %event.job_id(),
                    status = %book.status,
                    "Recorded queue event"
                ),
                Err(StoreError::Frozen(_)) => {
                    debug!(book_id = %book_id, "Ignoring queue event for completed book")
                }
                Err(e) => warn!(book_id = %book_id, error = %e, "Could not record queue event"),
            }
        }
    })
}
