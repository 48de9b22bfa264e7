//! Request-facing operations: accept a creation request and report status.

use crate::error::{PipelineError, Result};
use chrono::Utc;
use fable_traits::{BookStore, BookUpdate, JobOptions, JobQueue};
use fable_types::{Book, BookId, BookJob, BookStatus, CreationRequest, StatusReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct BookService {
    store: Arc<dyn BookStore>,
    queue: Arc<dyn JobQueue>,
    options: JobOptions,
    status_timeout: Duration,
}

impl BookService {
    pub fn new(store: Arc<dyn BookStore>, queue: Arc<dyn JobQueue>, options: JobOptions) -> Self {
        Self {
            store,
            queue,
            options,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Validates the request, persists a new book in `processing` and enqueues
    /// its generation job.
    pub async fn create_book(&self, request: CreationRequest) -> Result<Book> {
        request.validate()?;
        let book = Book::new(request);
        let job = BookJob::new(book.id, book.request.clone())?;
        self.store.save(&book).await?;

        match self.queue.enqueue(job, self.options).await {
            Ok(job_id) => {
                info!(book_id = %book.id, job_id = %job_id, title = %book.title(), "Book accepted");
                Ok(book)
            }
            Err(e) => {
                warn!(book_id = %book.id, error = %e, "Could not enqueue book job");
                let update = BookUpdate {
                    failed_at: Some(Utc::now()),
                    ..BookUpdate::status(BookStatus::Failed).with_error(e.to_string())
                };
                if let Err(store_err) = self.store.update_fields(book.id, update).await {
                    warn!(book_id = %book.id, error = %store_err, "Could not mark book failed");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_book(&self, id: BookId) -> Result<Book> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    /// Polling view of a book. A slow or failing store yields the generic
    /// "being processed" report instead of an error.
    pub async fn status(&self, id: BookId) -> Result<StatusReport> {
        match tokio::time::timeout(self.status_timeout, self.store.find_by_id(id)).await {
            Ok(Ok(Some(book))) => Ok(StatusReport::from_book(&book)),
            Ok(Ok(None)) => Err(PipelineError::NotFound(id)),
            Ok(Err(e)) => {
                warn!(book_id = %id, error = %e, "Status lookup failed");
                Ok(StatusReport::pending(id))
            }
            Err(_) => {
                warn!(book_id = %id, "Status lookup timed out after {:?}", self.status_timeout);
                Ok(StatusReport::pending(id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fable_traits::{InMemoryBookStore, QueueError, QueueEvent, StoreError};
    use fable_types::{AgeRange, JobId, ValidationError};
    use tokio::sync::{Mutex, broadcast};

    fn request() -> CreationRequest {
        CreationRequest {
            title: "Nora and the Night Train".to_string(),
            genre: "adventure".to_string(),
            theme: "bravery".to_string(),
            main_character: "Nora".to_string(),
            main_character_description: "a girl with a green scarf".to_string(),
            secondary_character: Some("Tik".to_string()),
            secondary_character_description: None,
            setting: "a midnight railway".to_string(),
            environment_description: None,
            tone: "exciting".to_string(),
            age_range: AgeRange::SevenToEight,
            author_name: None,
            language: "en".to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<BookJob>>,
        closed: bool,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: BookJob, _options: JobOptions) -> std::result::Result<JobId, QueueError> {
            self.jobs.lock().await.push(job);
            if self.closed {
                return Err(QueueError::Closed);
            }
            Ok(JobId::new())
        }

        fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
            broadcast::channel(1).1
        }
    }

    struct StuckStore;

    #[async_trait]
    impl BookStore for StuckStore {
        async fn find_by_id(&self, _id: BookId) -> std::result::Result<Option<Book>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn save(&self, _book: &Book) -> std::result::Result<(), StoreError> {
            Ok(())
        }

        async fn update_fields(&self, id: BookId, _update: BookUpdate) -> std::result::Result<Book, StoreError> {
            Err(StoreError::NotFound(id))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl BookStore for BrokenStore {
        async fn find_by_id(&self, _id: BookId) -> std::result::Result<Option<Book>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn save(&self, _book: &Book) -> std::result::Result<(), StoreError> {
            Ok(())
        }

        async fn update_fields(&self, id: BookId, _update: BookUpdate) -> std::result::Result<Book, StoreError> {
            Err(StoreError::NotFound(id))
        }
    }

    #[tokio::test]
    async fn test_create_saves_and_enqueues() {
        let store = Arc::new(InMemoryBookStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let service = BookService::new(store.clone(), queue.clone(), JobOptions::default());

        let book = service.create_book(request()).await.unwrap();
        assert_eq!(book.status, BookStatus::Processing);
        assert_eq!(book.metadata.estimated_time_remaining, "10-15 minutes");

        let jobs = queue.jobs.lock().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].book_id(), book.id);
        assert_eq!(service.get_book(book.id).await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_saving() {
        let store = Arc::new(InMemoryBookStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let service = BookService::new(store.clone(), queue, JobOptions::default());

        let mut req = request();
        req.title = "  ".to_string();
        let err = service.create_book(req).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ValidationError::MissingField("title"))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_enqueue_failure_marks_book_failed() {
        let store = Arc::new(InMemoryBookStore::new());
        let queue = Arc::new(RecordingQueue {
            closed: true,
            ..RecordingQueue::default()
        });
        let service = BookService::new(store.clone(), queue.clone(), JobOptions::default());

        let err = service.create_book(request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Queue(QueueError::Closed)));

        let book_id = queue.jobs.lock().await[0].book_id();
        let book = service.get_book(book_id).await.unwrap();
        assert_eq!(book.status, BookStatus::Failed);
        assert_eq!(book.metadata.error.as_deref(), Some("Queue is closed"));
        assert!(book.metadata.failed_at.is_some());

        let report = service.status(book_id).await.unwrap();
        assert_eq!(report.error.as_deref(), Some("Queue is closed"));
    }

    #[tokio::test]
    async fn test_status_of_unknown_book_is_not_found() {
        let service = BookService::new(
            Arc::new(InMemoryBookStore::new()),
            Arc::new(RecordingQueue::default()),
            JobOptions::default(),
        );
        let id = BookId::new();
        assert!(matches!(service.status(id).await, Err(PipelineError::NotFound(found)) if found == id));
    }

    #[tokio::test]
    async fn test_status_reports_current_progress() {
        let store = Arc::new(InMemoryBookStore::new());
        let service = BookService::new(store.clone(), Arc::new(RecordingQueue::default()), JobOptions::default());
        let book = service.create_book(request()).await.unwrap();
        store
            .update_fields(book.id, BookUpdate::status(BookStatus::GeneratingText).with_progress(10, "10-12 minutes"))
            .await
            .unwrap();

        let report = service.status(book.id).await.unwrap();
        assert_eq!(report.status, BookStatus::GeneratingText);
        assert_eq!(report.progress, 10);
        assert_eq!(report.message, "Writing the story for your book...");
        assert_eq!(report.page_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_yields_pending_report() {
        let service = BookService::new(Arc::new(StuckStore), Arc::new(RecordingQueue::default()), JobOptions::default())
            .with_status_timeout(Duration::from_secs(2));
        let id = BookId::new();
        assert_eq!(service.status(id).await.unwrap(), StatusReport::pending(id));
    }

    #[tokio::test]
    async fn test_store_error_yields_pending_report() {
        let service = BookService::new(Arc::new(BrokenStore), Arc::new(RecordingQueue::default()), JobOptions::default());
        let report = service.status(BookId::new()).await.unwrap();
        assert_eq!(report.progress, 50);
        assert_eq!(report.message, "Your book is being processed. Please wait.");
    }
}
