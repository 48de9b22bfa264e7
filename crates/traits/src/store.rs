//! BookStore trait for abstracting book persistence.
//!
//! The pipeline needs only three operations: load by id, save a whole record,
//! and apply a partial update atomically. Status-transition and immutability
//! rules are enforced in [`BookUpdate::apply`], so every backend gets them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fable_types::{Book, BookId, BookStatus, Page};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Error type for book persistence operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Book not found: {0}")]
    NotFound(BookId),

    #[error("Illegal status transition for book {id}: {from} -> {to}")]
    InvalidTransition {
        id: BookId,
        from: BookStatus,
        to: BookStatus,
    },

    #[error("Book {0} is completed and can no longer change")]
    Frozen(BookId),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A partial update to a book record.
///
/// Unset fields are left untouched. `error: Some(None)` clears a recorded error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookUpdate {
    pub status: Option<BookStatus>,
    pub progress: Option<u8>,
    pub estimated_time_remaining: Option<String>,
    pub error: Option<Option<String>>,
    pub pages: Option<Vec<Page>>,
    pub pdf_location: Option<String>,
    pub word_count: Option<usize>,
    pub page_count: Option<usize>,
    pub text_completed: Option<bool>,
    pub images_completed: Option<bool>,
    pub pdf_completed: Option<bool>,
    pub fallback_story: Option<bool>,
    pub fallback_images: Option<usize>,
    pub failed_at: Option<DateTime<Utc>>,
    pub stalled_at: Option<DateTime<Utc>>,
    pub stalled_job_id: Option<String>,
}

impl BookUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(status: BookStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8, eta: impl Into<String>) -> Self {
        self.progress = Some(progress);
        self.estimated_time_remaining = Some(eta.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn with_pages(mut self, pages: Vec<Page>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_pdf_location(mut self, location: impl Into<String>) -> Self {
        self.pdf_location = Some(location.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether this update would change the generated content of a book.
    fn touches_content(&self, book: &Book) -> bool {
        self.status.is_some_and(|s| s != book.status)
            || self.pages.is_some()
            || self.pdf_location.is_some()
            || self.progress.is_some_and(|p| p != book.metadata.progress)
    }

    /// Applies this update to `book`, enforcing the record invariants.
    ///
    /// - a completed book only accepts bookkeeping fields
    /// - status changes must be legal transitions
    /// - progress never decreases unless the book is currently `failed`
    pub fn apply(self, book: &mut Book) -> Result<(), StoreError> {
        if book.status == BookStatus::Completed && self.touches_content(book) {
            return Err(StoreError::Frozen(book.id));
        }
        if let Some(next) = self.status {
            if !book.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    id: book.id,
                    from: book.status,
                    to: next,
                });
            }
        }

        let previous_status = book.status;
        let meta = &mut book.metadata;

        if let Some(progress) = self.progress {
            let floor = if previous_status == BookStatus::Failed {
                0
            } else {
                meta.progress
            };
            meta.progress = progress.max(floor).min(100);
        }
        if let Some(eta) = self.estimated_time_remaining {
            meta.estimated_time_remaining = eta;
        }
        if let Some(error) = self.error {
            meta.error = error;
        }
        if let Some(v) = self.word_count {
            meta.word_count = Some(v);
        }
        if let Some(v) = self.page_count {
            meta.page_count = Some(v);
        }
        if let Some(v) = self.text_completed {
            meta.text_completed = v;
        }
        if let Some(v) = self.images_completed {
            meta.images_completed = v;
        }
        if let Some(v) = self.pdf_completed {
            meta.pdf_completed = v;
        }
        if let Some(v) = self.fallback_story {
            meta.fallback_story = v;
        }
        if let Some(v) = self.fallback_images {
            meta.fallback_images = v;
        }
        if let Some(v) = self.failed_at {
            meta.failed_at = Some(v);
        }
        if let Some(v) = self.stalled_at {
            meta.stalled_at = Some(v);
        }
        if let Some(v) = self.stalled_job_id {
            meta.stalled_job_id = Some(v);
        }

        if let Some(status) = self.status {
            book.status = status;
        }
        if let Some(pages) = self.pages {
            book.pages = pages;
        }
        if let Some(location) = self.pdf_location {
            book.pdf_location = Some(location);
        }
        book.updated_at = Utc::now();
        Ok(())
    }
}

/// Persistence abstraction for book records.
///
/// # Implementations
///
/// - `InMemoryBookStore`: process-local map, used by tests and the in-process CLI
/// - `FilesystemBookStore` (root crate): one JSON document per book
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Load a book by id. `Ok(None)` when no such record exists.
    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, StoreError>;

    /// Insert or overwrite a whole record.
    async fn save(&self, book: &Book) -> Result<(), StoreError>;

    /// Atomically apply a partial update and return the resulting record.
    async fn update_fields(&self, id: BookId, update: BookUpdate) -> Result<Book, StoreError>;
}

/// A book store backed by a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryBookStore {
    books: RwLock<HashMap<BookId, Book>>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.books.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.books.read().await.is_empty()
    }
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        Ok(self.books.read().await.get(&id).cloned())
    }

    async fn save(&self, book: &Book) -> Result<(), StoreError> {
        self.books.write().await.insert(book.id, book.clone());
        Ok(())
    }

    async fn update_fields(&self, id: BookId, update: BookUpdate) -> Result<Book, StoreError> {
        let mut books = self.books.write().await;
        let book = books.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply(book)?;
        Ok(book.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_types::{AgeRange, CreationRequest, ImageType};

    fn request() -> CreationRequest {
        CreationRequest {
            title: "The Brave Little Boat".to_string(),
            genre: "adventure".to_string(),
            theme: "courage".to_string(),
            main_character: "Bo".to_string(),
            main_character_description: String::new(),
            secondary_character: None,
            secondary_character_description: None,
            setting: "the harbor".to_string(),
            environment_description: None,
            tone: "fun".to_string(),
            age_range: AgeRange::FiveToSix,
            author_name: None,
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = InMemoryBookStore::new();
        assert_eq!(store.find_by_id(BookId::new()).await, Ok(None));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryBookStore::new();
        let id = BookId::new();
        let result = store.update_fields(id, BookUpdate::new()).await;
        assert_eq!(result, Err(StoreError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_save_and_update_fields() {
        let store = InMemoryBookStore::new();
        let book = Book::new(request());
        store.save(&book).await.unwrap();

        let updated = store
            .update_fields(
                book.id,
                BookUpdate::status(BookStatus::GeneratingText).with_progress(10, "10-12 minutes"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BookStatus::GeneratingText);
        assert_eq!(updated.metadata.progress, 10);
        assert_eq!(updated.metadata.estimated_time_remaining, "10-12 minutes");
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_progress_never_decreases_while_not_failed() {
        let mut book = Book::new(request());
        book.status = BookStatus::GeneratingImages;
        book.metadata.progress = 40;

        BookUpdate::new().with_progress(10, "x").apply(&mut book).unwrap();
        assert_eq!(book.metadata.progress, 40);

        BookUpdate::new().with_progress(200, "x").apply(&mut book).unwrap();
        assert_eq!(book.metadata.progress, 100);
    }

    #[test]
    fn test_progress_may_restart_after_failure() {
        let mut book = Book::new(request());
        book.status = BookStatus::Failed;
        book.metadata.progress = 40;

        BookUpdate::status(BookStatus::GeneratingText)
            .with_progress(10, "10-12 minutes")
            .apply(&mut book)
            .unwrap();
        assert_eq!(book.metadata.progress, 10);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut book = Book::new(request());
        let err = BookUpdate::status(BookStatus::GeneratingPdf)
            .apply(&mut book)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(book.status, BookStatus::Processing);
    }

    #[test]
    fn test_completed_book_is_frozen() {
        let mut book = Book::new(request());
        book.status = BookStatus::Completed;
        book.metadata.progress = 100;
        book.pages.push(Page::new(1, "Done.", ImageType::Cover));

        let err = BookUpdate::new()
            .with_pages(Vec::new())
            .apply(&mut book)
            .unwrap_err();
        assert_eq!(err, StoreError::Frozen(book.id));
        assert_eq!(book.pages.len(), 1);

        // Bookkeeping fields are still accepted.
        let update = BookUpdate {
            stalled_job_id: Some("job-1".to_string()),
            ..BookUpdate::default()
        };
        update.apply(&mut book).unwrap();
        assert_eq!(book.metadata.stalled_job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn test_error_can_be_cleared() {
        let mut book = Book::new(request());
        BookUpdate::new().with_error("boom").apply(&mut book).unwrap();
        assert_eq!(book.metadata.error.as_deref(), Some("boom"));
        BookUpdate::new().clear_error().apply(&mut book).unwrap();
        assert_eq!(book.metadata.error, None);
    }
}
