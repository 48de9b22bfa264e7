//! Book lifecycle states and the polling view derived from them.

use crate::book::Book;
use crate::ids::BookId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a book.
///
/// The happy path is `processing -> generating_text -> generating_images ->
/// images_completed -> generating_pdf -> completed`. `failed` is reachable from
/// every non-terminal state; `images_error` and `pdf_error` record a stage
/// failure that is waiting on a queue redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Processing,
    GeneratingText,
    GeneratingImages,
    ImagesCompleted,
    GeneratingPdf,
    Completed,
    ImagesError,
    PdfError,
    Failed,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Processing => "processing",
            BookStatus::GeneratingText => "generating_text",
            BookStatus::GeneratingImages => "generating_images",
            BookStatus::ImagesCompleted => "images_completed",
            BookStatus::GeneratingPdf => "generating_pdf",
            BookStatus::Completed => "completed",
            BookStatus::ImagesError => "images_error",
            BookStatus::PdfError => "pdf_error",
            BookStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookStatus::Completed | BookStatus::Failed)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            BookStatus::ImagesError | BookStatus::PdfError | BookStatus::Failed
        )
    }

    /// Whether the image stage has finished for a book in this state.
    pub fn images_done(&self) -> bool {
        matches!(
            self,
            BookStatus::ImagesCompleted
                | BookStatus::GeneratingPdf
                | BookStatus::PdfError
                | BookStatus::Completed
        )
    }

    /// Returns whether moving from `self` to `next` is a legal transition.
    ///
    /// Writing the same status again is always allowed (progress-only updates).
    /// A completed book never changes state.
    pub fn can_transition_to(&self, next: BookStatus) -> bool {
        use BookStatus::*;

        if *self == next {
            return true;
        }
        match (*self, next) {
            (Completed, _) => false,
            (_, Failed) => true,
            (Processing, GeneratingText)
            | (GeneratingText, GeneratingImages)
            | (GeneratingImages, ImagesCompleted)
            | (GeneratingImages, ImagesError)
            | (ImagesCompleted, GeneratingPdf)
            | (GeneratingPdf, Completed)
            | (GeneratingPdf, PdfError) => true,
            // Redelivery after a stage failure re-enters that same stage.
            (ImagesError, GeneratingImages) | (PdfError, GeneratingPdf) => true,
            // A non-final attempt that failed may be redelivered into any stage
            // it has not completed yet.
            (Failed, GeneratingText | GeneratingImages | GeneratingPdf) => true,
            _ => false,
        }
    }

    /// Human readable progress line, derived only from status and progress.
    pub fn message(&self, progress: u8) -> &'static str {
        match self {
            BookStatus::Processing => match progress {
                0..20 => "Starting the creation of your story...",
                20..40 => "Developing the narrative and creating the characters...",
                40..60 => "Creating the illustrations for each page...",
                60..80 => "Finishing the illustrations and formatting the book...",
                _ => "Almost ready! Finishing the last details...",
            },
            BookStatus::GeneratingText => "Writing the story for your book...",
            BookStatus::GeneratingImages => {
                "Creating the illustrations for each page of your book..."
            }
            BookStatus::ImagesCompleted => "Images done! Preparing to generate the PDF...",
            BookStatus::GeneratingPdf => "Generating the final PDF of your book...",
            BookStatus::Completed => "Your book is ready!",
            BookStatus::Failed => "There was a problem creating your book. Please try again.",
            BookStatus::ImagesError => {
                "There was a problem generating the images. Trying again..."
            }
            BookStatus::PdfError => "There was a problem generating the PDF. Trying again...",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(BookStatus::Processing),
            "generating_text" => Ok(BookStatus::GeneratingText),
            "generating_images" => Ok(BookStatus::GeneratingImages),
            "images_completed" => Ok(BookStatus::ImagesCompleted),
            "generating_pdf" => Ok(BookStatus::GeneratingPdf),
            "completed" => Ok(BookStatus::Completed),
            "images_error" => Ok(BookStatus::ImagesError),
            "pdf_error" => Ok(BookStatus::PdfError),
            "failed" | "error" => Ok(BookStatus::Failed),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

const PENDING_MESSAGE: &str = "Your book is being processed. Please wait.";

/// Shape returned to a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub book_id: BookId,
    pub status: BookStatus,
    pub progress: u8,
    pub page_count: usize,
    pub estimated_time_remaining: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn from_book(book: &Book) -> Self {
        let progress = book.metadata.progress;
        // Error detail is only surfaced once the book is terminally failed.
        let error = match book.status {
            BookStatus::Failed => book.metadata.error.clone(),
            _ => None,
        };
        Self {
            book_id: book.id,
            status: book.status,
            progress,
            page_count: book.pages.len(),
            estimated_time_remaining: book.metadata.estimated_time_remaining.clone(),
            message: book.status.message(progress).to_string(),
            error,
        }
    }

    /// Report used when the record could not be read in time.
    pub fn pending(book_id: BookId) -> Self {
        Self {
            book_id,
            status: BookStatus::Processing,
            progress: 50,
            page_count: 0,
            estimated_time_remaining: "a few minutes".to_string(),
            message: PENDING_MESSAGE.to_string(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::sample_request;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookStatus::Processing,
            BookStatus::GeneratingImages,
            BookStatus::PdfError,
            BookStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<BookStatus>(), Ok(status));
        }
        assert_eq!("error".parse::<BookStatus>(), Ok(BookStatus::Failed));
    }

    #[test]
    fn test_processing_messages_follow_progress_buckets() {
        let s = BookStatus::Processing;
        assert_eq!(s.message(0), "Starting the creation of your story...");
        assert_eq!(
            s.message(25),
            "Developing the narrative and creating the characters..."
        );
        assert_eq!(s.message(59), "Creating the illustrations for each page...");
        assert_eq!(
            s.message(79),
            "Finishing the illustrations and formatting the book..."
        );
        assert_eq!(s.message(100), "Almost ready! Finishing the last details...");
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(BookStatus::Completed.message(100), "Your book is ready!");
        assert_eq!(
            BookStatus::ImagesError.message(40),
            "There was a problem generating the images. Trying again..."
        );
    }

    #[test]
    fn test_happy_path_transitions() {
        use BookStatus::*;
        let path = [
            Processing,
            GeneratingText,
            GeneratingImages,
            ImagesCompleted,
            GeneratingPdf,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_completed_is_frozen() {
        assert!(!BookStatus::Completed.can_transition_to(BookStatus::Failed));
        assert!(!BookStatus::Completed.can_transition_to(BookStatus::GeneratingText));
        assert!(BookStatus::Completed.can_transition_to(BookStatus::Completed));
    }

    #[test]
    fn test_stage_cannot_be_skipped() {
        assert!(!BookStatus::Processing.can_transition_to(BookStatus::GeneratingPdf));
        assert!(!BookStatus::GeneratingImages.can_transition_to(BookStatus::GeneratingText));
        assert!(BookStatus::GeneratingText.can_transition_to(BookStatus::Failed));
    }

    #[test]
    fn test_report_hides_error_until_failed() {
        let mut book = Book::new(sample_request());
        book.status = BookStatus::ImagesError;
        book.metadata.error = Some("provider down".to_string());
        assert_eq!(StatusReport::from_book(&book).error, None);

        book.status = BookStatus::Failed;
        let report = StatusReport::from_book(&book);
        assert_eq!(report.error.as_deref(), Some("provider down"));
        assert_eq!(report.book_id, book.id);
    }

    #[test]
    fn test_pending_report_shape() {
        let report = StatusReport::pending(BookId::new());
        assert_eq!(report.status, BookStatus::Processing);
        assert_eq!(report.progress, 50);
        assert_eq!(report.estimated_time_remaining, "a few minutes");
    }
}
