//! Runs one book job through its stages: story text, page images, document.
//!
//! Every stage persists a progress checkpoint before and after its work, so a
//! poller sees movement even when a later stage crashes. A stage failure is
//! recorded on the book and handed back to the queue, whose attempt budget
//! decides whether the whole job runs again. A redelivered job resumes after
//! the last stage that completed.

use crate::error::{PipelineError, Result};
use crate::pipeline::progress::Checkpoint;
use crate::storage::ArtifactStorage;
use async_trait::async_trait;
use chrono::Utc;
use fable_generation::GenerationClient;
use fable_render_lopdf::DocumentAssembler;
use fable_traits::{BookStore, BookUpdate, Delivery, JobError, JobHandler, StoreError};
use fable_types::{Book, BookId, BookStatus, CreationRequest, Page, StyleGuide};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Text,
    Images,
    Pdf,
}

impl Stage {
    /// Status recorded when this stage fails and another attempt will follow.
    pub fn error_status(&self) -> BookStatus {
        match self {
            Stage::Text => BookStatus::Failed,
            Stage::Images => BookStatus::ImagesError,
            Stage::Pdf => BookStatus::PdfError,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Text => "text",
            Stage::Images => "images",
            Stage::Pdf => "pdf",
        })
    }
}

/// The queue consumer that turns a book record into a finished document.
pub struct BookPipeline {
    store: Arc<dyn BookStore>,
    generator: Arc<GenerationClient>,
    assembler: DocumentAssembler,
    artifacts: Arc<dyn ArtifactStorage>,
    work_dir: PathBuf,
}

impl BookPipeline {
    pub fn new(
        store: Arc<dyn BookStore>,
        generator: Arc<GenerationClient>,
        assembler: DocumentAssembler,
        artifacts: Arc<dyn ArtifactStorage>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            generator,
            assembler,
            artifacts,
            work_dir: work_dir.into(),
        }
    }

    /// Runs every stage the book still needs.
    pub async fn run(&self, delivery: &Delivery) -> Result<()> {
        let book_id = delivery.book_id();
        let book = self
            .store
            .find_by_id(book_id)
            .await?
            .ok_or(PipelineError::NotFound(book_id))?;

        if book.status == BookStatus::Completed {
            info!("Book already completed, acknowledging redelivery");
            return Ok(());
        }

        let request = delivery.job.request();
        let style = StyleGuide::for_request(request);

        let book = if book.metadata.text_completed && !book.pages.is_empty() {
            info!(pages = book.pages.len(), "Reusing story from an earlier attempt");
            book
        } else {
            self.guard(delivery, Stage::Text, self.text_stage(book_id, request))
                .await?
        };

        let book = if book.metadata.images_completed && book.pages.iter().all(Page::has_image) {
            info!("Reusing images from an earlier attempt");
            book
        } else {
            self.guard(delivery, Stage::Images, self.image_stage(book, &style))
                .await?
        };

        let scratch = scratch_dir(&self.work_dir, book_id, delivery.attempt);
        self.guard(delivery, Stage::Pdf, self.pdf_stage(book, &scratch))
            .await?;

        let book_dir = self.work_dir.join(book_id.to_string());
        if let Err(e) = tokio::fs::remove_dir_all(&book_dir).await {
            debug!(error = %e, dir = %book_dir.display(), "No scratch files left to clean");
        }
        Ok(())
    }

    async fn guard<F>(&self, delivery: &Delivery, stage: Stage, work: F) -> Result<Book>
    where
        F: std::future::Future<Output = Result<Book>>,
    {
        match work.await {
            Ok(book) => Ok(book),
            Err(e) => {
                self.fail_stage(delivery, stage, &e).await;
                Err(e)
            }
        }
    }

    async fn text_stage(&self, book_id: BookId, request: &CreationRequest) -> Result<Book> {
        self.store
            .update_fields(book_id, Checkpoint::TEXT_STARTED.update().clear_error())
            .await?;

        let story = self.generator.generate_story(request).await;
        let pages = story.pages();
        if pages.is_empty() {
            return Err(PipelineError::Stage("story produced no pages".to_string()));
        }
        let word_count: usize = pages.iter().map(|p| p.text.split_whitespace().count()).sum();
        info!(
            stage = %Stage::Text,
            pages = pages.len(),
            word_count,
            fallback = story.is_fallback(),
            "Story ready"
        );

        let update = BookUpdate {
            word_count: Some(word_count),
            page_count: Some(pages.len()),
            text_completed: Some(true),
            fallback_story: Some(story.is_fallback()),
            ..BookUpdate::new().with_pages(pages)
        };
        Ok(self.store.update_fields(book_id, update).await?)
    }

    async fn image_stage(&self, book: Book, style: &StyleGuide) -> Result<Book> {
        let book_id = book.id;
        self.store
            .update_fields(book_id, Checkpoint::IMAGES_STARTED.update().clear_error())
            .await?;

        let images = self
            .generator
            .generate_images_for_story(&book.pages, style)
            .await;
        if images.len() != book.pages.len() {
            return Err(PipelineError::Stage(format!(
                "expected {} images, got {}",
                book.pages.len(),
                images.len()
            )));
        }

        let fallback_images = images.iter().filter(|i| i.is_placeholder()).count();
        let mut pages = book.pages;
        for (page, image) in pages.iter_mut().zip(images) {
            page.image_ref = Some(image.reference);
        }
        info!(
            stage = %Stage::Images,
            pages = pages.len(),
            fallback_images,
            "Illustrations ready"
        );

        let update = BookUpdate {
            page_count: Some(pages.len()),
            images_completed: Some(true),
            fallback_images: Some(fallback_images),
            ..Checkpoint::IMAGES_DONE.update().with_pages(pages)
        };
        Ok(self.store.update_fields(book_id, update).await?)
    }

    async fn pdf_stage(&self, book: Book, scratch: &Path) -> Result<Book> {
        let book_id = book.id;
        let book = self
            .store
            .update_fields(book_id, Checkpoint::PDF_STARTED.update().clear_error())
            .await?;

        let staging = self.work_dir.join("out");
        let pdf = self.assembler.assemble(&book, scratch, &staging).await?;
        let location = self.artifacts.store(book_id, &pdf.path).await?;
        info!(
            stage = %Stage::Pdf,
            location = %location,
            bytes = pdf.bytes,
            pdf_pages = pdf.page_count,
            "Document stored"
        );

        let update = BookUpdate {
            pdf_completed: Some(true),
            ..Checkpoint::COMPLETED
                .update()
                .with_pdf_location(location)
                .clear_error()
        };
        Ok(self.store.update_fields(book_id, update).await?)
    }

    /// Records a stage failure on the book. On the last attempt the book is
    /// marked `failed` directly.
    async fn fail_stage(&self, delivery: &Delivery, stage: Stage, err: &PipelineError) {
        let book_id = delivery.book_id();
        let final_attempt = delivery.is_final_attempt();
        let status = if final_attempt {
            BookStatus::Failed
        } else {
            stage.error_status()
        };
        let message = format!("{} stage failed: {}", stage, err);
        error!(stage = %stage, final_attempt, error = %err, "Stage failed");

        let update = failure_update(status, &message);
        match self.store.update_fields(book_id, update).await {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, to, .. }) if to != BookStatus::Failed => {
                debug!(%from, %to, "Cannot enter stage error state, marking failed");
                if let Err(e) = self
                    .store
                    .update_fields(book_id, failure_update(BookStatus::Failed, &message))
                    .await
                {
                    warn!(error = %e, "Could not record stage failure");
                }
            }
            Err(e) => warn!(error = %e, "Could not record stage failure"),
        }
    }
}

/// Image scratch space for one delivery. An attempt abandoned after a stall
/// may still be writing into its own directory, so attempts never share one.
fn scratch_dir(work_dir: &Path, book_id: BookId, attempt: u32) -> PathBuf {
    work_dir
        .join(book_id.to_string())
        .join(format!("attempt-{}", attempt))
}

fn failure_update(status: BookStatus, message: &str) -> BookUpdate {
    let update = BookUpdate::status(status).with_error(message);
    if status == BookStatus::Failed {
        BookUpdate {
            failed_at: Some(Utc::now()),
            ..update
        }
    } else {
        update
    }
}

#[async_trait]
impl JobHandler for BookPipeline {
    async fn handle(&self, delivery: &Delivery) -> std::result::Result<(), JobError> {
        let span = info_span!(
            "book_job",
            book_id = %delivery.book_id(),
            job_id = %delivery.job_id,
            attempt = delivery.attempt,
        );
        self.run(delivery)
            .instrument(span)
            .await
            .map_err(|e| JobError::Failed(e.to_string()))
    }
}
