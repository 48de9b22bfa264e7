use crate::error::RenderError;
use crate::prepare::{ImagePreparer, PreparedImage};
use crate::writer::{BookPdfWriter, EmbeddedImage};
use chrono::Utc;
use fable_types::Book;
use std::path::{Path, PathBuf};

const COLOPHON_NOTE: &str = "This book was written and illustrated automatically from a story request. \
Pages marked \"Image not available\" could not be illustrated in time.";

/// A PDF that exists on disk and is not empty.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPdf {
    pub path: PathBuf,
    pub bytes: u64,
    pub page_count: usize,
}

/// Turns a book with text and image references into a PDF file.
#[derive(Clone)]
pub struct DocumentAssembler {
    preparer: ImagePreparer,
}

async fn load(image: Option<PreparedImage>) -> Option<EmbeddedImage> {
    let image = image?;
    match tokio::fs::read(&image.path).await {
        Ok(data) if !data.is_empty() => Some(EmbeddedImage {
            data,
            width: image.width,
            height: image.height,
        }),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Cannot read prepared image {}: {}", image.path.display(), e);
            None
        }
    }
}

/// Facts listed on the closing page.
fn colophon_facts(book: &Book) -> Vec<(&'static str, String)> {
    let r = &book.request;
    vec![
        ("Title", r.title.trim().to_string()),
        ("Author", r.author_display().to_string()),
        ("Genre", r.genre.trim().to_string()),
        ("Theme", r.theme.trim().to_string()),
        ("Main character", r.main_character.trim().to_string()),
        ("Secondary character", r.secondary_display().to_string()),
        ("Setting", r.setting.trim().to_string()),
        ("Age range", r.age_range.to_string()),
        ("Created", book.created_at.format("%Y-%m-%d").to_string()),
    ]
}

impl DocumentAssembler {
    pub fn new(preparer: ImagePreparer) -> Self {
        Self { preparer }
    }

    /// Builds the document in memory from already-loaded images.
    pub fn build(book: &Book, images: &[Option<EmbeddedImage>]) -> Result<lopdf::Document, RenderError> {
        if book.pages.is_empty() {
            return Err(RenderError::NoPages);
        }
        let request = &book.request;
        let mut writer = BookPdfWriter::new();

        let subtitle = format!(
            "{} | {} | ages {}",
            request.genre.trim(),
            request.theme.trim(),
            request.age_range
        );
        let cover_image = images.first().and_then(Option::as_ref);
        writer.cover(book.title().trim(), request.author_display(), &subtitle, cover_image)?;

        for (i, page) in book.pages.iter().enumerate() {
            let image = images.get(i).and_then(Option::as_ref);
            writer.story_page(i + 1, &page.text, image)?;
        }

        writer.colophon(&colophon_facts(book), COLOPHON_NOTE)?;
        writer.finish()
    }

    /// Prepares images in `scratch_dir`, writes `<bookId>-<millis>.pdf` into
    /// `output_dir` and confirms the file is non-empty before returning.
    ///
    /// `scratch_dir` is owned by this call and removed once the document is
    /// written.
    pub async fn assemble(&self, book: &Book, scratch_dir: &Path, output_dir: &Path) -> Result<AssembledPdf, RenderError> {
        if book.pages.is_empty() {
            return Err(RenderError::NoPages);
        }
        let prepared = self.preparer.prepare(&book.pages, scratch_dir).await;
        let placeholders = prepared
            .iter()
            .filter(|p| p.as_ref().is_none_or(|p| p.placeholder))
            .count();

        let mut images = Vec::with_capacity(prepared.len());
        for image in prepared {
            images.push(load(image).await);
        }

        let mut document = Self::build(book, &images)?;
        let page_count = document.get_pages().len();
        let mut buffer = Vec::new();
        document.save_to(&mut buffer)?;

        tokio::fs::create_dir_all(output_dir).await?;
        let file_name = format!("{}-{}.pdf", book.id, Utc::now().timestamp_millis());
        let path = output_dir.join(&file_name);
        let tmp = output_dir.join(format!("{}.tmp", file_name));
        tokio::fs::write(&tmp, &buffer).await?;
        let bytes = tokio::fs::metadata(&tmp).await?.len();
        if bytes == 0 {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RenderError::EmptyOutput(tmp));
        }
        tokio::fs::rename(&tmp, &path).await?;

        if let Err(e) = tokio::fs::remove_dir_all(scratch_dir).await {
            log::debug!("Could not clean {}: {}", scratch_dir.display(), e);
        }
        log::info!(
            "Assembled {} ({} pages, {} bytes, {} placeholder images)",
            path.display(),
            page_count,
            bytes,
            placeholders
        );
        Ok(AssembledPdf {
            path,
            bytes,
            page_count,
        })
    }
}
