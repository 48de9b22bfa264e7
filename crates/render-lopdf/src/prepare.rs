//! Image pre-pass: turns every page's image reference into a local JPEG.
//!
//! All network access for assembly happens here. The writer only reads the
//! files this module produces.

use crate::error::RenderError;
use fable_imaging::{ImageOptimizer, Optimized, decode_image};
use fable_traits::ImageFetcher;
use fable_types::Page;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A page image ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub placeholder: bool,
}

impl From<Optimized> for PreparedImage {
    fn from(o: Optimized) -> Self {
        let placeholder = o.is_placeholder();
        Self {
            path: o.path,
            width: o.width,
            height: o.height,
            placeholder,
        }
    }
}

#[derive(Clone)]
pub struct ImagePreparer {
    fetcher: Arc<dyn ImageFetcher>,
    optimizer: ImageOptimizer,
}

impl ImagePreparer {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, optimizer: ImageOptimizer) -> Self {
        Self { fetcher, optimizer }
    }

    pub fn optimizer(&self) -> &ImageOptimizer {
        &self.optimizer
    }

    async fn placeholder(&self, output: PathBuf) -> Result<PreparedImage, RenderError> {
        let optimizer = self.optimizer.clone();
        let optimized = tokio::task::spawn_blocking(move || optimizer.write_placeholder(&output))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;
        Ok(optimized.into())
    }

    async fn prepare_page(&self, page: &Page, output: PathBuf) -> Result<PreparedImage, RenderError> {
        let reference = match page.image_ref.as_deref() {
            Some(r) if page.has_image() && !page.has_placeholder_image() => r,
            _ => return self.placeholder(output).await,
        };

        let bytes = match self.fetcher.fetch(reference).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Page {}: cannot fetch image ({}), using placeholder", page.page_number, e);
                return self.placeholder(output).await;
            }
        };

        let optimizer = self.optimizer.clone();
        let page_number = page.page_number;
        let optimized = tokio::task::spawn_blocking(move || match decode_image(&bytes) {
            Ok((_, img)) => optimizer.optimize_decoded(&img, bytes.len() as u64, &output),
            Err(e) => {
                log::warn!("Page {}: invalid image ({}), using placeholder", page_number, e);
                optimizer.write_placeholder(&output)
            }
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))??;
        log::debug!(
            "Page {}: prepared {}x{} image ({} bytes, {:?})",
            page.page_number,
            optimized.width,
            optimized.height,
            optimized.bytes,
            optimized.tier
        );
        Ok(optimized.into())
    }

    /// One entry per page, in page order. `None` means even the placeholder
    /// could not be written; the writer then draws a placeholder rectangle.
    pub async fn prepare(&self, pages: &[Page], work_dir: &Path) -> Vec<Option<PreparedImage>> {
        if let Err(e) = tokio::fs::create_dir_all(work_dir).await {
            log::warn!("Cannot create work directory {}: {}", work_dir.display(), e);
        }
        let mut prepared = Vec::with_capacity(pages.len());
        for page in pages {
            let output = work_dir.join(format!("page-{:03}.jpg", page.page_number));
            match self.prepare_page(page, output).await {
                Ok(image) => prepared.push(Some(image)),
                Err(e) => {
                    log::error!("Page {}: image preparation failed: {}", page.page_number, e);
                    prepared.push(None);
                }
            }
        }
        prepared
    }
}
