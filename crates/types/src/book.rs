use crate::ids::BookId;
use crate::request::CreationRequest;
use crate::status::BookStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image reference recorded for a page whose illustration could not be
/// generated. Resolved to a synthesized placeholder at assembly time.
pub const PLACEHOLDER_IMAGE_REF: &str = "fallback:page-placeholder";

/// Layout role of a page illustration. Selects image size and framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Cover,
    FullPage,
    Spread,
    Inline,
}

impl ImageType {
    /// Framing hint appended to the image prompt.
    pub fn framing(&self) -> &'static str {
        match self {
            ImageType::Cover => "book cover composition, main character centered",
            ImageType::FullPage => "full page illustration",
            ImageType::Spread => "wide panoramic double-page scene",
            ImageType::Inline => "small vignette illustration on a plain background",
        }
    }
}

/// One unit of narrative text plus its illustration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based, dense.
    pub page_number: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub image_type: ImageType,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>, image_type: ImageType) -> Self {
        Self {
            page_number,
            text: text.into(),
            image_ref: None,
            image_type,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_ref
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    pub fn has_placeholder_image(&self) -> bool {
        self.image_ref.as_deref() == Some(PLACEHOLDER_IMAGE_REF)
    }
}

/// Pipeline bookkeeping stored alongside a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub progress: u8,
    pub estimated_time_remaining: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(default)]
    pub text_completed: bool,
    #[serde(default)]
    pub images_completed: bool,
    #[serde(default)]
    pub pdf_completed: bool,
    #[serde(default)]
    pub fallback_story: bool,
    #[serde(default)]
    pub fallback_images: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stalled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stalled_job_id: Option<String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            progress: 0,
            estimated_time_remaining: "10-15 minutes".to_string(),
            error: None,
            word_count: None,
            page_count: None,
            text_completed: false,
            images_completed: false,
            pdf_completed: false,
            fallback_story: false,
            fallback_images: 0,
            failed_at: None,
            stalled_at: None,
            stalled_job_id: None,
        }
    }
}

/// The persisted unit representing one creation request and its artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub request: CreationRequest,
    pub status: BookStatus,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_location: Option<String>,
    #[serde(default)]
    pub metadata: BookMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// A fresh record in `processing` with no pages.
    pub fn new(request: CreationRequest) -> Self {
        Self::with_id(BookId::new(), request)
    }

    pub fn with_id(id: BookId, request: CreationRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            request,
            status: BookStatus::Processing,
            pages: Vec::new(),
            pdf_location: None,
            metadata: BookMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn title(&self) -> &str {
        &self.request.title
    }

    pub fn word_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.text.split_whitespace().count())
            .sum()
    }
}
