//! Text and image generation capabilities, and image reference retrieval.
//!
//! The wire format of any concrete provider stays behind these traits. The
//! generation client only sees "prompt in, text out" and "prompt in, image
//! reference out".

use async_trait::async_trait;
use fable_types::ImageType;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Error type for provider calls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Image reference is not retrievable: {0}")]
    Unreachable(String),
}

impl ProviderError {
    /// Transient failures are worth another attempt; policy rejections and
    /// request errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Malformed(_)
            | ProviderError::Network(_)
            | ProviderError::Unreachable(_) => true,
            ProviderError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ProviderError::ContentPolicy(_) | ProviderError::Unavailable(_) => false,
        }
    }
}

/// A request to the text-generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Pixel size of a requested image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid image size: {}", s))?;
        let width = w.parse().map_err(|_| format!("Invalid image width: {}", w))?;
        let height = h.parse().map_err(|_| format!("Invalid image height: {}", h))?;
        if width == 0 || height == 0 {
            return Err(format!("Image size must be non-zero: {}", s));
        }
        Ok(Self { width, height })
    }
}

/// A request to the image-generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub quality: String,
    pub style: Option<String>,
    pub image_type: ImageType,
}

/// Given a prompt, return text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, request: &TextRequest) -> Result<String, ProviderError>;
}

/// Given a prompt, return a reference (URL or local path) to an image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError>;
}

/// Retrieves image bytes behind a reference returned by an [`ImageGenerator`].
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Confirm the reference is retrievable without keeping the payload.
    async fn verify(&self, reference: &str) -> Result<(), ProviderError>;

    /// Download the full payload.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ProviderError>;
}
