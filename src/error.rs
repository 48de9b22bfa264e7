// src/error.rs
use fable_imaging::ImageError;
use fable_render_lopdf::RenderError;
use fable_traits::{QueueError, StoreError};
use fable_types::{BookId, ValidationError};
use thiserror::Error;

/// Error type for the book service and the generation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Book not found: {0}")]
    NotFound(BookId),

    #[error("Book store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Document assembly failed: {0}")]
    Render(#[from] RenderError),

    #[error("Image processing failed: {0}")]
    Image(#[from] ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Stage failed: {0}")]
    Stage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
