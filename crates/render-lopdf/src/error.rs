use fable_imaging::ImageError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF library error: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image preparation failed: {0}")]
    Image(#[from] ImageError),

    #[error("Book has no pages to assemble")]
    NoPages,

    #[error("Writer produced an empty file at {0}")]
    EmptyOutput(PathBuf),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<lopdf::Error> for RenderError {
    fn from(e: lopdf::Error) -> Self {
        RenderError::Pdf(e.to_string())
    }
}
