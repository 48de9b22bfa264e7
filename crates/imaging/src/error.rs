use crate::validate::InvalidImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("Input image is empty")]
    EmptyInput,

    #[error("Invalid image: {0}")]
    Invalid(#[from] InvalidImage),

    #[error("Encoded image is {bytes} bytes, budget is {budget}")]
    OverBudget { bytes: u64, budget: u64 },

    #[error("Output file is missing or empty: {0}")]
    EmptyOutput(PathBuf),
}
