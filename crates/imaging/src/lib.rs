//! Image Optimization Engine.
//!
//! Turns arbitrary raster payloads into JPEG files that fit a byte budget and a
//! pixel box, degrading through quality tiers and finally to a synthesized
//! placeholder. An optimization call never leaves the output path empty.

mod error;
mod optimizer;
mod placeholder;
mod validate;

pub use error::ImageError;
pub use optimizer::{ImageOptimizer, Optimized, OptimizerConfig, Tier};
pub use placeholder::{PLACEHOLDER_LABEL, render_placeholder};
pub use validate::{ImageInfo, InvalidImage, decode_image, inspect_image, is_valid_image, is_valid_image_file};
