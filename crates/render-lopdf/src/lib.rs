//! Children's book PDF assembly using lopdf.
//!
//! Assembly runs in two steps. [`ImagePreparer`] resolves every page image to
//! a local, size-bounded JPEG (or a placeholder), then [`BookPdfWriter`] lays
//! out a cover, one page per story page and a colophon. Missing images never
//! stop assembly.

mod assembler;
mod error;
pub mod layout;
mod prepare;
mod writer;

pub use assembler::{AssembledPdf, DocumentAssembler};
pub use error::RenderError;
pub use prepare::{ImagePreparer, PreparedImage};
pub use writer::{BookPdfWriter, EmbeddedImage, MARGIN, PAGE_HEIGHT, PAGE_WIDTH};
