//! Filesystem persistence for book records and generated documents.

pub mod artifacts;
pub mod books;

pub use artifacts::{ArtifactStorage, FilesystemArtifactStorage};
pub use books::FilesystemBookStore;
