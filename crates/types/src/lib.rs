pub mod book;
pub mod ids;
pub mod job;
pub mod request;
pub mod status;
pub mod style;

pub use book::{Book, BookMetadata, ImageType, PLACEHOLDER_IMAGE_REF, Page};
pub use ids::{BookId, JobId};
pub use job::BookJob;
pub use request::{AgeProfile, AgeRange, Complexity, CreationRequest, ValidationError};
pub use status::{BookStatus, StatusReport};
pub use style::StyleGuide;
