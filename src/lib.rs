//! Illustrated children's book generation.
//!
//! A creation request becomes a [`fable_types::Book`] record and a queued job.
//! Queue workers run the [`pipeline::BookPipeline`]: story text, one
//! illustration per page, then a PDF. Progress is written to the record at
//! fixed checkpoints so [`BookService::status`] can report it while the job
//! runs.
//!
//! ```ignore
//! let config = fable::Config::load(None)?;
//! let app = fable::App::start(&config).await?;
//! let book = app.service().create_book(request).await?;
//! let report = app.service().status(book.id).await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod storage;

pub use app::App;
pub use config::Config;
pub use error::{PipelineError, Result};
pub use service::BookService;

pub use fable_types::{Book, BookId, BookStatus, CreationRequest, StatusReport};
