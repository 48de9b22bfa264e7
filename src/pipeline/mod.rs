//! Book generation pipeline.
//!
//! - [`BookPipeline`]: the job handler driving a book through its stages
//! - [`Checkpoint`]: fixed progress points persisted between stages
//! - [`spawn_event_recorder`]: copies queue stall/failure events onto books

pub mod events;
mod orchestrator;
pub mod progress;

pub use events::spawn_event_recorder;
pub use orchestrator::{BookPipeline, Stage};
pub use progress::Checkpoint;
