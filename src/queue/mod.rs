//! Job queue backends.

pub mod memory;

pub use memory::{InMemoryJobQueue, WorkerPool};
