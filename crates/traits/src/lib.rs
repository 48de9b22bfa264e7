pub mod provider;
pub mod queue;
pub mod store;

pub use provider::{
    ImageFetcher, ImageGenerator, ImageRequest, ImageSize, ProviderError, TextGenerator,
    TextRequest,
};
pub use queue::{
    Backoff, BackoffKind, Delivery, JobError, JobHandler, JobOptions, JobQueue, QueueError,
    QueueEvent,
};
pub use store::{BookStore, BookUpdate, InMemoryBookStore, StoreError};
