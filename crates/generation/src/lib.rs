//! Story and illustration generation.
//!
//! [`GenerationClient`] is the only type the pipeline talks to. It owns prompt
//! construction, retries with backoff, reference verification and the
//! deterministic fallbacks in [`FallbackContent`]. Concrete providers plug in
//! through the `fable-traits` capability traits: [`OpenAiProvider`] for an
//! OpenAI-compatible HTTP API and the offline pair for local runs.

pub mod client;
pub mod fallback;
pub mod fetch;
pub mod offline;
pub mod openai;
pub mod prompt;
pub mod retry;
pub mod story;

pub use client::{GenerationClient, GenerationConfig, ImageSource, PageImage};
pub use fallback::FallbackContent;
pub use fetch::HttpImageFetcher;
pub use offline::{OfflineImageGenerator, OfflineTextGenerator};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use retry::RetryPolicy;
pub use story::{Story, StorySource, split_pages};
