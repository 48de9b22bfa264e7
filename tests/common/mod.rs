#![allow(dead_code)]

use async_trait::async_trait;
use fable::storage::{ArtifactStorage, FilesystemArtifactStorage};
use fable::{App, Book, BookId, BookStatus, Config, CreationRequest};
use fable_generation::{GenerationClient, GenerationConfig, RetryPolicy};
use fable_traits::{
    BookStore, BookUpdate, ImageFetcher, ImageGenerator, ImageRequest, InMemoryBookStore,
    ProviderError, QueueEvent, StoreError, TextGenerator, TextRequest,
};
use fable_types::AgeRange;
use image::{Rgb, RgbImage};
use lopdf::Document as LopdfDocument;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const STORY: &str = "Pip the penguin woke up early and looked at the frozen sea.\n\n\
Pip waddled across the ice to find his best friend Ola the seal.\n\n\
Together they slid down a great snowy hill, laughing all the way.\n\n\
A storm rolled in, so Pip and Ola built a snug igloo to hide.\n\n\
When the sun came back they watched the sparkling sea until bedtime.";

pub const STORY_PAGES: usize = 5;

pub fn request() -> CreationRequest {
    CreationRequest {
        title: "Pip and the Frozen Sea".to_string(),
        genre: "adventure".to_string(),
        theme: "friendship".to_string(),
        main_character: "Pip".to_string(),
        main_character_description: "a small penguin with a red scarf".to_string(),
        secondary_character: Some("Ola".to_string()),
        secondary_character_description: Some("a gray seal with white whiskers".to_string()),
        setting: "the South Pole".to_string(),
        environment_description: Some("icebergs under a pale blue sky".to_string()),
        tone: "fun".to_string(),
        age_range: AgeRange::FiveToSix,
        author_name: Some("Test Author".to_string()),
        language: "en".to_string(),
    }
}

/// Text provider returning a fixed story, optionally failing or stalling.
pub struct ScriptedText {
    story: Option<String>,
    /// Calls before this count sleep long enough to trip the queue timeout.
    stall_first: usize,
    pub calls: AtomicUsize,
}

impl ScriptedText {
    pub fn story(story: &str) -> Arc<Self> {
        Arc::new(Self {
            story: Some(story.to_string()),
            stall_first: 0,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            story: None,
            stall_first: 0,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn stalling_once(story: &str) -> Arc<Self> {
        Arc::new(Self {
            story: Some(story.to_string()),
            stall_first: 1,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, _request: &TextRequest) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.stall_first {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.story
            .clone()
            .ok_or_else(|| ProviderError::Http {
                status: 503,
                message: "text model overloaded".to_string(),
            })
    }
}

/// Page number embedded in a full image prompt ("... page 3 of 5 ...").
pub fn prompt_page(prompt: &str) -> Option<usize> {
    let rest = prompt.split("page ").nth(1)?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Image provider handing out `mem://page-N` references.
///
/// Every attempt for a page listed in `failing_pages` fails, and so does the
/// simplified request that follows it. Pages must be requested one at a time.
pub struct MemoryImages {
    failing_pages: Vec<usize>,
    in_failing_page: Mutex<bool>,
    pub prompts: Mutex<Vec<String>>,
}

impl MemoryImages {
    pub fn new() -> Arc<Self> {
        Self::failing_on(&[])
    }

    pub fn failing_on(pages: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            failing_pages: pages.to_vec(),
            in_failing_page: Mutex::new(false),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for MemoryImages {
    fn name(&self) -> &str {
        "memory"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let page = prompt_page(&request.prompt);
        let mut failing = self.in_failing_page.lock().unwrap();
        let fail = match page {
            Some(n) => {
                *failing = self.failing_pages.contains(&n);
                *failing
            }
            None => *failing,
        };
        if fail {
            return Err(ProviderError::Http {
                status: 500,
                message: "image model error".to_string(),
            });
        }
        Ok(match page {
            Some(n) => format!("mem://page-{}", n),
            None => "mem://simplified".to_string(),
        })
    }
}

/// Small but real PNG payload.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 255) as u8, (y * 11 % 255) as u8, ((x + y) % 255) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Resolves `mem://` references to PNG bytes.
pub struct MemoryFetcher;

#[async_trait]
impl ImageFetcher for MemoryFetcher {
    async fn verify(&self, reference: &str) -> Result<(), ProviderError> {
        if reference.starts_with("mem://") {
            Ok(())
        } else {
            Err(ProviderError::Unreachable(reference.to_string()))
        }
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ProviderError> {
        self.verify(reference).await?;
        Ok(png_bytes(64, 48))
    }
}

/// Book store that remembers every status/progress pair it wrote.
#[derive(Default)]
pub struct RecordingStore {
    inner: InMemoryBookStore,
    pub history: Mutex<Vec<(BookStatus, u8)>>,
}

impl RecordingStore {
    pub fn history(&self) -> Vec<(BookStatus, u8)> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookStore for RecordingStore {
    async fn find_by_id(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, book: &Book) -> Result<(), StoreError> {
        self.history.lock().unwrap().push((book.status, book.metadata.progress));
        self.inner.save(book).await
    }

    async fn update_fields(&self, id: BookId, update: BookUpdate) -> Result<Book, StoreError> {
        let book = self.inner.update_fields(id, update).await?;
        self.history.lock().unwrap().push((book.status, book.metadata.progress));
        Ok(book)
    }
}

/// Artifact storage that refuses every document.
pub struct BrokenArtifacts;

#[async_trait]
impl ArtifactStorage for BrokenArtifacts {
    async fn store(&self, _book_id: BookId, _source: &Path) -> Result<String, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }
}

pub fn config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.queue.backoff_initial_ms = 10;
    config.queue.timeout_secs = 60;
    config.queue.workers = 2;
    config
}

/// Generation settings with every pause removed.
pub fn generation_config() -> GenerationConfig {
    GenerationConfig {
        image_retry: RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
        .without_jitter(),
        page_delay: Duration::ZERO,
        ..GenerationConfig::default()
    }
}

pub struct Harness {
    pub app: App,
    pub store: Arc<RecordingStore>,
    pub text: Arc<ScriptedText>,
    pub images: Arc<MemoryImages>,
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    text: Arc<ScriptedText>,
    images: Arc<MemoryImages>,
    broken_artifacts: bool,
    attempts: u32,
    timeout_secs: u64,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            text: ScriptedText::story(STORY),
            images: MemoryImages::new(),
            broken_artifacts: false,
            attempts: 3,
            timeout_secs: 60,
        }
    }

    pub fn text(mut self, text: Arc<ScriptedText>) -> Self {
        self.text = text;
        self
    }

    pub fn images(mut self, images: Arc<MemoryImages>) -> Self {
        self.images = images;
        self
    }

    pub fn broken_artifacts(mut self) -> Self {
        self.broken_artifacts = true;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub async fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.queue.attempts = self.attempts;
        config.queue.timeout_secs = self.timeout_secs;

        let store = Arc::new(RecordingStore::default());
        let generator = Arc::new(GenerationClient::new(
            self.text.clone(),
            self.images.clone(),
            Arc::new(MemoryFetcher),
            generation_config(),
        ));
        let artifacts: Arc<dyn ArtifactStorage> = if self.broken_artifacts {
            Arc::new(BrokenArtifacts)
        } else {
            Arc::new(
                FilesystemArtifactStorage::new(config.storage.pdfs_dir())
                    .await
                    .unwrap(),
            )
        };
        let app = App::with_parts(&config, store.clone(), generator, artifacts);
        Harness {
            app,
            store,
            text: self.text,
            images: self.images,
            dir,
        }
    }
}

impl Harness {
    /// Submits `request` and waits for its job to finish for good.
    pub async fn run(&self, request: CreationRequest) -> (Book, QueueEvent) {
        let mut events = self.app.subscribe();
        let book = self.app.service().create_book(request).await.unwrap();
        let event = tokio::time::timeout(
            Duration::from_secs(60),
            App::wait_for(&mut events, book.id),
        )
        .await
        .expect("job did not finish in time")
        .expect("queue event stream closed");
        (book, event)
    }

    /// Stops the app so every queue event has been written, then loads the book.
    pub async fn finish(self, id: BookId) -> (Book, Arc<RecordingStore>, TempDir) {
        let Harness {
            app, store, dir, ..
        } = self;
        app.shutdown().await;
        let book = store.find_by_id(id).await.unwrap().unwrap();
        (book, store, dir)
    }
}

/// Loads a generated PDF with lopdf.
pub fn load_pdf(path: &str) -> LopdfDocument {
    let bytes = std::fs::read(path).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "not a PDF: {}", path);
    LopdfDocument::load_mem(&bytes).unwrap()
}
