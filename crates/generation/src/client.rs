use crate::fallback::FallbackContent;
use crate::fetch::HttpImageFetcher;
use crate::offline::{OfflineImageGenerator, OfflineTextGenerator};
use crate::openai::{OpenAiConfig, OpenAiProvider};
use crate::prompt::{image_prompt, simplified_prompt, story_prompt, story_system_prompt};
use crate::retry::RetryPolicy;
use crate::story::{Story, StorySource, split_pages};
use fable_traits::{
    ImageFetcher, ImageGenerator, ImageRequest, ImageSize, ProviderError, TextGenerator,
    TextRequest,
};
use fable_types::{CreationRequest, ImageType, Page, StyleGuide};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`GenerationClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub text_timeout: Duration,
    pub text_max_tokens: u32,
    pub temperature: f32,
    pub image_retry: RetryPolicy,
    pub image_size: ImageSize,
    pub simplified_size: ImageSize,
    pub image_quality: String,
    pub image_style: Option<String>,
    /// Pages whose images may be in flight at once.
    pub concurrency: usize,
    /// Pause before requesting each page after the first.
    pub page_delay: Duration,
    pub max_prompt_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            text_timeout: Duration::from_secs(90),
            text_max_tokens: 2000,
            temperature: 0.7,
            image_retry: RetryPolicy::default(),
            image_size: ImageSize::new(1024, 1024),
            simplified_size: ImageSize::new(512, 512),
            image_quality: "standard".to_string(),
            image_style: Some("vivid".to_string()),
            concurrency: 1,
            page_delay: Duration::from_secs(8),
            max_prompt_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Produced from the full page prompt.
    Generated,
    /// Produced from the short fallback prompt.
    Simplified,
    /// Nothing could be produced; the reference is the static placeholder.
    Placeholder,
}

/// Outcome of one page illustration. `reference` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub reference: String,
    pub source: ImageSource,
}

impl PageImage {
    pub fn is_placeholder(&self) -> bool {
        self.source == ImageSource::Placeholder
    }
}

/// Single entry point for story and illustration generation.
///
/// Provider failures never escape: stories fall back to templates and images
/// fall back to a simplified prompt and then to the placeholder reference.
#[derive(Clone)]
pub struct GenerationClient {
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    fetcher: Arc<dyn ImageFetcher>,
    fallback: FallbackContent,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        fetcher: Arc<dyn ImageFetcher>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            text,
            images,
            fetcher,
            fallback: FallbackContent::new(),
            config,
        }
    }

    /// Client backed by an OpenAI-compatible API.
    pub fn openai(provider: OpenAiConfig, fetcher: HttpImageFetcher, config: GenerationConfig) -> Self {
        let api = Arc::new(OpenAiProvider::new(provider));
        Self::new(api.clone(), api, Arc::new(fetcher), config)
    }

    /// Client that never touches the network. Images land in `image_dir`.
    pub fn offline(image_dir: impl Into<PathBuf>, config: GenerationConfig) -> Self {
        Self::new(
            Arc::new(OfflineTextGenerator),
            Arc::new(OfflineImageGenerator::new(image_dir)),
            Arc::new(HttpImageFetcher::default()),
            config,
        )
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn fetcher(&self) -> Arc<dyn ImageFetcher> {
        self.fetcher.clone()
    }

    pub fn size_for(&self, image_type: ImageType) -> ImageSize {
        let base = self.config.image_size;
        match image_type {
            ImageType::Spread => ImageSize::new(base.width.saturating_mul(7) / 4, base.height),
            ImageType::Cover | ImageType::FullPage | ImageType::Inline => base,
        }
    }

    /// One call to the text capability. Falls back to the template story on
    /// any failure, including a response with no usable pages.
    pub async fn generate_story(&self, request: &CreationRequest) -> Story {
        let text_request = TextRequest {
            system: story_system_prompt(request),
            prompt: story_prompt(request),
            max_tokens: self.config.text_max_tokens,
            temperature: self.config.temperature,
        };

        let result = match tokio::time::timeout(
            self.config.text_timeout,
            self.text.generate_text(&text_request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.config.text_timeout)),
        };

        match result {
            Ok(text) if !split_pages(&text).is_empty() => {
                log::info!(
                    "Story for '{}' generated by {} ({} chars)",
                    request.title,
                    self.text.name(),
                    text.len()
                );
                Story {
                    text,
                    source: StorySource::Provider,
                }
            }
            Ok(_) => {
                log::warn!("Provider returned an empty story for '{}', using template", request.title);
                self.fallback_story(request)
            }
            Err(err) => {
                log::warn!("Story generation failed for '{}': {}; using template", request.title, err);
                self.fallback_story(request)
            }
        }
    }

    fn fallback_story(&self, request: &CreationRequest) -> Story {
        Story {
            text: self.fallback.story(request),
            source: StorySource::Fallback,
        }
    }

    async fn attempt_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let reference = self.images.generate_image(request).await?;
        if reference.trim().is_empty() {
            return Err(ProviderError::Malformed("empty image reference".to_string()));
        }
        self.fetcher.verify(&reference).await?;
        Ok(reference)
    }

    /// Illustration for the page at `page_index` (0-based) of `total_pages`.
    pub async fn generate_image(
        &self,
        page: &Page,
        style: &StyleGuide,
        page_index: usize,
        total_pages: usize,
    ) -> PageImage {
        let label = format!("image for page {}/{}", page_index + 1, total_pages);
        let request = ImageRequest {
            prompt: image_prompt(
                &page.text,
                style,
                page_index,
                total_pages,
                page.image_type,
                self.config.max_prompt_chars,
            ),
            size: self.size_for(page.image_type),
            quality: self.config.image_quality.clone(),
            style: self.config.image_style.clone(),
            image_type: page.image_type,
        };
        log::debug!("{}: prompt of {} chars", label, request.prompt.chars().count());

        match self
            .config
            .image_retry
            .run(&label, |_| self.attempt_image(&request))
            .await
        {
            Ok(reference) => {
                return PageImage {
                    reference,
                    source: ImageSource::Generated,
                };
            }
            Err(err) => log::warn!("{}: full prompt failed ({}), trying simplified prompt", label, err),
        }

        let simple = ImageRequest {
            prompt: simplified_prompt(style),
            size: self.config.simplified_size,
            ..request
        };
        let once = RetryPolicy::once(self.config.image_retry.timeout_for(1));
        match once.run(&label, |_| self.attempt_image(&simple)).await {
            Ok(reference) => PageImage {
                reference,
                source: ImageSource::Simplified,
            },
            Err(err) => {
                log::warn!("{}: simplified prompt failed ({}), using placeholder", label, err);
                PageImage {
                    reference: self.fallback.image_ref().to_string(),
                    source: ImageSource::Placeholder,
                }
            }
        }
    }

    /// Illustrations for every page, returned in page order.
    pub async fn generate_images_for_story(
        &self,
        pages: &[Page],
        style: &StyleGuide,
    ) -> Vec<PageImage> {
        let total = pages.len();
        let delay = self.config.page_delay;
        stream::iter(0..total)
            .map(|index| {
                let page = &pages[index];
                async move {
                    if index > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.generate_image(page, style, index, total).await
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fable_types::{AgeRange, PLACEHOLDER_IMAGE_REF};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedText(Result<String, ProviderError>);

    #[async_trait]
    impl TextGenerator for ScriptedText {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_text(&self, _request: &TextRequest) -> Result<String, ProviderError> {
            self.0.clone()
        }
    }

    struct SlowText;

    #[async_trait]
    impl TextGenerator for SlowText {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate_text(&self, _request: &TextRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    /// Fails for the first `fail_first` calls, or always for simplified prompts
    /// when `reject_simplified` is set. Otherwise answers with a URL naming
    /// the page number found in the prompt.
    #[derive(Default)]
    struct ScriptedImages {
        calls: AtomicUsize,
        fail_first: usize,
        error: Option<ProviderError>,
        reject_simplified: bool,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageGenerator for ScriptedImages {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let simplified = request.prompt.starts_with("Simple children's book illustration");
            if n < self.fail_first || (simplified && self.reject_simplified) {
                return Err(self
                    .error
                    .clone()
                    .unwrap_or_else(|| ProviderError::Http { status: 503, message: "busy".into() }));
            }
            let page = request
                .prompt
                .split("page ")
                .nth(1)
                .and_then(|s| s.split(' ').next())
                .unwrap_or("simple");
            Ok(format!("https://img.test/{}-{}.png", page, n))
        }
    }

    #[derive(Default)]
    struct ListFetcher {
        broken: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl ImageFetcher for ListFetcher {
        async fn verify(&self, reference: &str) -> Result<(), ProviderError> {
            if self.broken.lock().unwrap().contains(reference) {
                Err(ProviderError::Unreachable(reference.to_string()))
            } else {
                Ok(())
            }
        }

        async fn fetch(&self, _reference: &str) -> Result<Vec<u8>, ProviderError> {
            Ok(vec![0; 8])
        }
    }

    fn request() -> CreationRequest {
        CreationRequest {
            title: "Luna and the Moon Garden".to_string(),
            genre: "fantasy".to_string(),
            theme: "courage".to_string(),
            main_character: "Luna".to_string(),
            main_character_description: "a girl with red boots".to_string(),
            secondary_character: Some("Pip".to_string()),
            secondary_character_description: None,
            setting: "the Moon Garden".to_string(),
            environment_description: None,
            tone: "fun".to_string(),
            age_range: AgeRange::ThreeToFour,
            author_name: None,
            language: "en".to_string(),
        }
    }

    fn client(text: Arc<dyn TextGenerator>, images: Arc<ScriptedImages>) -> GenerationClient {
        GenerationClient::new(
            text,
            images,
            Arc::new(ListFetcher::default()),
            GenerationConfig::default(),
        )
    }

    fn pages(n: u32) -> Vec<Page> {
        (1..=n)
            .map(|i| {
                let kind = if i == 1 { ImageType::Cover } else { ImageType::FullPage };
                Page::new(i, format!("Luna runs to tree number {}.", i), kind)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_story_from_provider() {
        let text = Arc::new(ScriptedText(Ok("One.\n\nTwo.".to_string())));
        let story = client(text, Arc::default()).generate_story(&request()).await;
        assert_eq!(story.source, StorySource::Provider);
        assert_eq!(story.pages().len(), 2);
    }

    #[tokio::test]
    async fn test_story_failure_uses_template() {
        let text = Arc::new(ScriptedText(Err(ProviderError::Http {
            status: 500,
            message: "boom".into(),
        })));
        let story = client(text, Arc::default()).generate_story(&request()).await;
        assert!(story.is_fallback());
        assert_eq!(story.text, FallbackContent::new().story(&request()));
    }

    #[tokio::test]
    async fn test_blank_story_uses_template() {
        let text = Arc::new(ScriptedText(Ok(" \n\n ".to_string())));
        let story = client(text, Arc::default()).generate_story(&request()).await;
        assert!(story.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_story_timeout_uses_template() {
        let story = client(Arc::new(SlowText), Arc::default())
            .generate_story(&request())
            .await;
        assert!(story.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_retries_then_succeeds() {
        let images = Arc::new(ScriptedImages {
            fail_first: 2,
            ..Default::default()
        });
        let client = client(Arc::new(ScriptedText(Ok(String::new()))), images.clone());
        let style = StyleGuide::for_request(&request());
        let result = client.generate_image(&pages(1)[0], &style, 0, 1).await;
        assert_eq!(result.source, ImageSource::Generated);
        assert!(result.reference.starts_with("https://img.test/1-2"));
        assert_eq!(images.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_use_simplified_prompt() {
        let images = Arc::new(ScriptedImages {
            fail_first: 3,
            ..Default::default()
        });
        let client = client(Arc::new(ScriptedText(Ok(String::new()))), images.clone());
        let style = StyleGuide::for_request(&request());
        let result = client.generate_image(&pages(1)[0], &style, 0, 1).await;
        assert_eq!(result.source, ImageSource::Simplified);
        assert_eq!(images.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_everything_failing_gives_placeholder() {
        let images = Arc::new(ScriptedImages {
            fail_first: usize::MAX,
            ..Default::default()
        });
        let client = client(Arc::new(ScriptedText(Ok(String::new()))), images.clone());
        let style = StyleGuide::for_request(&request());
        let result = client.generate_image(&pages(1)[0], &style, 0, 1).await;
        assert!(result.is_placeholder());
        assert_eq!(result.reference, PLACEHOLDER_IMAGE_REF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_policy_skips_retries() {
        let images = Arc::new(ScriptedImages {
            fail_first: 1,
            error: Some(ProviderError::ContentPolicy("nope".into())),
            ..Default::default()
        });
        let client = client(Arc::new(ScriptedText(Ok(String::new()))), images.clone());
        let style = StyleGuide::for_request(&request());
        let result = client.generate_image(&pages(1)[0], &style, 0, 1).await;
        assert_eq!(result.source, ImageSource::Simplified);
        assert_eq!(images.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverifiable_reference_is_retried() {
        let images = Arc::new(ScriptedImages::default());
        let fetcher = Arc::new(ListFetcher::default());
        fetcher
            .broken
            .lock()
            .unwrap()
            .insert("https://img.test/1-0.png".to_string());
        let client = GenerationClient::new(
            Arc::new(ScriptedText(Ok(String::new()))),
            images.clone(),
            fetcher,
            GenerationConfig::default(),
        );
        let style = StyleGuide::for_request(&request());
        let result = client.generate_image(&pages(1)[0], &style, 0, 1).await;
        assert_eq!(result.reference, "https://img.test/1-1.png");
        assert_eq!(result.source, ImageSource::Generated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_images_keep_page_order_and_pacing() {
        let images = Arc::new(ScriptedImages::default());
        let config = GenerationConfig {
            image_retry: RetryPolicy::default().without_jitter(),
            ..GenerationConfig::default()
        };
        let client = GenerationClient::new(
            Arc::new(ScriptedText(Ok(String::new()))),
            images.clone(),
            Arc::new(ListFetcher::default()),
            config,
        );
        let style = StyleGuide::for_request(&request());
        let started = tokio::time::Instant::now();
        let results = client.generate_images_for_story(&pages(4), &style).await;

        assert_eq!(results.len(), 4);
        for (i, image) in results.iter().enumerate() {
            assert!(image.reference.starts_with(&format!("https://img.test/{}-", i + 1)));
        }
        assert_eq!(started.elapsed(), Duration::from_secs(24));
        assert!(images.prompts.lock().unwrap()[0].contains("page 1 of 4"));
    }

    /// Answers later pages sooner, so completion order is the reverse of
    /// page order.
    struct ReversedLatencyImages {
        total: u64,
        finished: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ImageGenerator for ReversedLatencyImages {
        fn name(&self) -> &str {
            "reversed"
        }

        async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
            let page: u64 = request
                .prompt
                .split("page ")
                .nth(1)
                .and_then(|s| s.split(' ').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis((self.total + 1 - page) * 100)).await;
            self.finished.lock().unwrap().push(page);
            Ok(format!("https://img.test/{}.png", page))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_images_keep_page_order_with_concurrent_requests() {
        let images = Arc::new(ReversedLatencyImages {
            total: 4,
            finished: Mutex::new(Vec::new()),
        });
        let config = GenerationConfig {
            image_retry: RetryPolicy::default().without_jitter(),
            concurrency: 4,
            page_delay: Duration::ZERO,
            ..GenerationConfig::default()
        };
        let client = GenerationClient::new(
            Arc::new(ScriptedText(Ok(String::new()))),
            images.clone(),
            Arc::new(ListFetcher::default()),
            config,
        );
        let style = StyleGuide::for_request(&request());
        let results = client.generate_images_for_story(&pages(4), &style).await;

        assert_eq!(*images.finished.lock().unwrap(), vec![4, 3, 2, 1]);
        let references: Vec<&str> = results.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(
            references,
            vec![
                "https://img.test/1.png",
                "https://img.test/2.png",
                "https://img.test/3.png",
                "https://img.test/4.png",
            ]
        );
    }

    #[test]
    fn test_spread_is_wider() {
        let client = client(Arc::new(ScriptedText(Ok(String::new()))), Arc::default());
        assert_eq!(client.size_for(ImageType::FullPage), ImageSize::new(1024, 1024));
        assert_eq!(client.size_for(ImageType::Spread), ImageSize::new(1792, 1024));
    }
}
