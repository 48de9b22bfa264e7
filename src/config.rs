//! Layered configuration: built-in defaults, an optional TOML file, then
//! `FABLE__SECTION__KEY` environment variables.

use crate::error::{PipelineError, Result};
use fable_generation::{GenerationConfig, HttpImageFetcher, OpenAiConfig, RetryPolicy};
use fable_imaging::OptimizerConfig;
use fable_traits::{Backoff, ImageSize, JobOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_VAR: &str = "FABLE_CONFIG";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_CONFIG_FILE: &str = "fable.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub generation: GenerationSettings,
    pub images: ImageSettings,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub attempts: u32,
    pub backoff_initial_ms: u64,
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_initial_ms: 60_000,
            timeout_secs: 1800,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Offline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: ProviderKind,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub image_attempts: u32,
    pub retry_delay_ms: u64,
    pub concurrency: usize,
    pub page_delay_ms: u64,
    pub max_prompt_chars: usize,
    pub text_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub image_timeout_step_secs: u64,
    pub verify_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub image_size: String,
    pub image_quality: String,
    pub image_style: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let openai = OpenAiConfig::default();
        Self {
            provider: ProviderKind::Openai,
            api_base: openai.api_base,
            text_model: openai.text_model,
            image_model: openai.image_model,
            image_attempts: 3,
            retry_delay_ms: 2000,
            concurrency: 1,
            page_delay_ms: 8000,
            max_prompt_chars: 4000,
            text_timeout_secs: 90,
            image_timeout_secs: 60,
            image_timeout_step_secs: 30,
            verify_timeout_secs: 5,
            download_timeout_secs: 10,
            image_size: "1024x1024".to_string(),
            image_quality: "standard".to_string(),
            image_style: Some("vivid".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub max_bytes: u64,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        let optimizer = OptimizerConfig::default();
        Self {
            max_bytes: optimizer.max_bytes,
            max_width: optimizer.max_width,
            max_height: optimizer.max_height,
            quality: optimizer.quality,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn books_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }

    pub fn pdfs_dir(&self) -> PathBuf {
        self.data_dir.join("pdfs")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }

    /// Where the offline provider writes its generated images.
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

impl Config {
    /// Loads `path` if given, otherwise `$FABLE_CONFIG` or `./fable.toml` when
    /// present, and layers the environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));
        match explicit {
            Some(file) => {
                builder = builder.add_source(config::File::from(file).required(true));
            }
            None => {
                builder = builder.add_source(
                    config::File::with_name(DEFAULT_CONFIG_FILE)
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FABLE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.attempts == 0 {
            return Err(PipelineError::InvalidConfig("queue.attempts must be at least 1".into()));
        }
        if self.queue.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig("queue.timeout_secs must be non-zero".into()));
        }
        if self.queue.workers == 0 {
            return Err(PipelineError::InvalidConfig("queue.workers must be at least 1".into()));
        }
        if self.generation.image_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "generation.image_attempts must be at least 1".into(),
            ));
        }
        if self.images.max_bytes == 0 || self.images.max_width == 0 || self.images.max_height == 0 {
            return Err(PipelineError::InvalidConfig("images limits must be non-zero".into()));
        }
        self.image_size()?;
        Ok(())
    }

    fn image_size(&self) -> Result<ImageSize> {
        self.generation
            .image_size
            .parse()
            .map_err(PipelineError::InvalidConfig)
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            attempts: self.queue.attempts,
            backoff: Backoff::exponential(Duration::from_millis(self.queue.backoff_initial_ms)),
            timeout: Duration::from_secs(self.queue.timeout_secs),
        }
    }

    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let g = &self.generation;
        let defaults = GenerationConfig::default();
        Ok(GenerationConfig {
            text_timeout: Duration::from_secs(g.text_timeout_secs),
            image_retry: RetryPolicy {
                max_attempts: g.image_attempts,
                initial_delay: Duration::from_millis(g.retry_delay_ms),
                base_timeout: Duration::from_secs(g.image_timeout_secs),
                timeout_step: Duration::from_secs(g.image_timeout_step_secs),
                ..RetryPolicy::default()
            },
            image_size: self.image_size()?,
            image_quality: g.image_quality.clone(),
            image_style: g.image_style.clone().filter(|s| !s.trim().is_empty()),
            concurrency: g.concurrency.max(1),
            page_delay: Duration::from_millis(g.page_delay_ms),
            max_prompt_chars: g.max_prompt_chars,
            ..defaults
        })
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            max_bytes: self.images.max_bytes,
            max_width: self.images.max_width,
            max_height: self.images.max_height,
            quality: self.images.quality,
            ..OptimizerConfig::default()
        }
    }

    pub fn openai_config(&self, api_key: String) -> OpenAiConfig {
        OpenAiConfig {
            api_base: self.generation.api_base.clone(),
            api_key,
            text_model: self.generation.text_model.clone(),
            image_model: self.generation.image_model.clone(),
        }
    }

    pub fn image_fetcher(&self) -> HttpImageFetcher {
        HttpImageFetcher::new(
            Duration::from_secs(self.generation.verify_timeout_secs),
            Duration::from_secs(self.generation.download_timeout_secs),
        )
    }

    /// Credentials only ever come from the environment.
    pub fn api_key() -> Option<String> {
        std::env::var(API_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.queue.attempts, 3);
        assert_eq!(config.queue.backoff_initial_ms, 60_000);
        assert_eq!(config.queue.timeout_secs, 1800);
        assert_eq!(config.images.max_bytes, 307_200);
        assert_eq!(config.generation.image_size, "1024x1024");
        assert_eq!(config.generation.provider, ProviderKind::Openai);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_options_from_queue_section() {
        let options = Config::default().job_options();
        assert_eq!(options.attempts, 3);
        assert_eq!(options.backoff.delay_for(2), Duration::from_secs(120));
        assert_eq!(options.timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_generation_config_carries_overrides() {
        let mut config = Config::default();
        config.generation.image_attempts = 5;
        config.generation.concurrency = 0;
        config.generation.image_size = "512x768".to_string();
        let generation = config.generation_config().unwrap();
        assert_eq!(generation.image_retry.max_attempts, 5);
        assert_eq!(generation.concurrency, 1);
        assert_eq!(generation.image_size, ImageSize::new(512, 768));
        assert_eq!(generation.text_max_tokens, 2000);
    }

    #[test]
    fn test_bad_image_size_is_rejected() {
        let mut config = Config::default();
        config.generation.image_size = "huge".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[queue]\nattempts = 5\nworkers = 4\n\n[generation]\nprovider = \"offline\"\n\n[storage]\ndata_dir = \"/tmp/fable-test\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.queue.attempts, 5);
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.queue.timeout_secs, 1800);
        assert_eq!(config.generation.provider, ProviderKind::Offline);
        assert_eq!(config.storage.pdfs_dir(), PathBuf::from("/tmp/fable-test/pdfs"));
    }
}
