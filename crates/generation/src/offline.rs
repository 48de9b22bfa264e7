//! Provider strategy that needs no network.
//!
//! Text generation always reports itself unavailable so the client falls back
//! to template stories. Images are flat color studies written to disk, with the
//! color derived from the prompt so the same page always gets the same picture.

use async_trait::async_trait;
use fable_traits::{ImageGenerator, ImageRequest, ProviderError, TextGenerator, TextRequest};
use image::{Rgb, RgbImage};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTextGenerator;

#[async_trait]
impl TextGenerator for OfflineTextGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate_text(&self, _request: &TextRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(
            "offline mode has no text model".to_string(),
        ))
    }
}

/// Writes generated PNGs into `output_dir` and returns their paths.
#[derive(Debug, Clone)]
pub struct OfflineImageGenerator {
    output_dir: PathBuf,
}

impl OfflineImageGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

fn prompt_hash(prompt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    hasher.finish()
}

/// A soft vertical gradient between two pastel tones picked from `seed`.
fn render(width: u32, height: u32, seed: u64) -> RgbImage {
    let pastel = |shift: u32| 150 + ((seed >> shift) & 0x5f) as u8;
    let top = [pastel(0), pastel(8), pastel(16)];
    let bottom = [pastel(24), pastel(32), pastel(40)];
    RgbImage::from_fn(width, height, |_, y| {
        let t = y as f32 / height.max(1) as f32;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
        Rgb([mix(top[0], bottom[0]), mix(top[1], bottom[1]), mix(top[2], bottom[2])])
    })
}

#[async_trait]
impl ImageGenerator for OfflineImageGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let seed = prompt_hash(&request.prompt);
        let path = self
            .output_dir
            .join(format!("offline-{:016x}-{}.png", seed, request.size));
        let (width, height) = (request.size.width, request.size.height);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || render(width, height, seed).save(&target))
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(path.to_string_lossy().into_owned())
    }
}
