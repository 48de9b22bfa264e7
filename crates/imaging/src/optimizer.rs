use crate::error::ImageError;
use crate::placeholder::{PLACEHOLDER_LABEL, render_placeholder};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Limits and tier parameters for [`ImageOptimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Byte budget for an output file.
    pub max_bytes: u64,
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality of the first tier.
    pub quality: u8,
    /// Lower bound for the second tier's quality.
    pub reduced_quality_floor: u8,
    /// Fixed quality of the last tier.
    pub minimal_quality: u8,
    /// Inputs above this size skip the tiers and go to the aggressive pass.
    pub oversized_input_bytes: u64,
    /// Inputs above this pixel count get their target clamped.
    pub large_input_pixels: u64,
    pub large_input_dimension: u32,
    pub aggressive_dimension: u32,
    pub aggressive_quality: u8,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_bytes: 300 * 1024,
            max_width: 400,
            max_height: 400,
            quality: 70,
            reduced_quality_floor: 45,
            minimal_quality: 40,
            oversized_input_bytes: 5 * 1024 * 1024,
            large_input_pixels: 4_000_000,
            large_input_dimension: 250,
            aggressive_dimension: 250,
            aggressive_quality: 50,
            placeholder_width: 500,
            placeholder_height: 400,
        }
    }
}

/// Which pass produced an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Reduced,
    Minimal,
    Aggressive,
    Placeholder,
}

/// A file written by the optimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    pub path: PathBuf,
    pub bytes: u64,
    pub width: u32,
    pub height: u32,
    pub tier: Tier,
}

impl Optimized {
    pub fn is_placeholder(&self) -> bool {
        self.tier == Tier::Placeholder
    }
}

struct Pass {
    tier: Tier,
    width: u32,
    height: u32,
    quality: u8,
}

/// Resizes and recompresses images into budgeted JPEG files.
#[derive(Debug, Clone, Default)]
pub struct ImageOptimizer {
    config: OptimizerConfig,
}

impl ImageOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimizes `input` into `output`.
    ///
    /// Any decode, encode or budget failure falls through to the placeholder.
    /// The only error returned is a failure to write the placeholder itself.
    pub fn optimize_bytes(&self, input: &[u8], output: &Path) -> Result<Optimized, ImageError> {
        match self.run_passes(input, output) {
            Ok(optimized) => Ok(optimized),
            Err(e) => {
                log::warn!(
                    "Optimization of {} failed ({}), writing placeholder",
                    output.display(),
                    e
                );
                self.write_placeholder(output)
            }
        }
    }

    /// Optimizes an image that was already decoded from `input_bytes` bytes.
    /// Falls through to the placeholder the same way [`Self::optimize_bytes`]
    /// does.
    pub fn optimize_decoded(
        &self,
        img: &DynamicImage,
        input_bytes: u64,
        output: &Path,
    ) -> Result<Optimized, ImageError> {
        match self.run_decoded(img, input_bytes, output) {
            Ok(optimized) => Ok(optimized),
            Err(e) => {
                log::warn!(
                    "Optimization of {} failed ({}), writing placeholder",
                    output.display(),
                    e
                );
                self.write_placeholder(output)
            }
        }
    }

    pub fn optimize_file(&self, input: &Path, output: &Path) -> Result<Optimized, ImageError> {
        match std::fs::read(input) {
            Ok(bytes) => self.optimize_bytes(&bytes, output),
            Err(e) => {
                log::warn!("Cannot read {}: {}, writing placeholder", input.display(), e);
                self.write_placeholder(output)
            }
        }
    }

    /// Writes the placeholder image to `output`, sized to fit the pixel box.
    pub fn write_placeholder(&self, output: &Path) -> Result<Optimized, ImageError> {
        let (width, height) = fit_within(
            self.config.placeholder_width,
            self.config.placeholder_height,
            self.config.max_width,
            self.config.max_height,
        );
        let img = render_placeholder(width, height, PLACEHOLDER_LABEL);
        let mut optimized = self.write_jpeg(&img, 85, output)?;
        optimized.tier = Tier::Placeholder;
        Ok(optimized)
    }

    fn run_passes(&self, input: &[u8], output: &Path) -> Result<Optimized, ImageError> {
        if input.is_empty() {
            return Err(ImageError::EmptyInput);
        }
        let img = ImageReader::new(Cursor::new(input))
            .with_guessed_format()?
            .decode()?;
        self.run_decoded(&img, input.len() as u64, output)
    }

    fn run_decoded(&self, img: &DynamicImage, input_bytes: u64, output: &Path) -> Result<Optimized, ImageError> {
        let mut last_size = 0;
        for pass in self.plan(input_bytes, img) {
            let resized = resize_to_fit(img, pass.width, pass.height);
            let mut optimized = self.write_jpeg(&resized, pass.quality, output)?;
            optimized.tier = pass.tier;
            if optimized.bytes <= self.config.max_bytes {
                log::debug!(
                    "Optimized {} with {:?} tier: {}x{} q{} {} bytes",
                    output.display(),
                    pass.tier,
                    optimized.width,
                    optimized.height,
                    pass.quality,
                    optimized.bytes
                );
                return Ok(optimized);
            }
            log::debug!(
                "{:?} tier produced {} bytes, over the {} byte budget",
                pass.tier,
                optimized.bytes,
                self.config.max_bytes
            );
            last_size = optimized.bytes;
        }

        Err(ImageError::OverBudget {
            bytes: last_size,
            budget: self.config.max_bytes,
        })
    }

    fn plan(&self, input_bytes: u64, img: &DynamicImage) -> Vec<Pass> {
        let c = &self.config;
        if input_bytes > c.oversized_input_bytes {
            return vec![Pass {
                tier: Tier::Aggressive,
                width: c.aggressive_dimension.min(c.max_width),
                height: c.aggressive_dimension.min(c.max_height),
                quality: c.aggressive_quality,
            }];
        }

        let (mut width, mut height) = (c.max_width, c.max_height);
        if u64::from(img.width()) * u64::from(img.height()) > c.large_input_pixels {
            width = width.min(c.large_input_dimension);
            height = height.min(c.large_input_dimension);
        }

        vec![
            Pass {
                tier: Tier::Standard,
                width,
                height,
                quality: c.quality,
            },
            Pass {
                tier: Tier::Reduced,
                width: scale(width, 0.7),
                height: scale(height, 0.7),
                quality: c.quality.saturating_sub(15).max(c.reduced_quality_floor),
            },
            Pass {
                tier: Tier::Minimal,
                width: scale(width, 0.5),
                height: scale(height, 0.5),
                quality: c.minimal_quality,
            },
        ]
    }

    fn write_jpeg(&self, img: &RgbImage, quality: u8, output: &Path) -> Result<Optimized, ImageError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(img)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output, &buf)?;

        let bytes = std::fs::metadata(output)?.len();
        if bytes == 0 {
            return Err(ImageError::EmptyOutput(output.to_path_buf()));
        }

        Ok(Optimized {
            path: output.to_path_buf(),
            bytes,
            width: img.width(),
            height: img.height(),
            tier: Tier::Standard,
        })
    }
}

fn scale(value: u32, factor: f32) -> u32 {
    ((value as f32 * factor).round() as u32).max(1)
}

/// Largest size with the aspect ratio of `width`x`height` that fits the box.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);
    (scale(width, ratio), scale(height, ratio))
}

/// Downscales to fit the box, never upscales. Alpha is dropped.
fn resize_to_fit(img: &DynamicImage, max_width: u32, max_height: u32) -> RgbImage {
    if img.width() <= max_width && img.height() <= max_height {
        img.to_rgb8()
    } else {
        img.resize(max_width, max_height, FilterType::Triangle).to_rgb8()
    }
}
