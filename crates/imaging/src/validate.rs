use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const MIN_BYTES: usize = 100;
const MIN_DIMENSION: u32 = 10;
const MAX_PIXELS: u64 = 100_000_000;

/// Why a payload was rejected by [`inspect_image`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidImage {
    #[error("payload is only {0} bytes")]
    TooSmall(usize),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("cannot decode image: {0}")]
    Undecodable(String),

    #[error("image is {width}x{height}, below the minimum size")]
    DimensionsTooSmall { width: u32, height: u32 },

    #[error("image has {0} pixels, above the limit")]
    TooManyPixels(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

fn supported(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP
    )
}

/// Checks that `bytes` is a decodable image of a supported format with sane
/// dimensions. Header checks run before the full decode.
pub fn inspect_image(bytes: &[u8]) -> Result<ImageInfo, InvalidImage> {
    decode_image(bytes).map(|(info, _)| info)
}

/// Like [`inspect_image`], but hands back the decoded pixels so callers that
/// go on to optimize the image do not decode it a second time.
pub fn decode_image(bytes: &[u8]) -> Result<(ImageInfo, DynamicImage), InvalidImage> {
    if bytes.len() < MIN_BYTES {
        return Err(InvalidImage::TooSmall(bytes.len()));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| InvalidImage::UnsupportedFormat(e.to_string()))?;
    if !supported(format) {
        return Err(InvalidImage::UnsupportedFormat(format!("{:?}", format)));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| InvalidImage::Undecodable(e.to_string()))?;
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(InvalidImage::DimensionsTooSmall { width, height });
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_PIXELS {
        return Err(InvalidImage::TooManyPixels(pixels));
    }

    let img = ImageReader::with_format(Cursor::new(bytes), format)
        .decode()
        .map_err(|e| InvalidImage::Undecodable(e.to_string()))?;

    let info = ImageInfo {
        format,
        width,
        height,
    };
    Ok((info, img))
}

pub fn is_valid_image(bytes: &[u8]) -> bool {
    inspect_image(bytes).is_ok()
}

pub fn is_valid_image_file(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => is_valid_image(&bytes),
        Err(_) => false,
    }
}
