//! Minimal "image not available" raster.
//!
//! The label is drawn with a built-in 5x7 bitmap font so the placeholder can be
//! produced with no font files and no decoding of any input.

use image::{Rgb, RgbImage};

pub const PLACEHOLDER_LABEL: &str = "IMAGE NOT AVAILABLE";

const BACKGROUND: Rgb<u8> = Rgb([0xf0, 0xf0, 0xf0]);
const BORDER: Rgb<u8> = Rgb([0xcc, 0xcc, 0xcc]);
const INK: Rgb<u8> = Rgb([0x66, 0x66, 0x66]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Rows of a 5x7 glyph, most significant of the low five bits is the left column.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        _ => [0; 7],
    }
}

/// Renders a solid placeholder with a border and a centered label.
pub fn render_placeholder(width: u32, height: u32, label: &str) -> RgbImage {
    let width = width.max(GLYPH_WIDTH + 2);
    let height = height.max(GLYPH_HEIGHT + 2);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    let border = (width.min(height) / 50).max(1);
    for (x, y, px) in img.enumerate_pixels_mut() {
        if x < border || y < border || x >= width - border || y >= height - border {
            *px = BORDER;
        }
    }

    let chars: Vec<char> = label.chars().collect();
    if chars.is_empty() {
        return img;
    }
    // One blank column between glyphs.
    let columns = chars.len() as u32 * (GLYPH_WIDTH + 1) - 1;
    let scale = ((width * 4 / 5) / columns)
        .min(height / (GLYPH_HEIGHT * 4))
        .max(1);
    let text_w = columns * scale;
    let text_h = GLYPH_HEIGHT * scale;
    if text_w + 2 * border > width || text_h + 2 * border > height {
        return img;
    }
    let origin_x = (width - text_w) / 2;
    let origin_y = (height - text_h) / 2;

    for (i, c) in chars.iter().enumerate() {
        let rows = glyph(*c);
        let glyph_x = origin_x + i as u32 * (GLYPH_WIDTH + 1) * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let x0 = glyph_x + col * scale;
                let y0 = origin_y + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        img.put_pixel(x0 + dx, y0 + dy, INK);
                    }
                }
            }
        }
    }
    img
}
