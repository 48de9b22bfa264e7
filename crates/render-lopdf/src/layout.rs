//! Text metrics and line breaking for the two standard Helvetica faces.
//!
//! Text is written in WinAnsiEncoding (Windows code page 1252). Widths are the
//! Adobe AFM advance widths of each WinAnsi code in 1/1000 em. Characters the
//! encoding cannot represent are written and measured as `?`.

pub const ELLIPSIS: &str = "...";

/// Width used for the few undefined WinAnsi slots, which are never emitted.
const UNDEFINED_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Codes 0x80..=0xFF.
#[rustfmt::skip]
const HELVETICA_HIGH: [u16; 128] = [
    556, 556, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 556, 611, 556,
    556, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 556, 500, 667,
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Codes 0x80..=0xFF.
#[rustfmt::skip]
const HELVETICA_BOLD_HIGH: [u16; 128] = [
    556, 556, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 556, 611, 556,
    556, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 556, 500, 667,
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278,
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556,
];

/// WinAnsi code for `c`, if the encoding has one.
///
/// 0xA0..=0xFF coincide with Latin-1; 0x80..=0x9F hold the typographic
/// punctuation and extra letters of code page 1252.
pub fn win_ansi_code(c: char) -> Option<u8> {
    let code = match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => return Some(c as u8),
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    /// Name under which the font is registered in page resources.
    pub fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }

    fn glyph_width(&self, c: char) -> u16 {
        let (low, high) = match self {
            Font::Regular => (&HELVETICA, &HELVETICA_HIGH),
            Font::Bold => (&HELVETICA_BOLD, &HELVETICA_BOLD_HIGH),
        };
        match win_ansi_code(c).unwrap_or(b'?') {
            code @ 32..=126 => low[(code - 32) as usize],
            code @ 0x80..=0xff => high[(code - 0x80) as usize],
            _ => UNDEFINED_WIDTH,
        }
    }
}

/// Advance width of `text` in points.
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| font.glyph_width(c) as u32).sum();
    units as f32 * size / 1000.0
}

/// Breaks a word wider than `max_width` into pieces that fit.
fn split_long_word(word: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        let mut candidate = current.clone();
        candidate.push(c);
        if !current.is_empty() && text_width(&candidate, font, size) > max_width {
            pieces.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Greedy word wrap. Whitespace runs collapse to single spaces.
pub fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let pieces = if text_width(word, font, size) > max_width {
            split_long_word(word, font, size, max_width)
        } else {
            vec![word.to_string()]
        };
        for piece in pieces {
            if line.is_empty() {
                line = piece;
                continue;
            }
            let candidate = format!("{} {}", line, piece);
            if text_width(&candidate, font, size) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, piece));
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Wraps `text` and keeps at most `max_lines`, ending the last kept line
/// with an ellipsis when anything was dropped.
pub fn fit_lines(text: &str, font: Font, size: f32, max_width: f32, max_lines: usize) -> Vec<String> {
    let mut lines = wrap(text, font, size, max_width);
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        let mut words: Vec<&str> = last.split(' ').collect();
        loop {
            let candidate = format!("{}{}", words.join(" "), ELLIPSIS);
            if words.len() <= 1 || text_width(&candidate, font, size) <= max_width {
                *last = candidate;
                break;
            }
            words.pop();
        }
    }
    lines
}

/// Extra space per inter-word gap that stretches `line` to `width`.
pub fn word_spacing(line: &str, font: Font, size: f32, width: f32) -> f32 {
    let gaps = line.matches(' ').count();
    if gaps == 0 {
        return 0.0;
    }
    ((width - text_width(line, font, size)) / gaps as f32).max(0.0)
}

/// PDF literal bytes for `text` under WinAnsiEncoding.
pub fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_code(c).unwrap_or(b'?')).collect()
}
