use fable_types::{ImageType, Page};
use regex::Regex;
use std::sync::LazyLock;

/// Leading "Page 3:" style markers some models add despite instructions.
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:page|p\.)\s*\d+\s*[:.\-)]\s*").expect("BUG: invalid PAGE_MARKER_RE regex literal")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorySource {
    Provider,
    Fallback,
}

/// Story text as returned by [`crate::GenerationClient::generate_story`].
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub text: String,
    pub source: StorySource,
}

impl Story {
    pub fn is_fallback(&self) -> bool {
        self.source == StorySource::Fallback
    }

    /// Pages in reading order. The first page is the cover.
    pub fn pages(&self) -> Vec<Page> {
        split_pages(&self.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let image_type = if i == 0 {
                    ImageType::Cover
                } else {
                    ImageType::FullPage
                };
                Page::new(i as u32 + 1, text, image_type)
            })
            .collect()
    }
}

/// Splits story text into paragraphs separated by one or more blank lines.
///
/// Lines inside a paragraph are joined with a single space.
pub fn split_pages(text: &str) -> Vec<String> {
    let mut pages = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                pages.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        pages.push(current.join(" "));
    }
    pages
        .into_iter()
        .map(|p| PAGE_MARKER_RE.replace(&p, "").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_marker_pattern_compiles() {
        assert!(PAGE_MARKER_RE.is_match("Page 3: Pip woke up."));
        assert!(!PAGE_MARKER_RE.is_match("Pip woke up on page 3."));
    }

    #[test]
    fn test_split_on_blank_lines() {
        let text = "First page\ncontinues here.\n\n\n  \nSecond page.\r\n\r\nThird.";
        assert_eq!(
            split_pages(text),
            vec!["First page continues here.", "Second page.", "Third."]
        );
    }

    #[test]
    fn test_page_markers_are_stripped() {
        let text = "Page 1: Once upon a time.\n\nPage 2 - The end.\n\nPage 3:";
        assert_eq!(split_pages(text), vec!["Once upon a time.", "The end."]);
    }

    #[test]
    fn test_pages_are_numbered_from_one() {
        let story = Story {
            text: "One.\n\nTwo.\n\nThree.".to_string(),
            source: StorySource::Provider,
        };
        let pages = story.pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].image_type, ImageType::Cover);
        assert_eq!(pages[2].page_number, 3);
        assert_eq!(pages[2].image_type, ImageType::FullPage);
        assert!(pages.iter().all(|p| p.image_ref.is_none()));
    }
}
