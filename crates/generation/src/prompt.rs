//! Prompt construction for story and illustration requests.

use fable_types::{CreationRequest, ImageType, StyleGuide};
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_SCENE: &str = "children's book scene with characters interacting";
pub const SIMPLIFIED_PROMPT: &str =
    "Simple children's book illustration. Scene with characters interacting. Colorful cartoon style.";

const MAX_SCENE_SENTENCES: usize = 4;
const LOOKAHEAD_SENTENCES: usize = 2;
const MAX_CHARACTER_CHARS: usize = 400;
const MAX_ENVIRONMENT_CHARS: usize = 300;

/// Word stems that mark a sentence as describing visible action.
const ACTION_STEMS: &[&str] = &[
    "run", "ran", "jump", "fly", "flew", "climb", "swim", "swam", "danc", "play", "explor",
    "discover", "find", "found", "open", "look", "hug", "laugh", "smil", "walk", "chas", "build",
    "built", "help", "ride", "rode", "sail", "sing", "sang", "search", "race", "catch", "caught",
    "hold", "held", "reach", "cross", "hid", "travel", "leap", "carr", "gather", "throw", "threw",
    "celebrat", "follow", "arriv", "set off", "met", "fac",
];

const COLOR_WORDS: &[&str] = &[
    "red", "blue", "green", "yellow", "purple", "orange", "pink", "brown", "gray", "grey", "white",
    "black", "golden", "silver",
];

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("BUG: invalid URL_RE regex literal")
});

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:use\s+(?:this|the)\s+image\s+as\s+(?:a\s+)?reference|based\s+on\s+the\s+(?:reference\s+)?image|reference\s+image|(?:url|link)\s+(?:of|to)\s+the\s+image)\b",
    )
    .expect("BUG: invalid REFERENCE_RE regex literal")
});

static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+([.,;:!?])").expect("BUG: invalid SPACE_BEFORE_PUNCT_RE regex literal")
});

static REPEATED_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([.,;:!?])[.,;:!?\s]*[.,;:!?]").expect("BUG: invalid REPEATED_PUNCT_RE regex literal")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("BUG: invalid WHITESPACE_RE regex literal"));

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(|s| s.trim().trim_matches('"').trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_action(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();
    words.iter().enumerate().any(|(i, word)| {
        ACTION_STEMS.iter().any(|stem| match stem.split_once(' ') {
            Some((first, second)) => *word == first && words.get(i + 1) == Some(&second),
            None => word.starts_with(stem),
        })
    })
}

/// Picks the sentences of a page that best describe what is happening.
///
/// Up to four leading sentences are scanned for action verbs. Without a hit the
/// next two sentences are tried, and failing that the opening sentences are used.
pub fn extract_main_scene(page_text: &str) -> String {
    let all = sentences(page_text);
    if all.is_empty() {
        return DEFAULT_SCENE.to_string();
    }

    let head = &all[..all.len().min(MAX_SCENE_SENTENCES)];
    let mut chosen: Vec<&str> = head.iter().copied().filter(|s| has_action(s)).collect();
    if chosen.is_empty() {
        let end = all.len().min(MAX_SCENE_SENTENCES + LOOKAHEAD_SENTENCES);
        chosen = all[head.len()..end]
            .iter()
            .copied()
            .filter(|s| has_action(s))
            .collect();
    }
    if chosen.is_empty() {
        chosen = all.iter().copied().take(2).collect();
    }

    let mut scene = chosen.join(". ");
    scene.push('.');
    scene
}

/// Color words mentioned in `text`, in palette order, without duplicates.
pub fn extract_colors(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    COLOR_WORDS
        .iter()
        .copied()
        .filter(|color| words.contains(color))
        .collect()
}

/// Removes URLs and reference-image phrasing that providers reject.
pub fn remove_urls_from_prompt(prompt: &str) -> String {
    let cleaned = URL_RE.replace_all(prompt, " ");
    let cleaned = REFERENCE_RE.replace_all(&cleaned, " ");
    let cleaned = WHITESPACE_RE.replace_all(&cleaned, " ");
    let cleaned = SPACE_BEFORE_PUNCT_RE.replace_all(&cleaned, "$1");
    let cleaned = REPEATED_PUNCT_RE.replace_all(&cleaned, "$1");
    cleaned
        .trim()
        .trim_start_matches(['.', ',', ';', ':'])
        .trim()
        .to_string()
}

fn with_colors(description: &str) -> String {
    let colors = extract_colors(description);
    if colors.is_empty() {
        description.to_string()
    } else {
        format!("{} (key colors: {})", description, colors.join(", "))
    }
}

/// Illustration prompt for one page. Never longer than `max_chars`.
pub fn image_prompt(
    page_text: &str,
    style: &StyleGuide,
    page_index: usize,
    total_pages: usize,
    image_type: ImageType,
    max_chars: usize,
) -> String {
    let scene = extract_main_scene(page_text);
    let characters = with_colors(&style.character);
    let environment = with_colors(&style.environment);

    let prompt = format!(
        "Children's book illustration for page {} of {}. Scene: {} Characters: {}. Setting: {}. Style: {}, {}. Keep every character's appearance consistent with the other pages. No text or letters in the image.",
        page_index + 1,
        total_pages.max(page_index + 1),
        scene,
        truncate_chars(&characters, MAX_CHARACTER_CHARS),
        truncate_chars(&environment, MAX_ENVIRONMENT_CHARS),
        style.artistic_style,
        image_type.framing(),
    );

    let cleaned = remove_urls_from_prompt(&prompt);
    truncate_chars(&cleaned, max_chars).to_string()
}

/// Short prompt tried once after the full prompt has failed.
pub fn simplified_prompt(style: &StyleGuide) -> String {
    let hint = truncate_chars(&style.artistic_style, 120);
    remove_urls_from_prompt(&format!("{} {}.", SIMPLIFIED_PROMPT, hint))
}

pub fn story_system_prompt(request: &CreationRequest) -> String {
    let profile = request.age_range.profile();
    format!(
        "You are an experienced children's book author. Write for readers aged {} in a {} tone, using {} vocabulary and short sentences. Reply with the story text only.",
        request.age_range,
        request.tone,
        profile.complexity.as_str()
    )
}

/// The single structured prompt sent to the text capability.
pub fn story_prompt(request: &CreationRequest) -> String {
    let profile = request.age_range.profile();
    let mut prompt = format!(
        "Write a children's story titled \"{}\".\nGenre: {}\nTheme: {}\nMain character: {}",
        request.title.trim(),
        request.genre.trim(),
        request.theme.trim(),
        request.main_character.trim()
    );
    let main_desc = request.main_character_description.trim();
    if !main_desc.is_empty() {
        prompt.push_str(&format!(" ({})", main_desc));
    }
    prompt.push_str(&format!("\nSecondary character: {}", request.secondary_display()));
    if let Some(desc) = request
        .secondary_character_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        prompt.push_str(&format!(" ({})", desc));
    }
    prompt.push_str(&format!("\nSetting: {}", request.setting.trim()));
    if let Some(env) = request
        .environment_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        prompt.push_str(&format!("\nEnvironment: {}", env));
    }
    prompt.push_str(&format!(
        "\nTone: {}\nAge range: {}\nLanguage: {}\n\nWrite between {} and {} pages with at most {} words per page. Separate pages with one blank line. Do not number the pages or add headings.",
        request.tone,
        request.age_range,
        request.language,
        profile.min_pages,
        profile.max_pages,
        profile.max_words_per_page
    ));
    prompt
}
