//! Deterministic stand-ins for provider output.
//!
//! Stories come from per-genre templates with the request's names substituted.
//! The same request always yields the same text.

use fable_types::{CreationRequest, PLACEHOLDER_IMAGE_REF};

const FANTASY: [&str; 5] = [
    "In a magical place called {setting}, there lived {mainCharacter}, a child full of dreams and imagination. Every day, {mainCharacter} looked out of the window and imagined the incredible adventures waiting outside. \"Today will be a special day!\" {mainCharacter} thought, watching the clouds dance across the blue sky.",
    "One bright morning, {secondaryCharacter} arrived with extraordinary news. \"We need your help, {mainCharacter}!\" said {secondaryCharacter}, eyes shining. \"There is a very important mission, and only you can help us.\" {mainCharacter} felt their heart beat faster with excitement.",
    "Together, {mainCharacter} and {secondaryCharacter} set off on a magical journey through {setting}. They met enchanted creatures and discovered hidden secrets. \"I never knew I could be so brave!\" exclaimed {mainCharacter} as they faced one magical challenge after another.",
    "The biggest challenge was still to come. A great shadow covered {setting}, and everyone was frightened. But {mainCharacter} remembered every lesson learned along the way. \"I will not give up!\" {mainCharacter} declared, and everyone nearby felt braver too.",
    "With courage and wisdom, {mainCharacter} found a magical way to bring the light back to {setting}. {secondaryCharacter} smiled proudly: \"You did it!\" That day, everyone learned that the real magic is believing in yourself and never giving up on your dreams.",
];

const ADVENTURE: [&str; 5] = [
    "It was a special morning in {setting}, and {mainCharacter} woke up feeling that something amazing was about to happen. The sun shone in a different way, and the birds sang their happiest songs. \"Today is going to be unforgettable!\" {mainCharacter} thought with a big smile.",
    "Suddenly, {secondaryCharacter} came running with a mysterious map. \"Look what I found, {mainCharacter}!\" {secondaryCharacter} shouted. The map showed a secret path through {setting} that led to a hidden treasure. {mainCharacter}'s eyes sparkled with excitement.",
    "{mainCharacter} and {secondaryCharacter} began their treasure hunt. They crossed bridges, climbed trees and followed clues. \"We are on the right track!\" said {mainCharacter}, helping {secondaryCharacter} along a tricky path. Their friendship grew stronger with every challenge.",
    "Close to the treasure, they found a huge obstacle. \"How will we get past it?\" asked {secondaryCharacter}, worried. {mainCharacter} thought for a moment and had a brilliant idea. Working together, they found a way over the obstacle.",
    "At last they reached the treasure. Inside the chest there was no gold and no jewels, only pictures of all their adventures together. {mainCharacter} and {secondaryCharacter} smiled at each other, knowing the real treasure was the friendship they had built along the way.",
];

/// Template-based content used when a provider cannot deliver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackContent;

impl FallbackContent {
    pub fn new() -> Self {
        Self
    }

    fn template(genre: &str) -> &'static [&'static str; 5] {
        match genre.trim().to_lowercase().as_str() {
            "adventure" => &ADVENTURE,
            _ => &FANTASY,
        }
    }

    /// Story pages for `request`, in order.
    pub fn pages(&self, request: &CreationRequest) -> Vec<String> {
        let secondary = request.secondary_display();
        Self::template(&request.genre)
            .iter()
            .map(|page| {
                page.replace("{mainCharacter}", request.main_character.trim())
                    .replace("{setting}", request.setting.trim())
                    .replace("{secondaryCharacter}", secondary)
            })
            .collect()
    }

    /// Full story text, pages separated by blank lines.
    pub fn story(&self, request: &CreationRequest) -> String {
        self.pages(request).join("\n\n")
    }

    /// Image reference substituted for an illustration that could not be made.
    pub fn image_ref(&self) -> &'static str {
        PLACEHOLDER_IMAGE_REF
    }
}
