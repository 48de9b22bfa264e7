//! The creation request a book is generated from, and the reading-age profiles
//! that shape story length and illustration style.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Error returned when a creation request or job payload is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Unknown age range: {0}")]
    UnknownAgeRange(String),
}

/// How demanding the vocabulary and plot of a story may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    VerySimple,
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::VerySimple => "very simple",
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }
}

/// Length and style limits for one target reading age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeProfile {
    pub min_pages: u32,
    pub max_pages: u32,
    pub max_words_per_page: u32,
    pub complexity: Complexity,
    pub illustration_style: &'static str,
}

/// Target reader age range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeRange {
    #[serde(rename = "1-2")]
    OneToTwo,
    #[serde(rename = "3-4")]
    ThreeToFour,
    #[serde(rename = "5-6")]
    FiveToSix,
    #[serde(rename = "7-8")]
    SevenToEight,
    #[serde(rename = "9-10")]
    NineToTen,
    #[serde(rename = "11-12")]
    ElevenToTwelve,
}

impl AgeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRange::OneToTwo => "1-2",
            AgeRange::ThreeToFour => "3-4",
            AgeRange::FiveToSix => "5-6",
            AgeRange::SevenToEight => "7-8",
            AgeRange::NineToTen => "9-10",
            AgeRange::ElevenToTwelve => "11-12",
        }
    }

    pub fn profile(&self) -> AgeProfile {
        match self {
            AgeRange::OneToTwo => AgeProfile {
                min_pages: 1,
                max_pages: 2,
                max_words_per_page: 10,
                complexity: Complexity::VerySimple,
                illustration_style: "simple shapes, bold vibrant colors, no complex details",
            },
            AgeRange::ThreeToFour => AgeProfile {
                min_pages: 6,
                max_pages: 12,
                max_words_per_page: 25,
                complexity: Complexity::Simple,
                illustration_style: "colorful, expressive characters, simple backgrounds",
            },
            AgeRange::FiveToSix => AgeProfile {
                min_pages: 8,
                max_pages: 16,
                max_words_per_page: 40,
                complexity: Complexity::Moderate,
                illustration_style: "detailed, expressive characters, richer backgrounds",
            },
            AgeRange::SevenToEight => AgeProfile {
                min_pages: 12,
                max_pages: 20,
                max_words_per_page: 60,
                complexity: Complexity::Moderate,
                illustration_style: "detailed, expressive characters, elaborate scenery, touches of fantasy",
            },
            AgeRange::NineToTen => AgeProfile {
                min_pages: 16,
                max_pages: 24,
                max_words_per_page: 80,
                complexity: Complexity::Complex,
                illustration_style: "sophisticated, detailed characters, rich scenery, fantasy and adventure elements",
            },
            AgeRange::ElevenToTwelve => AgeProfile {
                min_pages: 20,
                max_pages: 32,
                max_words_per_page: 100,
                complexity: Complexity::Complex,
                illustration_style: "sophisticated, detailed characters, rich scenery, fantasy, adventure and mystery",
            },
        }
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1-2" => Ok(AgeRange::OneToTwo),
            "3-4" => Ok(AgeRange::ThreeToFour),
            "5-6" => Ok(AgeRange::FiveToSix),
            "7-8" => Ok(AgeRange::SevenToEight),
            "9-10" => Ok(AgeRange::NineToTen),
            "11-12" => Ok(AgeRange::ElevenToTwelve),
            other => Err(ValidationError::UnknownAgeRange(other.to_string())),
        }
    }
}

fn default_tone() -> String {
    "fun".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Immutable inputs a book is generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRequest {
    pub title: String,
    pub genre: String,
    pub theme: String,
    pub main_character: String,
    #[serde(default)]
    pub main_character_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_character_description: Option<String>,
    pub setting: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_description: Option<String>,
    #[serde(default = "default_tone")]
    pub tone: String,
    pub age_range: AgeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl CreationRequest {
    /// Checks required fields and length limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("title", &self.title),
            ("genre", &self.genre),
            ("theme", &self.theme),
            ("mainCharacter", &self.main_character),
            ("setting", &self.setting),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }

        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(ValidationError::TooLong {
                field: "title",
                max: MAX_TITLE_CHARS,
            });
        }

        let descriptions = [
            ("mainCharacterDescription", Some(&self.main_character_description)),
            (
                "secondaryCharacterDescription",
                self.secondary_character_description.as_ref(),
            ),
            ("environmentDescription", self.environment_description.as_ref()),
        ];
        for (field, value) in descriptions {
            if value.is_some_and(|v| v.chars().count() > MAX_DESCRIPTION_CHARS) {
                return Err(ValidationError::TooLong {
                    field,
                    max: MAX_DESCRIPTION_CHARS,
                });
            }
        }

        Ok(())
    }

    /// Author name as printed on the cover.
    pub fn author_display(&self) -> &str {
        match self.author_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => "Anonymous",
        }
    }

    pub fn secondary_display(&self) -> &str {
        match self.secondary_character.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => "a special friend",
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_request() -> CreationRequest {
    CreationRequest {
        title: "Luna and the Moon Garden".to_string(),
        genre: "fantasy".to_string(),
        theme: "friendship".to_string(),
        main_character: "Luna".to_string(),
        main_character_description: "a curious girl with red boots".to_string(),
        secondary_character: Some("Pip".to_string()),
        secondary_character_description: Some("a tiny blue owl".to_string()),
        setting: "the Moon Garden".to_string(),
        environment_description: None,
        tone: "gentle".to_string(),
        age_range: AgeRange::ThreeToFour,
        author_name: None,
        language: "en".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request_passes() {
        assert_eq!(sample_request().validate(), Ok(()));
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut req = sample_request();
        req.title = "   ".to_string();
        assert_eq!(req.validate(), Err(ValidationError::MissingField("title")));
    }

    #[test]
    fn test_overlong_title_rejected() {
        let mut req = sample_request();
        req.title = "a".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(
            req.validate(),
            Err(ValidationError::TooLong { field: "title", .. })
        ));
    }

    #[test]
    fn test_age_range_wire_format() {
        let json = serde_json::to_string(&AgeRange::NineToTen).unwrap();
        assert_eq!(json, "\"9-10\"");
        assert_eq!("3-4".parse::<AgeRange>(), Ok(AgeRange::ThreeToFour));
        assert!("13-14".parse::<AgeRange>().is_err());
    }

    #[test]
    fn test_age_profile_bounds() {
        let profile = AgeRange::ThreeToFour.profile();
        assert_eq!(profile.min_pages, 6);
        assert_eq!(profile.max_pages, 12);
        assert_eq!(profile.max_words_per_page, 25);
        assert_eq!(profile.complexity, Complexity::Simple);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let json = r#"{
            "title": "T", "genre": "adventure", "theme": "courage",
            "mainCharacter": "Max", "setting": "the forest", "ageRange": "5-6"
        }"#;
        let req: CreationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.tone, "fun");
        assert_eq!(req.language, "en");
        assert_eq!(req.author_display(), "Anonymous");
        assert_eq!(req.secondary_display(), "a special friend");
    }
}
