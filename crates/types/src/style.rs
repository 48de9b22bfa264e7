use crate::request::CreationRequest;
use serde::{Deserialize, Serialize};

const BASE_ARTISTIC_STYLE: &str = "cartoon illustration, vibrant colors, soft lines";

/// Visual description shared by every illustration of one book.
///
/// Built once when a job starts and passed by reference into each image call,
/// so every page sees the same character and environment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleGuide {
    pub character: String,
    pub environment: String,
    pub artistic_style: String,
}

impl StyleGuide {
    pub fn for_request(request: &CreationRequest) -> Self {
        let mut character = format!("{} is a children's book character", request.main_character);
        let main_desc = request.main_character_description.trim();
        if !main_desc.is_empty() {
            character = format!("{}: {}", request.main_character, main_desc);
        }
        if let Some(secondary) = request
            .secondary_character
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            match request
                .secondary_character_description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                Some(desc) => character.push_str(&format!(". {}: {}", secondary, desc)),
                None => character.push_str(&format!(". {} is their friend", secondary)),
            }
        }

        let environment = match request
            .environment_description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(desc) => format!("{}: {}", request.setting, desc),
            None => format!(
                "{} is a colorful and welcoming environment for children",
                request.setting
            ),
        };

        let artistic_style = format!(
            "{}, {}",
            BASE_ARTISTIC_STYLE,
            request.age_range.profile().illustration_style
        );

        Self {
            character,
            environment,
            artistic_style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::sample_request;

    #[test]
    fn test_style_guide_uses_descriptions() {
        let guide = StyleGuide::for_request(&sample_request());
        assert_eq!(
            guide.character,
            "Luna: a curious girl with red boots. Pip: a tiny blue owl"
        );
        assert_eq!(
            guide.environment,
            "the Moon Garden is a colorful and welcoming environment for children"
        );
        assert!(guide.artistic_style.starts_with(BASE_ARTISTIC_STYLE));
    }

    #[test]
    fn test_style_guide_defaults_without_descriptions() {
        let mut req = sample_request();
        req.main_character_description.clear();
        req.secondary_character = None;
        let guide = StyleGuide::for_request(&req);
        assert_eq!(guide.character, "Luna is a children's book character");
    }

    #[test]
    fn test_style_guide_is_deterministic() {
        let req = sample_request();
        assert_eq!(StyleGuide::for_request(&req), StyleGuide::for_request(&req));
    }
}
