//! Story parameters and prompt templating.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Narrative style offered by the story form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryStyle {
    Magical,
    Funny,
    Dramatic,
    Adventure,
}

impl StoryStyle {
    /// Every style, in the order the form lists them.
    pub const ALL: [StoryStyle; 4] = [
        StoryStyle::Magical,
        StoryStyle::Funny,
        StoryStyle::Dramatic,
        StoryStyle::Adventure,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StoryStyle::Magical => "Magical",
            StoryStyle::Funny => "Funny",
            StoryStyle::Dramatic => "Dramatic",
            StoryStyle::Adventure => "Adventure",
        }
    }
}

impl fmt::Display for StoryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown story style: {0}")]
pub struct UnknownStyle(pub String);

impl FromStr for StoryStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        StoryStyle::ALL
            .into_iter()
            .find(|style| style.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownStyle(s.to_string()))
    }
}

/// Parameters of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRequest {
    characters: Vec<String>,
    setting: String,
    style: StoryStyle,
}

impl StoryRequest {
    /// Blank character names are dropped; the rest are trimmed and keep
    /// their order. Duplicates are kept.
    pub fn new<I, S>(characters: I, setting: impl Into<String>, style: StoryStyle) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let characters = characters
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            characters,
            setting: setting.into().trim().to_string(),
            style,
        }
    }

    /// Build a request from the raw form fields, where characters are a
    /// comma separated list such as `"Luna, Theo"`.
    pub fn from_form(characters: &str, setting: &str, style: StoryStyle) -> Self {
        Self::new(characters.split(','), setting, style)
    }

    pub fn characters(&self) -> &[String] {
        &self.characters
    }

    pub fn setting(&self) -> &str {
        &self.setting
    }

    pub fn style(&self) -> StoryStyle {
        self.style
    }
}

/// Render the prompt sent to the model. Pure: the same request always
/// yields the same bytes.
pub fn build_prompt(request: &StoryRequest) -> String {
    format!(
        "Create a short 5-minute fairy tale with:\n\
         - Characters: {characters}\n\
         - Setting: {setting}\n\
         - Style: {style}\n\
         - Use dialogues with character names (e.g., Luna: \"Hello!\")\n\
         - Include magical sound cues like [forest sounds], [magic sparkle].\n\
         Narrate in story style, paragraph by paragraph.\n",
        characters = request.characters.join(", "),
        setting = request.setting,
        style = request.style,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_request_fields() {
        let request = StoryRequest::new(["Luna", "Theo"], "Enchanted Forest", StoryStyle::Magical);
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Luna, Theo"));
        assert!(prompt.contains("Enchanted Forest"));
        assert!(prompt.contains("Style: Magical"));
        assert!(prompt.contains("[forest sounds]"));
        assert!(prompt.contains("paragraph by paragraph"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let request = StoryRequest::from_form("Luna, Theo", "Enchanted Forest", StoryStyle::Funny);
        assert_eq!(build_prompt(&request), build_prompt(&request.clone()));
    }

    #[test]
    fn test_prompt_with_no_characters() {
        let request = StoryRequest::new(Vec::<String>::new(), "Castle", StoryStyle::Dramatic);
        let prompt = build_prompt(&request);
        assert!(prompt.contains("- Characters: \n"));
        assert!(prompt.contains("Castle"));
    }

    #[test]
    fn test_from_form_trims_and_drops_blanks() {
        let request = StoryRequest::from_form(" Luna , ,Theo,, Luna ", "  Sea ", StoryStyle::Adventure);
        assert_eq!(request.characters(), ["Luna", "Theo", "Luna"]);
        assert_eq!(request.setting(), "Sea");

        let empty = StoryRequest::from_form("  ,  ", "Sea", StoryStyle::Adventure);
        assert!(empty.characters().is_empty());
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("Magical".parse::<StoryStyle>(), Ok(StoryStyle::Magical));
        assert_eq!(" funny ".parse::<StoryStyle>(), Ok(StoryStyle::Funny));
        assert_eq!("ADVENTURE".parse::<StoryStyle>(), Ok(StoryStyle::Adventure));
        assert_eq!(
            "Spooky".parse::<StoryStyle>(),
            Err(UnknownStyle("Spooky".to_string()))
        );
    }

    #[test]
    fn test_style_labels_in_form_order() {
        let labels: Vec<_> = StoryStyle::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, ["Magical", "Funny", "Dramatic", "Adventure"]);
    }
}
