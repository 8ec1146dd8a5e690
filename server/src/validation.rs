use llm_core::StoryStyle;

use crate::error::ApiError;

/// Maximum length of the setting field
const MAX_SETTING_LENGTH: usize = 200;
/// Maximum length of the comma separated character field
const MAX_CHARACTERS_LENGTH: usize = 500;
/// Maximum number of named characters
const MAX_CHARACTER_COUNT: usize = 12;

/// Validate the raw story form fields and return the parsed style.
///
/// The character field may be blank: a story without named characters is
/// still a valid request.
pub fn validate_story_form(characters: &str, setting: &str, style: &str) -> Result<StoryStyle, ApiError> {
    if setting.trim().is_empty() {
        return Err(ApiError::InvalidInput("Setting cannot be empty".to_string()));
    }
    if setting.chars().count() > MAX_SETTING_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Setting too long (max {} characters)",
            MAX_SETTING_LENGTH
        )));
    }
    if characters.chars().count() > MAX_CHARACTERS_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Character list too long (max {} characters)",
            MAX_CHARACTERS_LENGTH
        )));
    }

    let named = characters.split(',').filter(|c| !c.trim().is_empty()).count();
    if named > MAX_CHARACTER_COUNT {
        return Err(ApiError::InvalidInput(format!(
            "Too many characters (max {})",
            MAX_CHARACTER_COUNT
        )));
    }

    style.parse::<StoryStyle>().map_err(|e| {
        let options: Vec<&str> = StoryStyle::ALL.iter().map(|s| s.label()).collect();
        ApiError::InvalidInput(format!("{e}. Expected one of: {}", options.join(", ")))
    })
}
