use crate::core::config::Config;
use crate::core::preferences::{
    Audience, Genre, LengthBucket, LocationConstraint, StoryConfig, MAX_ILLUSTRATIONS,
    MAX_SIDE_CHARACTERS,
};
use crate::services::presets::StylePresets;
use anyhow::{anyhow, Result};
use inquire::validator::Validation;
use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Select, Text};

/// Asks for the API key. The answer is masked and never echoed back.
pub fn ask_credential() -> Result<String> {
    let key = Password::new("API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Kept in memory for this session only")
        .prompt()?;
    Ok(key)
}

/// Walks the user through the preference form. `previous` pre-fills every
/// answer, so a failed submission can be retried quickly.
pub fn collect_preferences(
    config: &Config,
    presets: Option<&StylePresets>,
    previous: Option<&StoryConfig>,
) -> Result<StoryConfig> {
    let base = previous
        .cloned()
        .unwrap_or_else(|| StoryConfig::new(config.llm.default_model()));

    let idea = Text::new("Main story idea:")
        .with_initial_value(&base.idea)
        .with_help_message("One or two sentences about what should happen")
        .prompt()?;

    let genre = Select::new("Genre:", Genre::ALL.to_vec())
        .with_starting_cursor(cursor(&Genre::ALL, &base.genre))
        .prompt()?;

    let audience = Select::new("Audience:", Audience::ALL.to_vec())
        .with_starting_cursor(cursor(&Audience::ALL, &base.audience))
        .prompt()?;

    let length = Select::new("Length:", LengthBucket::ALL.to_vec())
        .with_starting_cursor(cursor(&LengthBucket::ALL, &base.length))
        .prompt()?;

    let hero = Text::new("Main hero (leave empty to let the model decide):")
        .with_initial_value(base.hero.as_deref().unwrap_or(""))
        .prompt()?;

    let side_characters = CustomType::<u8>::new("Number of side characters:")
        .with_default(base.side_characters)
        .with_help_message(&format!("0 to {}", MAX_SIDE_CHARACTERS))
        .with_validator(|n: &u8| {
            if *n <= MAX_SIDE_CHARACTERS {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid(
                    format!("At most {} side characters", MAX_SIDE_CHARACTERS).into(),
                ))
            }
        })
        .prompt()?;

    let side_characters_desc = if side_characters > 0 {
        Some(
            Text::new("Side character roles (optional):")
                .with_initial_value(base.side_characters_desc.as_deref().unwrap_or(""))
                .prompt()?,
        )
    } else {
        None
    };

    let location = Select::new("Setting:", LocationConstraint::ALL.to_vec())
        .with_starting_cursor(cursor(&LocationConstraint::ALL, &base.location))
        .prompt()?;

    let model = if config.llm.models.len() > 1 {
        let start = config
            .llm
            .models
            .iter()
            .position(|m| *m == base.model)
            .unwrap_or(0);
        Select::new("Model:", config.llm.models.clone())
            .with_starting_cursor(start)
            .prompt()?
    } else {
        config.llm.default_model()
    };

    let mut prefs = StoryConfig {
        idea,
        genre,
        audience,
        length,
        hero: Some(hero),
        side_characters,
        side_characters_desc,
        location,
        illustrations: None,
        model,
    };

    if let Some(presets) = presets {
        let wanted = Confirm::new("Add illustrations?")
            .with_default(base.illustrations.is_some())
            .prompt()?;
        if wanted {
            let styles = presets.names();
            let current = base
                .illustrations
                .as_ref()
                .map(|i| i.style.as_str())
                .or(presets.default_style())
                .unwrap_or("");
            let start = styles.iter().position(|s| s == current).unwrap_or(0);
            let style = Select::new("Illustration style:", styles)
                .with_starting_cursor(start)
                .prompt()?;

            let default_max = base
                .illustrations
                .as_ref()
                .map(|i| i.max_count)
                .unwrap_or(3)
                .min(length.chapter_count() as u8);
            let max_count = CustomType::<u8>::new("How many illustrations at most:")
                .with_default(default_max)
                .with_help_message(&format!("1 to {}", MAX_ILLUSTRATIONS))
                .with_validator(|n: &u8| {
                    if (1..=MAX_ILLUSTRATIONS).contains(n) {
                        Ok(Validation::Valid)
                    } else {
                        Ok(Validation::Invalid(
                            format!("Pick between 1 and {}", MAX_ILLUSTRATIONS).into(),
                        ))
                    }
                })
                .prompt()?;

            prefs = prefs.with_illustrations(style, max_count);
        }
    }

    let prefs = prefs.normalized();
    if prefs.idea.trim().is_empty() {
        return Err(anyhow!("The story needs a main idea"));
    }
    Ok(prefs)
}

/// Asks which scene to illustrate, limited to the outline's range.
pub fn ask_scene(prompt: &str, scene_count: usize) -> Result<u32> {
    let max = scene_count as u32;
    let scene = CustomType::<u32>::new(prompt)
        .with_help_message(&format!("1 to {}", max))
        .prompt()?;
    Ok(scene)
}

fn cursor<T: PartialEq>(all: &[T], current: &T) -> usize {
    all.iter().position(|v| v == current).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_points_at_previous_answer() {
        assert_eq!(cursor(&LengthBucket::ALL, &LengthBucket::Long), 2);
        assert_eq!(cursor(&Audience::ALL, &Audience::Children), 0);
        assert_eq!(cursor::<u8>(&[], &1), 0);
    }
}
