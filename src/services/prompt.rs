use crate::core::preferences::StoryConfig;

/// The user's choices as a numbered list the model must honour first.
pub fn preferences_block(cfg: &StoryConfig) -> String {
    let chapters = cfg.chapter_count();
    let hero = cfg
        .hero
        .as_deref()
        .unwrap_or("Unspecified, invent your own");
    let side_desc = cfg
        .side_characters_desc
        .as_deref()
        .unwrap_or("Unspecified, invent your own");

    format!(
        "PRIORITY REQUIREMENTS:\n\
         1. Length: the story should be about **{words} words** long and consist of **{chapters} {size} chapters (SCENE 1-{chapters})**.\n\
         2. Style: narrated in the **{audience}** style, genre **{genre}**.\n\
         3. Main hero: **{hero}**.\n\
         4. Side characters: **{side_count}** side characters. Their roles: **{side_desc}**.\n\
         5. Setting: **{location}**.\n\
         \n\
         Strictly keep the required number of chapters and their numbering.",
        words = cfg.length.word_target(),
        chapters = chapters,
        size = cfg.length.chapter_size(),
        audience = cfg.audience,
        genre = cfg.genre,
        hero = hero,
        side_count = cfg.side_characters,
        side_desc = side_desc,
        location = cfg.location,
    )
}

pub fn outline_prompt(cfg: &StoryConfig) -> String {
    let n = cfg.chapter_count();
    let mut format_lines = String::new();
    for i in 1..=n.min(2) {
        format_lines.push_str(&format!("SCENE {}: ...\n", i));
    }
    if n > 2 {
        format_lines.push_str("...\n");
        format_lines.push_str(&format!("SCENE {}: ...\n", n));
    }

    format!(
        "{preferences}\n\
         \n\
         MAIN IDEA: **{idea}**\n\
         \n\
         Based on the PRIORITY REQUIREMENTS above and the main idea:\n\
         \n\
         1. Write a story outline with **exactly {n} points** (SCENE 1-{n}).\n\
         2. Follow the classic three-act structure (Act I - Setup, Act II - Confrontation, Act III - Resolution). \
         Keep the proportions: Act I about 25% of the scenes, Act II about 50%, Act III about 25%. \
         Do NOT write Act I, Act II or Act III headings; simply order the scenes that way. \
         Add no introduction or conclusion beyond the listed scenes.\n\
         3. Each point has at most 3 sentences describing the key events.\n\
         4. Describe each scene so that it is easy to illustrate.\n\
         \n\
         Response format (START WITH THE FIRST SCENE, NO PREAMBLE, one scene per line, numbered sequentially):\n\
         {format_lines}",
        preferences = preferences_block(cfg),
        idea = cfg.idea.trim(),
        n = n,
        format_lines = format_lines,
    )
}

/// Full-prose prompt. `outline` is the accepted plan, pasted verbatim.
pub fn story_prompt(cfg: &StoryConfig, outline: &str) -> String {
    format!(
        "{preferences}\n\
         \n\
         MAIN IDEA: **{idea}**\n\
         \n\
         Based on the PRIORITY REQUIREMENTS, the main idea and the outline below, write the complete, coherent story.\n\
         \n\
         Remember:\n\
         - **Keep the three-act structure (setup, confrontation, resolution) laid out in the outline.**\n\
         - **Strictly keep the length and the number of chapters ({n}).**\n\
         - **Develop every scene in detail, with dialogue. Do not stop at 2-3 paragraphs per scene.**\n\
         - **Use the hero and the style defined in the PRIORITY REQUIREMENTS.**\n\
         - Start every scene on its own line with exactly the heading CHAPTER X: (where X is the scene number). Separate paragraphs with a blank line.\n\
         \n\
         Outline to use (already ordered as Acts I, II, III):\n\
         ---\n\
         {outline}\n\
         ---",
        preferences = preferences_block(cfg),
        idea = cfg.idea.trim(),
        n = cfg.chapter_count(),
        outline = outline.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::preferences::{Genre, LengthBucket};

    fn config(length: LengthBucket) -> StoryConfig {
        let mut cfg = StoryConfig::new("gpt-4o-mini");
        cfg.length = length;
        cfg.genre = Genre::Comedy;
        cfg.idea = "A dragon afraid of fire".to_string();
        cfg
    }

    #[test]
    fn test_outline_prompt_fixes_scene_count() {
        for (bucket, n) in [
            (LengthBucket::Short, 3),
            (LengthBucket::Medium, 5),
            (LengthBucket::Long, 7),
        ] {
            let prompt = outline_prompt(&config(bucket));
            assert!(prompt.contains(&format!("exactly {} points", n)));
            assert!(prompt.contains(&format!("SCENE {}: ...", n)));
            assert!(prompt.contains("SCENE 1: ..."));
            assert!(prompt.contains("25%"));
            assert!(prompt.contains("A dragon afraid of fire"));
        }
    }

    #[test]
    fn test_preferences_fill_in_unspecified_hero() {
        let mut cfg = config(LengthBucket::Short);
        let block = preferences_block(&cfg);
        assert!(block.contains("Unspecified, invent your own"));
        assert!(block.contains("Comedy"));
        assert!(block.contains("1500 words"));

        cfg.hero = Some("Pucek the dog".to_string());
        assert!(preferences_block(&cfg).contains("Pucek the dog"));
    }

    #[test]
    fn test_story_prompt_embeds_outline_verbatim() {
        let outline = "SCENE 1: Alpha.\nSCENE 2: Beta.\nSCENE 3: Gamma.";
        let prompt = story_prompt(&config(LengthBucket::Short), outline);
        assert!(prompt.contains(outline));
        assert!(prompt.contains("CHAPTER X:"));
        assert!(prompt.contains("blank line"));
    }
}
