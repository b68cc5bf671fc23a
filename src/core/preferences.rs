use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SIDE_CHARACTERS: u8 = 5;
pub const MAX_ILLUSTRATIONS: u8 = 7;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Genre {
    #[default]
    FairyTale,
    Fantasy,
    Adventure,
    Comedy,
    Horror,
    Romance,
    SciFi,
    Drama,
}

impl Genre {
    pub const ALL: [Genre; 8] = [
        Genre::FairyTale,
        Genre::Fantasy,
        Genre::Adventure,
        Genre::Comedy,
        Genre::Horror,
        Genre::Romance,
        Genre::SciFi,
        Genre::Drama,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Genre::FairyTale => "Fairy tale",
            Genre::Fantasy => "Fantasy",
            Genre::Adventure => "Adventure",
            Genre::Comedy => "Comedy",
            Genre::Horror => "Horror",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Drama => "Drama",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Audience {
    #[default]
    Children,
    Teen,
    Adult,
}

impl Audience {
    pub const ALL: [Audience; 3] = [Audience::Children, Audience::Teen, Audience::Adult];

    pub fn label(&self) -> &'static str {
        match self {
            Audience::Children => "Children (simple language, fairy-tale tone)",
            Audience::Teen => "Teen (dynamic, colloquial language)",
            Audience::Adult => "Adult (reflective, deeper themes)",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Target length; decides how many scenes the outline must contain.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LengthBucket {
    Short,
    #[default]
    Medium,
    Long,
}

impl LengthBucket {
    pub const ALL: [LengthBucket; 3] = [LengthBucket::Short, LengthBucket::Medium, LengthBucket::Long];

    pub fn chapter_count(&self) -> usize {
        match self {
            LengthBucket::Short => 3,
            LengthBucket::Medium => 5,
            LengthBucket::Long => 7,
        }
    }

    pub fn word_target(&self) -> u32 {
        match self {
            LengthBucket::Short => 1500,
            LengthBucket::Medium => 2250,
            LengthBucket::Long => 3000,
        }
    }

    pub fn chapter_size(&self) -> &'static str {
        match self {
            LengthBucket::Short => "short",
            LengthBucket::Medium => "medium",
            LengthBucket::Long => "long",
        }
    }
}

impl fmt::Display for LengthBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} chapters, ~{} words)",
            self.chapter_size(),
            self.chapter_count(),
            self.word_target()
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LocationConstraint {
    #[default]
    SinglePlace,
    TwoPlaces,
    Random,
}

impl LocationConstraint {
    pub const ALL: [LocationConstraint; 3] = [
        LocationConstraint::SinglePlace,
        LocationConstraint::TwoPlaces,
        LocationConstraint::Random,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LocationConstraint::SinglePlace => "One place (e.g. a mysterious forest)",
            LocationConstraint::TwoPlaces => "Two places (e.g. a city and the mountains)",
            LocationConstraint::Random => "Random (leave it to the AI)",
        }
    }
}

impl fmt::Display for LocationConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IllustrationSettings {
    pub style: String,
    pub max_count: u8,
}

/// Snapshot of everything the user chose for one story.
///
/// Built once per submission; replacing it resets outline, story and images.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoryConfig {
    pub idea: String,
    pub genre: Genre,
    pub audience: Audience,
    pub length: LengthBucket,
    pub hero: Option<String>,
    pub side_characters: u8,
    pub side_characters_desc: Option<String>,
    pub location: LocationConstraint,
    /// `None` means the story is generated without illustrations.
    pub illustrations: Option<IllustrationSettings>,
    pub model: String,
}

impl StoryConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            idea: String::new(),
            genre: Genre::default(),
            audience: Audience::default(),
            length: LengthBucket::default(),
            hero: None,
            side_characters: 1,
            side_characters_desc: None,
            location: LocationConstraint::default(),
            illustrations: None,
            model: model.into(),
        }
    }

    pub fn with_illustrations(mut self, style: impl Into<String>, max_count: u8) -> Self {
        self.illustrations = Some(IllustrationSettings {
            style: style.into(),
            max_count: max_count.clamp(1, MAX_ILLUSTRATIONS),
        });
        self
    }

    /// Clamps ranged fields and folds blank free text into `None`.
    pub fn normalized(mut self) -> Self {
        self.side_characters = self.side_characters.min(MAX_SIDE_CHARACTERS);
        self.hero = non_blank(self.hero);
        self.side_characters_desc = non_blank(self.side_characters_desc);
        if let Some(ill) = self.illustrations.as_mut() {
            ill.max_count = ill.max_count.clamp(1, MAX_ILLUSTRATIONS);
        }
        self
    }

    pub fn chapter_count(&self) -> usize {
        self.length.chapter_count()
    }

    pub fn max_illustrations(&self) -> usize {
        self.illustrations
            .as_ref()
            .map(|i| i.max_count as usize)
            .unwrap_or(0)
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bucket_chapter_counts() {
        let counts: Vec<usize> = LengthBucket::ALL.iter().map(|b| b.chapter_count()).collect();
        assert_eq!(counts, vec![3, 5, 7]);
    }

    #[test]
    fn test_normalized_clamps_and_blanks() {
        let mut cfg = StoryConfig::new("gpt-4o-mini").with_illustrations("Watercolor", 3);
        cfg.side_characters = 9;
        cfg.hero = Some("   ".to_string());
        cfg.side_characters_desc = Some(" a grumpy cat ".to_string());
        if let Some(ill) = cfg.illustrations.as_mut() {
            ill.max_count = 12;
        }

        let cfg = cfg.normalized();
        assert_eq!(cfg.side_characters, MAX_SIDE_CHARACTERS);
        assert_eq!(cfg.hero, None);
        assert_eq!(cfg.side_characters_desc.as_deref(), Some("a grumpy cat"));
        assert_eq!(cfg.max_illustrations(), 7);
    }

    #[test]
    fn test_no_illustrations_means_zero_budget() {
        let cfg = StoryConfig::new("gpt-4o");
        assert_eq!(cfg.max_illustrations(), 0);
    }
}
