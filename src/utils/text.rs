use regex::Regex;
use std::sync::LazyLock;

/// A plan line: optional markdown noise, then "SCENE n" or "CHAPTER n".
static SCENE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^[#*_"`\s]*(scene|chapter)\s+\d+"#).unwrap());

static SCENE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(scene|chapter)\s+\d+[:.]?\s*").unwrap());

static CHAPTER_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^[#*_"`\s]*chapter\b"#).unwrap());

static FORMATTING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[*"_`#]+"#).unwrap());

static CHAPTER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^[#*_"`\s]*chapter\s+(\d+)"#).unwrap());

pub fn is_scene_line(line: &str) -> bool {
    SCENE_LINE.is_match(line)
}

pub fn is_chapter_heading(line: &str) -> bool {
    CHAPTER_HEADING.is_match(line)
}

/// Removes every "SCENE n:" / "CHAPTER n." label, leaving the description.
pub fn strip_scene_markers(text: &str) -> String {
    SCENE_MARKER.replace_all(text, "").trim().to_string()
}

/// Drops markdown emphasis, heading hashes, backticks and double quotes.
pub fn strip_formatting(text: &str) -> String {
    FORMATTING.replace_all(text, "").trim().to_string()
}

/// The number written right after "chapter", if any.
pub fn chapter_number(line: &str) -> Option<u32> {
    CHAPTER_NUMBER
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string ("```text") along with the fence.
        let body = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest,
        };
        body.trim_end().trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

/// Splits into chunks of at most `width` characters (not bytes).
pub fn chunk_chars(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}
