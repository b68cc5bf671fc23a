use crate::core::state::{Outline, Scene, SceneNumber};
use crate::utils::text::{is_scene_line, strip_code_blocks};

/// Keeps the "SCENE n: ..." lines of a generated plan, in order.
///
/// Scene numbers come from position, not from the digits the model wrote,
/// so a skipped or repeated number cannot break the image lookup.
pub fn parse_outline(raw: &str) -> Outline {
    let body = strip_code_blocks(raw);
    let scenes = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| is_scene_line(line))
        .enumerate()
        .map(|(i, line)| Scene {
            number: SceneNumber::from_index(i),
            text: line.to_string(),
        })
        .collect();

    Outline {
        raw: raw.trim().to_string(),
        scenes,
    }
}
