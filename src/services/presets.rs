use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Style name to prompt fragment, read once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePresets {
    styles: BTreeMap<String, String>,
}

impl StylePresets {
    pub fn from_json(content: &str) -> Result<Self> {
        let styles: BTreeMap<String, String> =
            serde_json::from_str(content).context("Style presets must be a JSON object of strings")?;
        if styles.is_empty() {
            bail!("Style presets file defines no styles");
        }
        Ok(Self { styles })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content)
    }

    /// `None` turns illustrations off for the session instead of aborting.
    pub fn load_or_disable(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(presets) => {
                info!("Loaded {} illustration styles from {}", presets.len(), path.display());
                Some(presets)
            }
            Err(e) => {
                warn!("Illustrations disabled: {:#}", e);
                None
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.styles.keys().cloned().collect()
    }

    pub fn fragment(&self, style: &str) -> Option<&str> {
        self.styles.get(style).map(|s| s.as_str())
    }

    pub fn contains(&self, style: &str) -> bool {
        self.styles.contains_key(style)
    }

    pub fn default_style(&self) -> Option<&str> {
        self.styles.keys().next().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_presets() {
        let presets = StylePresets::from_json(
            r#"{ "Watercolor": "soft watercolor washes", "Comic": "bold ink outlines" }"#,
        )
        .unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets.fragment("Comic"), Some("bold ink outlines"));
        assert_eq!(presets.default_style(), Some("Comic"));
        assert!(presets.fragment("Oil").is_none());
    }

    #[test]
    fn test_missing_or_bad_file_disables() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StylePresets::load_or_disable(&dir.path().join("missing.json")).is_none());

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"["not", "an", "object"]"#).unwrap();
        assert!(StylePresets::load_or_disable(&bad).is_none());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "{}").unwrap();
        assert!(StylePresets::load_or_disable(&empty).is_none());

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{ "Pixel": "8-bit pixel art" }"#).unwrap();
        assert_eq!(StylePresets::load_or_disable(&good).unwrap().len(), 1);
    }
}
