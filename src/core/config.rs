use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::images::ImageConfig;
use crate::services::llm::LlmConfig;
use crate::services::render::DocumentConfig;

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub document: DocumentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            build_folder: default_build(),
            llm: LlmConfig::default(),
            images: ImageConfig::default(),
            generation: GenerationConfig::default(),
            pricing: PricingConfig::default(),
            document: DocumentConfig::default(),
        }
    }
}

/// Sampling parameters for the two chat calls of a story.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_outline_params")]
    pub outline: ChatParams,
    #[serde(default = "default_story_params")]
    pub story: ChatParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            outline: default_outline_params(),
            story: default_story_params(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Unit prices in USD plus the conversion rate to the display currency.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PricingConfig {
    #[serde(default = "default_input_price")]
    pub input_per_1k: f64,
    #[serde(default = "default_output_price")]
    pub output_per_1k: f64,
    #[serde(default = "default_image_price")]
    pub image: f64,
    #[serde(default = "default_rate")]
    pub usd_to_local_rate: f64,
    #[serde(default = "default_currency")]
    pub local_currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_1k: default_input_price(),
            output_per_1k: default_output_price(),
            image: default_image_price(),
            usd_to_local_rate: default_rate(),
            local_currency: default_currency(),
        }
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_outline_params() -> ChatParams {
    ChatParams {
        max_tokens: 1500,
        temperature: 0.8,
    }
}
fn default_story_params() -> ChatParams {
    ChatParams {
        max_tokens: 3500,
        temperature: 0.7,
    }
}
fn default_input_price() -> f64 {
    0.005
}
fn default_output_price() -> f64 {
    0.015
}
fn default_image_price() -> f64 {
    0.04
}
fn default_rate() -> f64 {
    4.0
}
fn default_currency() -> String {
    "PLN".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Missing file is not fatal: every setting has a default.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.build_folder)?;
        Ok(())
    }
}
