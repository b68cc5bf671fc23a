//! Story text + scene images -> paginated PDF.
//!
//! Two passes: [`layout`] decides where every line, rule and picture goes and
//! where pages break; [`pdf`] turns that plan into bytes. Only the layout
//! pass knows about pagination rules.

pub mod layout;
pub mod pdf;

use crate::core::state::{SceneImages, SceneNumber};
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub use layout::{layout_story, DecodedImage, Element, FontStyle, Layout, Page};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

pub const STANDARD_FONTS: [&str; 14] = [
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DocumentConfig {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_footer")]
    pub footer: String,
    /// Characters per body line. Fixed width, no font metrics.
    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Body text never starts below this height.
    #[serde(default = "default_bottom_limit")]
    pub bottom_limit: f32,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    #[serde(default = "default_paragraph_spacing")]
    pub paragraph_spacing: f32,
    #[serde(default = "default_image_width_fraction")]
    pub image_width_fraction: f32,
    #[serde(default = "default_regular_font")]
    pub regular_font: String,
    #[serde(default = "default_bold_font")]
    pub bold_font: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            title: default_title(),
            footer: default_footer(),
            wrap_width: default_wrap_width(),
            margin: default_margin(),
            bottom_limit: default_bottom_limit(),
            line_height: default_line_height(),
            paragraph_spacing: default_paragraph_spacing(),
            image_width_fraction: default_image_width_fraction(),
            regular_font: default_regular_font(),
            bold_font: default_bold_font(),
        }
    }
}

fn default_file_name() -> String {
    "story_factory.pdf".to_string()
}
fn default_title() -> String {
    "A story from the Story Factory".to_string()
}
fn default_footer() -> String {
    "Story Factory".to_string()
}
fn default_wrap_width() -> usize {
    95
}
fn default_margin() -> f32 {
    60.0
}
fn default_bottom_limit() -> f32 {
    80.0
}
fn default_line_height() -> f32 {
    15.0
}
fn default_paragraph_spacing() -> f32 {
    10.0
}
fn default_image_width_fraction() -> f32 {
    0.7
}
fn default_regular_font() -> String {
    "Times-Roman".to_string()
}
fn default_bold_font() -> String {
    "Times-Bold".to_string()
}

impl DocumentConfig {
    pub fn text_width(&self) -> f32 {
        PAGE_WIDTH - 2.0 * self.margin
    }

    /// Base fonts to embed, falling back when a name is not a standard font.
    pub fn resolved_fonts(&self) -> (String, String) {
        (
            resolve_font(&self.regular_font, "Times-Roman"),
            resolve_font(&self.bold_font, "Times-Bold"),
        )
    }
}

fn resolve_font(name: &str, fallback: &str) -> String {
    if STANDARD_FONTS.contains(&name) {
        name.to_string()
    } else {
        warn!("Font '{}' is not a standard PDF font, using {}", name, fallback);
        fallback.to_string()
    }
}

pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Scene and 1-based page of every picture that made it in.
    pub placements: Vec<(SceneNumber, usize)>,
    /// Illustrations that were skipped, one message each.
    pub warnings: Vec<String>,
}

/// Renders the whole document. A broken picture is skipped with a warning;
/// only a failure to produce the PDF itself is an error.
pub fn render_document(
    story: &str,
    images: &SceneImages,
    config: &DocumentConfig,
) -> Result<RenderedDocument> {
    let layout = layout_story(story, images, config);
    for w in &layout.warnings {
        warn!("{}", w);
    }

    let bytes = pdf::write_pdf(&layout, config)?;
    info!(
        "Rendered {} pages with {} illustrations ({} bytes)",
        layout.pages.len(),
        layout.placements().len(),
        bytes.len()
    );

    Ok(RenderedDocument {
        page_count: layout.pages.len(),
        placements: layout.placements(),
        warnings: layout.warnings.clone(),
        bytes,
    })
}
