use super::{DocumentConfig, PAGE_HEIGHT, PAGE_WIDTH};
use crate::core::state::{SceneImages, SceneNumber};
use crate::utils::text::{chapter_number, chunk_chars, is_chapter_heading, strip_formatting};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

pub const TITLE_SIZE: f32 = 22.0;
pub const HEADING_SIZE: f32 = 16.0;
pub const BODY_SIZE: f32 = 12.0;
pub const FOOTER_SIZE: f32 = 10.0;

const HEADING_ADVANCE: f32 = 18.0;
const HEADING_RULE_LENGTH: f32 = 180.0;
const AFTER_RULE: f32 = 25.0;
const IMAGE_GAP: f32 = 10.0;
const AFTER_IMAGE: f32 = 30.0;
const PAGE_NUMBER_Y: f32 = 30.0;
const CLOSING_FOOTER_Y: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Regular,
    Bold,
}

/// Coordinates are PDF points, origin bottom-left.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text {
        x: f32,
        y: f32,
        font: FontStyle,
        size: f32,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        width: f32,
    },
    Image {
        scene: SceneNumber,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub elements: Vec<Element>,
}

/// Decoded pixels, 8-bit RGB, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl DecodedImage {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).context("Unreadable image data")?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            bail!("Image has no pixels");
        }
        Ok(Self {
            width,
            height,
            rgb: rgb.into_raw(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub pages: Vec<Page>,
    /// Every illustration referenced by an `Element::Image`.
    pub images: BTreeMap<SceneNumber, DecodedImage>,
    pub warnings: Vec<String>,
}

impl Layout {
    /// (scene, 1-based page) for each placed picture, in drawing order.
    pub fn placements(&self) -> Vec<(SceneNumber, usize)> {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(i, page)| {
                page.elements.iter().filter_map(move |e| match e {
                    Element::Image { scene, .. } => Some((*scene, i + 1)),
                    _ => None,
                })
            })
            .collect()
    }
}

/// Rough Times width: half an em per character. Only used for centering.
fn approx_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

struct LayoutBuilder<'a> {
    config: &'a DocumentConfig,
    pages: Vec<Page>,
    y: f32,
    images: BTreeMap<SceneNumber, DecodedImage>,
    failed: Vec<SceneNumber>,
    warnings: Vec<String>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(config: &'a DocumentConfig) -> Self {
        Self {
            config,
            pages: vec![Page::default()],
            y: PAGE_HEIGHT - config.margin,
            images: BTreeMap::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn push(&mut self, element: Element) {
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(element);
        }
    }

    fn text(&mut self, x: f32, font: FontStyle, size: f32, text: String) {
        let y = self.y;
        self.push(Element::Text {
            x,
            y,
            font,
            size,
            text,
        });
    }

    fn centered(&mut self, y: f32, font: FontStyle, size: f32, text: String) {
        let x = ((PAGE_WIDTH - approx_width(&text, size)) / 2.0).max(0.0);
        self.push(Element::Text {
            x,
            y,
            font,
            size,
            text,
        });
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = PAGE_HEIGHT - self.config.margin;
        let number = self.pages.len();
        self.centered(
            PAGE_NUMBER_Y,
            FontStyle::Regular,
            FOOTER_SIZE,
            format!("Page {}", number),
        );
    }

    fn title_block(&mut self) {
        let title = self.config.title.clone();
        let y = self.y;
        self.centered(y, FontStyle::Bold, TITLE_SIZE, title);
        self.y -= 50.0;
        let margin = self.config.margin;
        let y = self.y;
        self.push(Element::Rule {
            x1: margin,
            x2: PAGE_WIDTH - margin,
            y,
            width: 0.5,
        });
        self.y -= 50.0;
    }

    fn heading(&mut self, title: String) {
        if self.y - (HEADING_ADVANCE + AFTER_RULE) < self.config.bottom_limit {
            self.new_page();
        }
        let margin = self.config.margin;
        self.text(margin, FontStyle::Bold, HEADING_SIZE, title);
        self.y -= HEADING_ADVANCE;
        let y = self.y;
        self.push(Element::Rule {
            x1: margin,
            x2: margin + HEADING_RULE_LENGTH,
            y,
            width: 0.3,
        });
        self.y -= AFTER_RULE;
    }

    /// Draws slices of `line`, breaking the page before any slice that
    /// would start below the bottom limit.
    fn body(&mut self, line: &str) {
        for slice in chunk_chars(line, self.config.wrap_width) {
            if self.y < self.config.bottom_limit {
                self.new_page();
            }
            let margin = self.config.margin;
            self.text(margin, FontStyle::Regular, BODY_SIZE, slice);
            self.y -= self.config.line_height;
        }
    }

    fn decoded(&mut self, scene: SceneNumber, bytes: &[u8]) -> Option<(u32, u32)> {
        if let Some(img) = self.images.get(&scene) {
            return Some((img.width, img.height));
        }
        if self.failed.contains(&scene) {
            return None;
        }
        match DecodedImage::decode(bytes) {
            Ok(img) => {
                let dims = (img.width, img.height);
                self.images.insert(scene, img);
                Some(dims)
            }
            Err(e) => {
                self.failed.push(scene);
                self.warnings
                    .push(format!("Illustration for chapter {} skipped: {:#}", scene, e));
                None
            }
        }
    }

    fn illustration(&mut self, scene: SceneNumber, bytes: &[u8]) {
        let Some((iw, ih)) = self.decoded(scene, bytes) else {
            return;
        };

        let max_w = self.config.text_width() * self.config.image_width_fraction;
        let max_h = PAGE_HEIGHT - 2.0 * self.config.margin - IMAGE_GAP;
        let scale = (max_w / iw as f32).min(max_h / ih as f32).min(1.0);
        let width = iw as f32 * scale;
        let height = ih as f32 * scale;

        if self.y - height < self.config.margin {
            self.new_page();
        }

        let x = (PAGE_WIDTH - width) / 2.0;
        let y = self.y - height - IMAGE_GAP;
        self.push(Element::Image {
            scene,
            x,
            y,
            width,
            height,
        });
        self.y -= height + AFTER_IMAGE;
    }

    fn finish(mut self) -> Layout {
        let pages = self.pages.len();
        let footer = format!("{} © {} pages", self.config.footer, pages);
        self.centered(CLOSING_FOOTER_Y, FontStyle::Regular, FOOTER_SIZE, footer);
        Layout {
            pages: self.pages,
            images: self.images,
            warnings: self.warnings,
        }
    }
}

/// Lays out the story page by page.
///
/// A chapter heading takes the number written right after "chapter"; a
/// heading without one continues from the previous chapter. The picture stored under that
/// number is drawn right under the heading.
pub fn layout_story(story: &str, images: &SceneImages, config: &DocumentConfig) -> Layout {
    let mut builder = LayoutBuilder::new(config);
    builder.title_block();

    let mut last_chapter: Option<SceneNumber> = None;

    for line in story.lines() {
        let line = line.trim();
        if line.is_empty() {
            builder.y -= config.paragraph_spacing;
            continue;
        }

        if is_chapter_heading(line) {
            let title = strip_formatting(line);
            let chapter = chapter_number(line)
                .and_then(SceneNumber::new)
                .or_else(|| match last_chapter {
                    Some(prev) => prev.next(),
                    None => Some(SceneNumber::from_index(0)),
                });
            builder.heading(title);
            // A heading past the last possible number gets no picture.
            if let Some(chapter) = chapter {
                if let Some(bytes) = images.get(chapter) {
                    builder.illustration(chapter, bytes);
                }
                last_chapter = Some(chapter);
            }
        } else {
            builder.body(line);
        }
    }

    builder.finish()
}
