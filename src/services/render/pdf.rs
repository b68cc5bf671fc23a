use super::layout::{Element, FontStyle, Layout};
use super::{DocumentConfig, PAGE_HEIGHT, PAGE_WIDTH};
use anyhow::{Context, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use std::io::Write;

const REGULAR_FONT_KEY: &str = "F1";
const BOLD_FONT_KEY: &str = "F2";

fn image_key(scene: u32) -> String {
    format!("Im{}", scene)
}

/// Maps text onto WinAnsiEncoding, the encoding of the standard fonts.
/// Characters outside it become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

fn font_dictionary(base_font: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn image_stream(width: u32, height: u32, rgb: &[u8]) -> Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rgb)?;
    let data = encoder.finish().context("Failed to compress image data")?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        data,
    ))
}

fn element_operations(element: &Element) -> Vec<Operation> {
    match element {
        Element::Text {
            x,
            y,
            font,
            size,
            text,
        } => {
            let key = match font {
                FontStyle::Regular => REGULAR_FONT_KEY,
                FontStyle::Bold => BOLD_FONT_KEY,
            };
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![key.into(), (*size).into()]),
                Operation::new("Td", vec![(*x).into(), (*y).into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]
        }
        Element::Rule { x1, x2, y, width } => vec![
            Operation::new("w", vec![(*width).into()]),
            Operation::new("m", vec![(*x1).into(), (*y).into()]),
            Operation::new("l", vec![(*x2).into(), (*y).into()]),
            Operation::new("S", vec![]),
        ],
        Element::Image {
            scene,
            x,
            y,
            width,
            height,
        } => vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    (*width).into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    (*height).into(),
                    (*x).into(),
                    (*y).into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image_key(scene.get()).into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    }
}

/// Serializes a finished layout. Each illustration is embedded once, as a
/// Flate-compressed RGB image, and shared by reference.
pub fn write_pdf(layout: &Layout, config: &DocumentConfig) -> Result<Vec<u8>> {
    let (regular, bold) = config.resolved_fonts();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(font_dictionary(&regular));
    let bold_id = doc.add_object(font_dictionary(&bold));

    let mut xobjects = Dictionary::new();
    for (scene, img) in &layout.images {
        let id = doc.add_object(image_stream(img.width, img.height, &img.rgb)?);
        xobjects.set(image_key(scene.get()), id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR_FONT_KEY => regular_id,
            BOLD_FONT_KEY => bold_id,
        },
        "XObject" => xobjects,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let operations: Vec<Operation> =
            page.elements.iter().flat_map(element_operations).collect();
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("Failed to encode page content")?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).context("Failed to serialize PDF")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{SceneImages, SceneNumber};
    use crate::services::render::layout_story;
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn image_objects(doc: &Document) -> usize {
        doc.objects
            .values()
            .filter(|obj| match obj {
                Object::Stream(s) => {
                    matches!(s.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
                }
                _ => false,
            })
            .count()
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Hi"), b"Hi".to_vec());
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(encode_win_ansi("“ok”—"), vec![0x93, b'o', b'k', 0x94, 0x97]);
        assert_eq!(encode_win_ansi("ż"), vec![b'?']);
    }

    #[test]
    fn test_pdf_is_readable_and_paged() -> Result<()> {
        let config = DocumentConfig::default();
        let mut images = SceneImages::default();
        images.insert(SceneNumber::new(1).unwrap(), png(64, 48));

        let story = format!("CHAPTER 1: Start\n{}\nCHAPTER 2: End\nBye.", "w".repeat(95 * 50));
        let layout = layout_story(&story, &images, &config);
        let bytes = write_pdf(&layout, &config)?;

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes)?;
        assert_eq!(doc.get_pages().len(), layout.pages.len());
        assert_eq!(image_objects(&doc), 1);
        Ok(())
    }

    #[test]
    fn test_empty_story_still_has_a_page() -> Result<()> {
        let config = DocumentConfig::default();
        let layout = layout_story("", &SceneImages::default(), &config);
        let bytes = write_pdf(&layout, &config)?;
        let doc = Document::load_mem(&bytes)?;
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(image_objects(&doc), 0);
        Ok(())
    }
}
