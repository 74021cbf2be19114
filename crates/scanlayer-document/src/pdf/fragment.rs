// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page fragments — the single-page PDFs produced by text recognition, holding
// the enhanced page image and an invisible, positioned text layer.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, instrument, warn};

use crate::handle::{HandleGuard, HandleKind, HandleTracker};
use crate::image::bitmap::EnhancedBitmap;

/// Average Helvetica glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.50;

/// Share of the line box below the baseline.
const DESCENT_RATIO: f32 = 0.2;

/// A single-page document produced for one source page.
///
/// Ownership moves into the assembler, which drops it once the page has been
/// copied into the output.
#[derive(Debug)]
pub struct PageFragment {
    document: Document,
    page_id: ObjectId,
    _handle: HandleGuard,
}

impl PageFragment {
    /// Parse engine output. The bytes must hold exactly one page.
    ///
    /// `page_number` (one-based) is used only for error attribution.
    #[instrument(skip(data, tracker), fields(bytes_len = data.len()))]
    pub fn from_pdf_bytes(data: &[u8], page_number: usize, tracker: &HandleTracker) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| ScanlayerError::Recognition {
            page: page_number,
            detail: format!("engine produced an unreadable PDF: {err}"),
        })?;
        Self::from_document(document, page_number, tracker)
    }

    /// Wrap an in-memory single-page document.
    pub fn from_document(document: Document, page_number: usize, tracker: &HandleTracker) -> Result<Self> {
        let pages = document.get_pages();
        if pages.len() != 1 {
            return Err(ScanlayerError::Recognition {
                page: page_number,
                detail: format!("expected a single-page fragment, got {} pages", pages.len()),
            });
        }
        let page_id = *pages.values().next().ok_or_else(|| ScanlayerError::Recognition {
            page: page_number,
            detail: "fragment page tree is empty".into(),
        })?;

        Ok(Self {
            document,
            page_id,
            _handle: tracker.acquire(HandleKind::Fragment),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    /// Serialize the fragment on its own (diagnostics, debugging dumps).
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| ScanlayerError::Assembly(format!("failed to serialise fragment: {err}")))?;
        Ok(output)
    }
}

/// A run of recognised text and its bounding box in image pixels
/// (origin top-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Builds a [`PageFragment`] from an enhanced bitmap and recognised text.
///
/// The page is sized so that the bitmap covers it exactly at `dpi`. Text is
/// drawn first in render mode 3 (invisible) and the image is painted over it,
/// so the page looks like the scan while the text stays selectable.
///
/// The text layer uses Helvetica with `WinAnsiEncoding`, so only Latin-1
/// text is searchable. Other characters, CJK included, are written as `?`
/// and a warning reports how many were lost.
pub struct FragmentBuilder {
    dpi: u32,
}

impl FragmentBuilder {
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }

    #[instrument(skip_all, fields(width = bitmap.width(), height = bitmap.height(), spans = spans.len()))]
    pub fn build(
        &self,
        bitmap: &EnhancedBitmap,
        spans: &[TextSpan],
        page_number: usize,
        tracker: &HandleTracker,
    ) -> Result<PageFragment> {
        let dpi = self.dpi as f32;
        let px_to_pt = 72.0 / dpi;
        let page_w = bitmap.width() as f32 * 72.0 / dpi;
        let page_h = bitmap.height() as f32 * 72.0 / dpi;

        let lost: usize = spans.iter().map(|span| unencodable_chars(&span.text)).sum();
        if lost > 0 {
            warn!(page = page_number, lost, "Characters outside WinAnsi written as '?'; they will not be searchable");
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let image = bitmap.as_gray();
        let image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(bitmap.width() as i64),
                "Height" => Object::Integer(bitmap.height() as i64),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => Object::Integer(8),
            },
            image.as_raw().clone(),
        );
        let image_id = doc.add_object(image_stream);

        let mut operations = Vec::new();
        for span in spans {
            operations.extend(text_operations(span, px_to_pt, page_h));
        }
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(page_w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(page_h),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ]);

        let content = Content { operations };
        let encoded = content.encode().map_err(|err| ScanlayerError::Recognition {
            page: page_number,
            detail: format!("failed to encode text layer: {err}"),
        })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F0" => font_id },
            "XObject" => dictionary! { "Im0" => image_id },
        });

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(page_w), Object::Real(page_h)],
            "Contents" => content_id,
            "Resources" => resources_id,
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        debug!(page_w, page_h, "Fragment built");
        PageFragment::from_document(doc, page_number, tracker)
    }
}

/// Invisible text operations placing `span` over its box.
///
/// The font size follows the box height and horizontal scaling stretches the
/// estimated Helvetica advance to the box width, so selection highlights line
/// up with the glyphs in the image.
fn text_operations(span: &TextSpan, px_to_pt: f32, page_h: f32) -> Vec<Operation> {
    let text = span.text.trim();
    if text.is_empty() || span.height <= 0.0 || span.width <= 0.0 {
        return Vec::new();
    }

    let font_size = span.height * px_to_pt;
    let box_w = span.width * px_to_pt;
    let x = span.left * px_to_pt;
    let baseline = page_h - (span.top + span.height) * px_to_pt + font_size * DESCENT_RATIO;

    let glyphs = text.chars().count() as f32;
    let natural_w = glyphs * AVG_GLYPH_WIDTH * font_size;
    let scaling = if natural_w > 0.0 { 100.0 * box_w / natural_w } else { 100.0 };

    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![Object::Integer(3)]),
        Operation::new("Tf", vec![Object::Name(b"F0".to_vec()), Object::Real(font_size)]),
        Operation::new("Tz", vec![Object::Real(scaling)]),
        Operation::new("Td", vec![Object::Real(x), Object::Real(baseline)]),
        Operation::new(
            "Tj",
            vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

fn win_ansi_byte(c: char) -> Option<u8> {
    match u32::from(c) {
        code @ (0x20..=0x7E | 0xA0..=0xFF) => Some(code as u8),
        _ => None,
    }
}

/// Map text onto the single-byte WinAnsi range; anything outside becomes `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}

/// Number of characters in `text` the text layer cannot represent.
pub fn unencodable_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_whitespace() && win_ansi_byte(*c).is_none())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn bitmap(width: u32, height: u32) -> EnhancedBitmap {
        EnhancedBitmap::from_gray(GrayImage::from_pixel(width, height, Luma([255u8])))
    }

    #[test]
    fn built_fragment_has_one_page_sized_from_dpi() {
        let tracker = HandleTracker::new();
        let span = TextSpan {
            text: "Invoice 42".into(),
            left: 30.0,
            top: 40.0,
            width: 200.0,
            height: 30.0,
        };
        let mut fragment = FragmentBuilder::new(300)
            .build(&bitmap(600, 300), &[span], 1, &tracker)
            .expect("build");
        assert_eq!(tracker.open_handles(), 1);

        let page = fragment.document().get_dictionary(fragment.page_id()).expect("page");
        let media_box = page.get(b"MediaBox").and_then(Object::as_array).expect("media box");
        // 600 px at 300 dpi = 144 pt, 300 px = 72 pt.
        assert_eq!(media_box[2].as_float().expect("w"), 144.0);
        assert_eq!(media_box[3].as_float().expect("h"), 72.0);

        let bytes = fragment.to_bytes().expect("serialise");
        let reparsed = PageFragment::from_pdf_bytes(&bytes, 1, &tracker).expect("reparse");
        let content = reparsed
            .document()
            .get_page_content(reparsed.page_id())
            .expect("content");
        let content = String::from_utf8_lossy(&content);
        assert!(content.contains("3 Tr"));
        assert!(content.contains("(Invoice 42) Tj"));
        assert!(content.contains("/Im0 Do"));

        drop(fragment);
        drop(reparsed);
        assert_eq!(tracker.open_handles(), 0);
    }

    #[test]
    fn multi_page_output_is_rejected() {
        let tracker = HandleTracker::new();
        let bytes = crate::test_support::blank_pdf(2, None);
        let result = PageFragment::from_pdf_bytes(&bytes, 4, &tracker);
        assert!(matches!(result, Err(ScanlayerError::Recognition { page: 4, .. })));
        assert_eq!(tracker.open_handles(), 0);
    }

    #[test]
    fn empty_spans_produce_no_text_operations() {
        let span = TextSpan {
            text: "   ".into(),
            left: 0.0,
            top: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(text_operations(&span, 0.24, 100.0).is_empty());
    }

    #[test]
    fn non_latin_text_is_replaced() {
        assert_eq!(win_ansi_bytes("Aé請"), vec![b'A', 0xE9, b'?']);
    }

    #[test]
    fn cjk_characters_are_counted_as_unencodable() {
        assert_eq!(unencodable_chars("請求書 2024"), 3);
        assert_eq!(unencodable_chars("Müller, Straße 7"), 0);
        assert_eq!(unencodable_chars("Москва"), 6);
    }
}
