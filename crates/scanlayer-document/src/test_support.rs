// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for unit tests: in-memory PDFs and scripted pipeline
// components with fault injection.

use std::sync::Mutex;

use image::{Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, dictionary};
use scanlayer_core::error::{Result, ScanlayerError};

use crate::image::bitmap::{EnhancedBitmap, RasterBitmap};
use crate::pdf::fragment::{FragmentBuilder, PageFragment, TextSpan};
use crate::pdf::metadata::encode_text_string;
use crate::pdf::source::Page;
use crate::raster::PageRasterizer;
use crate::scan::recognize::{RecognitionContext, TextRecognizer};

/// `pages` blank US Letter pages, with `/Title` and `/Author` when a title is given.
pub fn blank_pdf(pages: usize, title: Option<&str>) -> Vec<u8> {
    blank_pdf_with(pages, title, [0.0, 0.0, 612.0, 792.0], 0)
}

/// Blank pages whose MediaBox and Rotate live on the page tree root, so
/// every page inherits them.
pub fn blank_pdf_with(pages: usize, title: Option<&str>, media_box: [f32; 4], rotate: i64) -> Vec<u8> {
    let info = title.map(|title| {
        dictionary! {
            "Title" => encode_text_string(title),
            "Author" => encode_text_string("Scanner Operator"),
        }
    });
    build_pdf(pages, media_box, rotate, info)
}

/// Blank US Letter pages with `info` as the document information dictionary.
pub fn blank_pdf_with_info(pages: usize, info: Dictionary) -> Vec<u8> {
    build_pdf(pages, [0.0, 0.0, 612.0, 792.0], 0, Some(info))
}

fn build_pdf(pages: usize, media_box: [f32; 4], rotate: i64, info: Option<Dictionary>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            });
            Object::Reference(page_id)
        })
        .collect();

    let mut tree = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(pages as i64),
        "MediaBox" => media_box.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
    };
    if rotate != 0 {
        tree.set("Rotate", Object::Integer(rotate));
    }
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(info) = info {
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture PDF serialises");
    bytes
}

/// Page count of serialised PDF bytes.
pub fn page_count(bytes: &[u8]) -> usize {
    Document::load_mem(bytes).expect("output PDF parses").get_pages().len()
}

/// Rasterizer painting a light page of the right size, failing on request.
#[derive(Default)]
pub struct ScriptedRasterizer {
    /// One-based page number to fail on.
    pub fail_on: Option<usize>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedRasterizer {
    pub fn failing_on(page: usize) -> Self {
        Self {
            fail_on: Some(page),
            ..Self::default()
        }
    }

    /// One-based page numbers rendered so far, sorted.
    pub fn rendered(&self) -> Vec<usize> {
        let mut calls = self.calls.lock().expect("calls lock").clone();
        calls.sort_unstable();
        calls
    }
}

impl PageRasterizer for ScriptedRasterizer {
    fn rasterize(&self, page: Page<'_>, dpi: u32) -> Result<RasterBitmap> {
        self.calls.lock().expect("calls lock").push(page.number());
        if self.fail_on == Some(page.number()) {
            return Err(ScanlayerError::Render {
                page: page.number(),
                detail: "scripted render failure".into(),
            });
        }
        let (width, height) = page.pixel_dimensions(dpi);
        let image = RgbImage::from_fn(width, height, |x, y| {
            let ink = y % 16 < 3 && x % 10 < 7;
            if ink { Rgb([30, 30, 30]) } else { Rgb([235, 232, 228]) }
        });
        Ok(RasterBitmap::new(image, dpi))
    }
}

/// Recognizer labelling each page `page <n>`, failing on request.
#[derive(Default)]
pub struct ScriptedRecognizer {
    /// One-based page number to fail on.
    pub fail_on: Option<usize>,
}

impl ScriptedRecognizer {
    pub fn failing_on(page: usize) -> Self {
        Self { fail_on: Some(page) }
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, bitmap: &EnhancedBitmap, context: &RecognitionContext<'_>) -> Result<PageFragment> {
        let page = context.page_number;
        if self.fail_on == Some(page) {
            return Err(ScanlayerError::Recognition {
                page,
                detail: "scripted recognition failure".into(),
            });
        }
        let span = TextSpan {
            text: format!("page {page}"),
            left: 4.0,
            top: 4.0,
            width: (bitmap.width() as f32 / 2.0).max(1.0),
            height: (bitmap.height() as f32 / 10.0).max(1.0),
        };
        FragmentBuilder::new(context.dpi).build(bitmap, &[span], page, context.tracker)
    }
}
