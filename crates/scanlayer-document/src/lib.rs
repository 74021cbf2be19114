// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanlayer-document — Turns scanned PDFs into searchable PDFs.
//
// Each page is rasterized, cleaned up for OCR (grayscale, smoothing,
// normalization, adaptive binarization, denoising, CLAHE), recognised into a
// single-page fragment carrying an invisible text layer, and copied into an
// output document that keeps the source page order and metadata.

pub mod handle;
pub mod image;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod scan;

#[cfg(test)]
mod test_support;

// Re-export the primary types so callers can use `scanlayer_document::Pipeline` etc.
pub use handle::HandleTracker;
pub use image::bitmap::{EnhancedBitmap, RasterBitmap};
pub use pdf::assembler::DocumentAssembler;
pub use pdf::fragment::{FragmentBuilder, PageFragment, TextSpan};
pub use pdf::metadata::DocumentMetadata;
pub use pdf::source::{Page, SourceDocument};
pub use pipeline::{CancellationToken, Pipeline};
pub use raster::{PageRasterizer, PdftoppmRasterizer};
pub use scan::enhance::ImageEnhancer;
pub use scan::recognize::{RecognitionContext, TextRecognizer};
pub use scan::tesseract::TesseractRecognizer;

#[cfg(feature = "ocr")]
pub use scan::ocr::{OcrsModels, OcrsRecognizer};
