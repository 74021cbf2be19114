// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan processing — image enhancement for OCR and the text recognizers that
// turn enhanced pages into searchable fragments.

pub mod clahe;
pub mod enhance;
pub mod recognize;
pub mod tesseract;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use enhance::{ImageEnhancer, ScanEnhancer};
pub use recognize::{RecognitionContext, TextRecognizer};
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "ocr")]
pub use ocr::{OcrsModels, OcrsRecognizer};
