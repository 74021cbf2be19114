// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition seam — turns an enhanced page image into a single-page
// searchable fragment.

use scanlayer_core::config::RecognitionConfig;
use scanlayer_core::error::Result;

use crate::handle::HandleTracker;
use crate::image::bitmap::EnhancedBitmap;
use crate::pdf::fragment::PageFragment;

/// Per-call inputs besides the image itself.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionContext<'a> {
    pub config: &'a RecognitionConfig,
    /// Resolution the bitmap was rendered at; passed to the engine as a hint.
    pub dpi: u32,
    /// One-based page number, for error attribution.
    pub page_number: usize,
    pub tracker: &'a HandleTracker,
}

/// An OCR engine producing one [`PageFragment`] per page image.
///
/// The fragment must hold exactly one page, showing the image with an
/// invisible text layer positioned over the recognised words. Engines only
/// see their own page, so several pages may be recognised at once.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, bitmap: &EnhancedBitmap, context: &RecognitionContext<'_>) -> Result<PageFragment>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&self, bitmap: &EnhancedBitmap, context: &RecognitionContext<'_>) -> Result<PageFragment> {
        (**self).recognize(bitmap, context)
    }
}
