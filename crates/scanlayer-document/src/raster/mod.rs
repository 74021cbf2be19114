// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization — turning one page of a source PDF into pixels.

pub mod pdftoppm;

pub use pdftoppm::PdftoppmRasterizer;

use scanlayer_core::error::Result;

use crate::image::bitmap::RasterBitmap;
use crate::pdf::source::Page;

/// Renders a single page at a given resolution.
///
/// Output pixel size should match [`Page::pixel_dimensions`] for `dpi`
/// (scale `dpi / 72` on both axes). Implementations only read the page they
/// are given, so pages may be rendered concurrently.
pub trait PageRasterizer: Send + Sync {
    /// Render `page`. Failures are reported as
    /// [`ScanlayerError::Render`](scanlayer_core::ScanlayerError::Render)
    /// carrying the page's one-based number.
    fn rasterize(&self, page: Page<'_>, dpi: u32) -> Result<RasterBitmap>;
}

impl<T: PageRasterizer + ?Sized> PageRasterizer for Box<T> {
    fn rasterize(&self, page: Page<'_>, dpi: u32) -> Result<RasterBitmap> {
        (**self).rasterize(page, dpi)
    }
}
