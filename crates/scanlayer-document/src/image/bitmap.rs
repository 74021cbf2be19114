// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page bitmaps — the rendered page (`RasterBitmap`) and the preprocessed,
// single-channel image handed to recognition (`EnhancedBitmap`).

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use scanlayer_core::error::{Result, ScanlayerError};

/// A page rendered at a fixed resolution.
#[derive(Debug, Clone)]
pub struct RasterBitmap {
    image: RgbImage,
    dpi: u32,
}

impl RasterBitmap {
    pub fn new(image: RgbImage, dpi: u32) -> Self {
        Self { image, dpi }
    }

    /// Decode an encoded image (PNG, PPM, ...) produced by a renderer.
    pub fn from_encoded(data: &[u8], dpi: u32) -> Result<Self> {
        let decoded = image::load_from_memory(data)
            .map_err(|err| ScanlayerError::Image(format!("failed to decode page image: {err}")))?;
        Ok(Self::new(decoded.to_rgb8(), dpi))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Single-channel image with the same dimensions as the raster it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedBitmap {
    image: GrayImage,
}

impl EnhancedBitmap {
    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_gray(self) -> GrayImage {
        self.image
    }

    /// Encode as PNG, the interchange format for external engines.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_to_format(&DynamicImage::ImageLuma8(self.image.clone()), ImageFormat::Png)
    }
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| ScanlayerError::Image(format!("image encoding failed: {err}")))?;
    Ok(buffer)
}
