// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement pipeline — grayscale, smoothing, exposure normalization,
// adaptive binarization, speckle removal and local contrast enhancement,
// tuned for OCR of scanned pages.

use image::{GrayImage, Luma};
use imageproc::contrast::stretch_contrast;
use imageproc::filter::{median_filter, separable_filter_equal};
use scanlayer_core::config::{AdaptiveMethod, EnhanceConfig};
use tracing::{debug, instrument};

use crate::image::bitmap::{EnhancedBitmap, RasterBitmap};
use crate::scan::clahe;

/// Runs the fixed preprocessing chain on rendered pages.
///
/// Stateless apart from its parameters: the same raster always produces the
/// same output, and the output always has the raster's dimensions.
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhanceConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// Run the full chain:
    ///
    /// 1. Convert to grayscale
    /// 2. Gaussian smoothing (3x3 by default)
    /// 3. Min-max normalization to 0..=255
    /// 4. Adaptive binarization (block 15, bias 10 by default)
    /// 5. Median denoise (3x3 by default)
    /// 6. CLAHE (clip 3.0, 8x8 tiles by default)
    #[instrument(skip_all, fields(width = bitmap.width(), height = bitmap.height()))]
    pub fn enhance(&self, bitmap: &RasterBitmap) -> EnhancedBitmap {
        let c = &self.config;
        let enhanced = ScanEnhancer::from_raster(bitmap)
            .smooth(c.blur_kernel)
            .normalize()
            .binarize(c.threshold_block, c.threshold_bias, c.threshold_method)
            .denoise(c.median_kernel)
            .equalize(c.clahe_clip_limit, c.clahe_tiles)
            .into_enhanced();
        debug!("Enhancement chain complete");
        enhanced
    }
}

/// Single-channel working image with one method per preprocessing stage.
///
/// Each stage consumes `self` and returns the transformed image, so stages
/// chain in the order they are called.
pub struct ScanEnhancer {
    image: GrayImage,
}

impl ScanEnhancer {
    /// Start from a rendered page, converting it to grayscale (luma).
    pub fn from_raster(bitmap: &RasterBitmap) -> Self {
        Self {
            image: image::imageops::grayscale(bitmap.as_rgb()),
        }
    }

    /// Start from an image that is already single-channel.
    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_enhanced(self) -> EnhancedBitmap {
        EnhancedBitmap::from_gray(self.image)
    }

    fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    // -- Smoothing -------------------------------------------------------------

    /// Gaussian blur with a `kernel` x `kernel` window.
    pub fn smooth(self, kernel: u32) -> Self {
        if self.is_empty() {
            return self;
        }
        Self {
            image: separable_filter_equal(&self.image, &gaussian_kernel(kernel)),
        }
    }

    // -- Exposure --------------------------------------------------------------

    /// Stretch the intensity range linearly so the darkest pixel becomes 0 and
    /// the brightest 255. A flat image is returned unchanged.
    pub fn normalize(self) -> Self {
        let (min, max) = self
            .image
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        if self.is_empty() || min >= max {
            return self;
        }

        Self {
            image: stretch_contrast(&self.image, min, max, u8::MIN, u8::MAX),
        }
    }

    // -- Binarization ----------------------------------------------------------

    /// Adaptive thresholding to a black-and-white image.
    ///
    /// For each pixel the threshold is the mean of its `block` x `block`
    /// neighbourhood (Gaussian-weighted or plain) minus `bias`. Pixels above
    /// the threshold become white, the rest black.
    pub fn binarize(self, block: u32, bias: i32, method: AdaptiveMethod) -> Self {
        if self.is_empty() {
            return self;
        }
        let (width, height) = self.image.dimensions();

        let local_mean: Box<dyn Fn(u32, u32) -> f64> = match method {
            AdaptiveMethod::Gaussian => {
                let blurred = separable_filter_equal(&self.image, &gaussian_kernel(block));
                Box::new(move |x, y| blurred.get_pixel(x, y).0[0] as f64)
            }
            AdaptiveMethod::Mean => {
                let integral = compute_integral_image(&self.image);
                let radius = block / 2;
                Box::new(move |x, y| region_mean(&integral, width, height, x, y, radius).round())
            }
        };

        let mut output = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let threshold = local_mean(x, y) - bias as f64;
                let value = self.image.get_pixel(x, y).0[0] as f64;
                let binary = if value > threshold { 255u8 } else { 0u8 };
                output.put_pixel(x, y, Luma([binary]));
            }
        }
        Self { image: output }
    }

    // -- Cleanup ---------------------------------------------------------------

    /// Median filter with a `kernel` x `kernel` window; removes isolated specks.
    pub fn denoise(self, kernel: u32) -> Self {
        if self.is_empty() {
            return self;
        }
        let radius = kernel / 2;
        Self {
            image: median_filter(&self.image, radius, radius),
        }
    }

    /// Contrast-limited adaptive histogram equalization.
    pub fn equalize(self, clip_limit: f32, tiles: u32) -> Self {
        Self {
            image: clahe::equalize(&self.image, clip_limit, tiles),
        }
    }
}

// -- Kernels ------------------------------------------------------------------

/// Normalized 1-D Gaussian weights for an odd window `size`.
///
/// Size 3 uses the binomial weights `[1, 2, 1] / 4`; larger windows derive
/// sigma from the window as `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) | 1;
    if size == 1 {
        return vec![1.0];
    }
    if size == 3 {
        return vec![0.25, 0.5, 0.25];
    }

    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let centre = (size / 2) as f32;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - centre;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

// -- Integral image helpers ---------------------------------------------------

/// Compute the integral (summed-area table) of a grayscale image.
///
/// `integral[y * (width+1) + x]` contains the sum of all pixel values in the
/// rectangle [0, 0) to (x, y) (exclusive on both axes). The table has
/// dimensions `(width+1) x (height+1)` with a zero-padded border.
fn compute_integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y).0[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean pixel value within a square region centred on (cx, cy) with the given
/// radius, clamped to the image, using the precomputed integral image.
fn region_mean(
    integral: &[u64],
    img_width: u32,
    img_height: u32,
    cx: u32,
    cy: u32,
    radius: u32,
) -> f64 {
    let stride = (img_width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(img_width as usize);
    let y2 = ((cy + radius + 1) as usize).min(img_height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    if area == 0.0 {
        return 128.0;
    }

    // S = I[y2][x2] - I[y1][x2] - I[y2][x1] + I[y1][x1]
    let sum = integral[y2 * stride + x2] as f64
        - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}

// -- Tests --------------------------------------------------------------------
