// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the scan enhancement chain in scanlayer-document.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};

use scanlayer_core::config::{AdaptiveMethod, EnhanceConfig};
use scanlayer_document::{ImageEnhancer, RasterBitmap};

/// A 612x792 page (US Letter at 72 dpi) with an illumination gradient and
/// rows of dark "text" strokes.
fn synthetic_page() -> RasterBitmap {
    let (width, height) = (612u32, 792u32);
    let image = RgbImage::from_fn(width, height, |x, y| {
        let paper = 150 + (x * 90 / width) as u8;
        let ink = y % 18 < 4 && x % 11 < 8 && (40..572).contains(&x);
        let v = if ink { paper - 110 } else { paper };
        Rgb([v, v, v])
    });
    RasterBitmap::new(image, 72)
}

fn bench_enhance(c: &mut Criterion) {
    let page = synthetic_page();

    let gaussian = ImageEnhancer::default();
    c.bench_function("enhance gaussian threshold (612x792)", |b| {
        b.iter(|| black_box(gaussian.enhance(black_box(&page))));
    });

    let mean = ImageEnhancer::new(EnhanceConfig {
        threshold_method: AdaptiveMethod::Mean,
        ..EnhanceConfig::default()
    });
    c.bench_function("enhance mean threshold (612x792)", |b| {
        b.iter(|| black_box(mean.enhance(black_box(&page))));
    });
}

criterion_group!(benches, bench_enhance);
criterion_main!(benches);
