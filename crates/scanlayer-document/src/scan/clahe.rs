// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-limited adaptive histogram equalization (CLAHE).
//
// The image is split into a grid of tiles. Each tile gets its own equalization
// lookup table, built from a histogram whose bins are clipped at a limit and
// whose excess is spread evenly over all bins. Every output pixel blends the
// tables of the four nearest tile centres bilinearly, so tile borders do not
// show. When the image does not divide evenly into tiles, the histograms see
// a mirrored (reflect-101) extension of the edge rows and columns.

use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Equalize `gray` with `tiles` x `tiles` tiles and the given clip limit.
///
/// `clip_limit` is relative: a bin may hold at most
/// `clip_limit * tile_area / 256` samples (never less than one).
pub fn equalize(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles = tiles.max(1);

    let tile_w = width.div_ceil(tiles);
    let tile_h = height.div_ceil(tiles);
    let tile_area = (tile_w * tile_h) as usize;
    let limit = ((clip_limit * tile_area as f32 / BINS as f32) as usize).max(1);

    let mut luts = vec![[0u8; BINS]; (tiles * tiles) as usize];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut histogram = [0usize; BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y, height);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x, width);
                    histogram[gray.get_pixel(sx, sy).0[0] as usize] += 1;
                }
            }
            clip_histogram(&mut histogram, limit);
            luts[(ty * tiles + tx) as usize] = build_lut(&histogram, tile_area);
        }
    }

    let inv_tile_w = 1.0 / tile_w as f32;
    let inv_tile_h = 1.0 / tile_h as f32;
    let last = tiles as i64 - 1;

    let mut output = GrayImage::new(width, height);
    for y in 0..height {
        let (ty1, ty2, ya) = neighbours(y as f32 * inv_tile_h - 0.5, last);
        for x in 0..width {
            let (tx1, tx2, xa) = neighbours(x as f32 * inv_tile_w - 0.5, last);
            let value = gray.get_pixel(x, y).0[0] as usize;

            let lut = |ty: usize, tx: usize| luts[ty * tiles as usize + tx][value] as f32;
            let top = lut(ty1, tx1) * (1.0 - xa) + lut(ty1, tx2) * xa;
            let bottom = lut(ty2, tx1) * (1.0 - xa) + lut(ty2, tx2) * xa;
            let blended = top * (1.0 - ya) + bottom * ya;

            output.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    output
}

/// Clip every bin at `limit` and redistribute the excess: an equal share to
/// every bin, then the remainder one sample at a time at a regular stride.
fn clip_histogram(histogram: &mut [usize; BINS], limit: usize) {
    let mut excess = 0usize;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let batch = excess / BINS;
    let mut residual = excess - batch * BINS;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut index = 0;
        while index < BINS && residual > 0 {
            histogram[index] += 1;
            residual -= 1;
            index += step;
        }
    }
}

/// Cumulative distribution scaled to `0..=255`.
fn build_lut(histogram: &[usize; BINS], tile_area: usize) -> [u8; BINS] {
    let scale = 255.0 / tile_area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0usize;
    for (slot, &count) in lut.iter_mut().zip(histogram.iter()) {
        sum += count;
        *slot = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and the blend weight toward the second one.
fn neighbours(position: f32, last: i64) -> (usize, usize, f32) {
    let first = position.floor();
    let weight = position - first;
    let first = first as i64;
    let lo = first.clamp(0, last) as usize;
    let hi = (first + 1).clamp(0, last) as usize;
    (lo, hi, weight)
}

/// Mirror `index` into `0..len` without repeating the edge sample.
fn reflect_101(index: u32, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let wrapped = index % period;
    if wrapped >= len { period - wrapped } else { wrapped }
}
