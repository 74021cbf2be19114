// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — page bitmaps before and after enhancement.

pub mod bitmap;

pub use bitmap::{EnhancedBitmap, RasterBitmap};
