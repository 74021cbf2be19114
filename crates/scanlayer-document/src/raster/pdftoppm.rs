// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterizer backed by poppler's `pdftoppm`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use scanlayer_core::error::{Result, ScanlayerError};
use tempfile::TempDir;
use tracing::{debug, instrument};

use crate::image::bitmap::RasterBitmap;
use crate::pdf::source::Page;
use crate::raster::PageRasterizer;

const NOT_FOUND_HINT: &str = "pdftoppm not found (install poppler-utils)";

/// Renders pages by running `pdftoppm` against the source's spooled file.
///
/// Each call renders exactly one page to PNG in its own temporary directory,
/// which is removed when the call returns.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Argument list for rendering one-based page `number` of `pdf` at `dpi`
    /// into `<prefix>.png`.
    fn arguments(pdf: &Path, number: usize, dpi: u32, prefix: &Path) -> Vec<String> {
        let number = number.to_string();
        vec![
            "-r".into(),
            dpi.to_string(),
            "-f".into(),
            number.clone(),
            "-l".into(),
            number,
            "-singlefile".into(),
            "-png".into(),
            pdf.display().to_string(),
            prefix.display().to_string(),
        ]
    }
}

impl PageRasterizer for PdftoppmRasterizer {
    #[instrument(skip_all, fields(page = page.number(), dpi = dpi))]
    fn rasterize(&self, page: Page<'_>, dpi: u32) -> Result<RasterBitmap> {
        let number = page.number();
        let render_error = |detail: String| ScanlayerError::Render { page: number, detail };

        let pdf = page.source().spool_path()?;
        let workdir = TempDir::new()?;
        let prefix = workdir.path().join("page");

        let output = Command::new(&self.binary)
            .args(Self::arguments(pdf, number, dpi, &prefix))
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => render_error(NOT_FOUND_HINT.to_string()),
                _ => render_error(format!("failed to run {}: {err}", self.binary.display())),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(render_error(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let png_path = prefix.with_extension("png");
        let png = std::fs::read(&png_path)
            .map_err(|err| render_error(format!("no image generated: {err}")))?;
        let bitmap = RasterBitmap::from_encoded(&png, dpi)
            .map_err(|err| render_error(err.to_string()))?;

        debug!(width = bitmap.width(), height = bitmap.height(), "Page rasterized");
        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleTracker;
    use crate::pdf::source::SourceDocument;
    use crate::test_support::blank_pdf;

    #[test]
    fn arguments_render_a_single_page() {
        let args = PdftoppmRasterizer::arguments(Path::new("/tmp/in.pdf"), 3, 150, Path::new("/tmp/out/page"));
        assert_eq!(
            args,
            vec!["-r", "150", "-f", "3", "-l", "3", "-singlefile", "-png", "/tmp/in.pdf", "/tmp/out/page"]
        );
    }

    #[test]
    fn missing_binary_is_a_render_error_for_that_page() {
        let tracker = HandleTracker::new();
        let source = SourceDocument::open(&blank_pdf(2, None), &tracker).expect("open");
        let rasterizer = PdftoppmRasterizer::new("/nonexistent/bin/pdftoppm");

        let err = rasterizer
            .rasterize(source.page(1).expect("page"), 72)
            .expect_err("binary is missing");
        match err {
            ScanlayerError::Render { page, detail } => {
                assert_eq!(page, 2);
                assert!(detail.contains("not found"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
