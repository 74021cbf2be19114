// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanlayer OCR pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix added to the source file name when naming the searchable output.
pub const OUTPUT_FILENAME_PREFIX: &str = "OCR_";

/// Unique identifier for one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of one document conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Idle,
    /// Decoding the input and creating the empty output document.
    Opening,
    /// Rasterize, enhance, recognize and append, one page at a time.
    PerPage,
    /// Copying metadata and serializing the output.
    Finalizing,
    /// Terminal: output bytes returned, all handles closed.
    Done,
    /// Terminal: error returned, all handles closed.
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Snapshot of conversion progress handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Pages started so far (one-based index of the current page).
    pub pages_done: usize,
    pub pages_total: usize,
    /// Human-readable status line.
    pub message: String,
}

impl ProgressUpdate {
    /// Progress for the page at one-based position `page` of `total`.
    pub fn page(page: usize, total: usize) -> Self {
        Self {
            pages_done: page,
            pages_total: total,
            message: format!("Processing page {page}/{total}"),
        }
    }

    /// Completion ratio in `0.0..=1.0`. An empty document counts as complete.
    pub fn fraction(&self) -> f32 {
        if self.pages_total == 0 {
            1.0
        } else {
            self.pages_done as f32 / self.pages_total as f32
        }
    }
}

/// Immutable outcome of a successful conversion.
///
/// The presentation layer owns any caching of this value; the pipeline keeps
/// nothing between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: RunId,
    /// Serialized searchable PDF.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Name of the uploaded/input file, as given by the caller.
    pub source_filename: String,
    /// Lowercase hex SHA-256 of the input bytes.
    pub source_sha256: String,
    pub page_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Download name for the output: `OCR_<original name>`.
    pub fn output_filename(&self) -> String {
        output_filename_for(&self.source_filename)
    }
}

/// Derive the output file name for `source_filename`.
///
/// Only the final path component is kept, so a full path yields a bare name.
pub fn output_filename_for(source_filename: &str) -> String {
    let name = source_filename
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("document.pdf");
    format!("{OUTPUT_FILENAME_PREFIX}{name}")
}
