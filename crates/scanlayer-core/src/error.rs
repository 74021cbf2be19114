// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanlayer.

use thiserror::Error;

/// Top-level error type for all Scanlayer operations.
///
/// Page numbers carried by the per-page variants are one-based, matching what
/// a reader sees in a PDF viewer.
#[derive(Debug, Error)]
pub enum ScanlayerError {
    // -- Pipeline stage errors --
    #[error("cannot open PDF: {0}")]
    Open(String),

    #[error("page {page} could not be rasterized: {detail}")]
    Render { page: usize, detail: String },

    #[error("text recognition failed on page {page}: {detail}")]
    Recognition { page: usize, detail: String },

    #[error("text recognition on page {page} timed out after {seconds}s")]
    RecognitionTimeout { page: usize, seconds: u64 },

    #[error("output assembly failed: {0}")]
    Assembly(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("conversion cancelled after {pages_done} page(s)")]
    Cancelled { pages_done: usize },

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanlayerError {
    /// One-based page number the error is attributed to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::Render { page, .. }
            | Self::Recognition { page, .. }
            | Self::RecognitionTimeout { page, .. } => Some(*page),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanlayerError>;
