// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — source documents, page fragments, metadata and output assembly.

pub mod assembler;
pub mod fragment;
pub mod metadata;
pub mod source;

pub use assembler::DocumentAssembler;
pub use fragment::{FragmentBuilder, PageFragment, TextSpan};
pub use metadata::{DocumentMetadata, MetadataValue};
pub use source::{Page, SourceDocument};
