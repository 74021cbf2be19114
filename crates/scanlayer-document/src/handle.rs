// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Open-handle accounting for document resources.
//
// Every `SourceDocument`, `DocumentAssembler` and `PageFragment` holds a
// `HandleGuard`. The guard increments the tracker when the handle is opened
// and decrements it when the handle is dropped, so a tracker that reads zero
// after a pipeline call proves nothing was leaked on that path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

/// Kind of document resource a guard stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Source,
    Output,
    Fragment,
}

/// Shared counter of currently open document handles.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    open: Arc<AtomicUsize>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles opened through this tracker and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Register a newly opened handle.
    pub fn acquire(&self, kind: HandleKind) -> HandleGuard {
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(?kind, now_open, "document handle opened");
        HandleGuard {
            open: Arc::clone(&self.open),
            kind,
        }
    }
}

/// Releases its slot in the tracker on drop.
#[derive(Debug)]
pub struct HandleGuard {
    open: Arc<AtomicUsize>,
    kind: HandleKind,
}

impl HandleGuard {
    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let before = self.open.fetch_sub(1, Ordering::SeqCst);
        trace!(kind = ?self.kind, now_open = before.saturating_sub(1), "document handle closed");
    }
}
