// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source document — the decoded input PDF, its page list and metadata.

use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use lopdf::{Document, Object, ObjectId};
use scanlayer_core::error::{Result, ScanlayerError};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::handle::{HandleGuard, HandleKind, HandleTracker};
use crate::pdf::metadata::DocumentMetadata;

/// US Letter in points, used when a page tree carries no `/MediaBox` at all.
const FALLBACK_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Exclusively owned handle over the input PDF.
///
/// Holds the decoded object graph, the original bytes (for renderers that
/// need a file), and a slot in the handle tracker. Dropping the document
/// closes it: the tracker slot and any spooled temporary file are released.
pub struct SourceDocument {
    document: Document,
    bytes: Vec<u8>,
    page_ids: Vec<ObjectId>,
    metadata: DocumentMetadata,
    spool: OnceLock<NamedTempFile>,
    _handle: HandleGuard,
}

impl SourceDocument {
    /// Decode `data` as a PDF.
    ///
    /// Fails with [`ScanlayerError::Open`] when the bytes are not a decodable,
    /// unencrypted PDF.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn open(data: &[u8], tracker: &HandleTracker) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| ScanlayerError::Open(format!("failed to load PDF from memory: {err}")))?;

        if document.is_encrypted() {
            return Err(ScanlayerError::Open("encrypted PDFs are not supported".into()));
        }

        // lopdf keys pages by one-based number in page-tree order.
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        let metadata = DocumentMetadata::from_document(&document);

        info!(pages = page_ids.len(), metadata_entries = metadata.len(), "Source PDF opened");

        Ok(Self {
            document,
            bytes: data.to_vec(),
            page_ids,
            metadata,
            spool: OnceLock::new(),
            _handle: tracker.acquire(HandleKind::Source),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// The original, undecoded input bytes.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrow the decoded object graph.
    pub fn as_lopdf(&self) -> &Document {
        &self.document
    }

    /// Page at zero-based `index`.
    pub fn page(&self, index: usize) -> Result<Page<'_>> {
        let object_id = *self.page_ids.get(index).ok_or_else(|| ScanlayerError::Render {
            page: index + 1,
            detail: format!("page out of range (document has {} pages)", self.page_count()),
        })?;

        let media_box = self.inherited(object_id, b"MediaBox").and_then(parse_rect);
        let crop_box = self.inherited(object_id, b"CropBox").and_then(parse_rect);
        let rotation = self
            .inherited(object_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360) as u16;

        Ok(Page {
            source: self,
            index,
            object_id,
            media_box: crop_box.or(media_box).unwrap_or(FALLBACK_MEDIA_BOX),
            rotation,
        })
    }

    /// All pages in document order.
    pub fn pages(&self) -> impl Iterator<Item = Result<Page<'_>>> + '_ {
        (0..self.page_count()).map(move |index| self.page(index))
    }

    /// Path of a temporary file holding the input bytes, written on first use.
    ///
    /// The file lives as long as this document.
    pub fn spool_path(&self) -> Result<&Path> {
        if let Some(file) = self.spool.get() {
            return Ok(file.path());
        }

        let mut file = NamedTempFile::new()?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        debug!(path = %file.path().display(), "Source PDF spooled to disk");

        // A concurrent caller may have won the race; its file is kept and ours dropped.
        let _ = self.spool.set(file);
        self.spool
            .get()
            .map(NamedTempFile::path)
            .ok_or_else(|| ScanlayerError::Io(std::io::Error::other("spool file vanished")))
    }

    /// Release the document. Equivalent to dropping it, but logged.
    pub fn close(self) {
        debug!(pages = self.page_count(), "Source PDF closed");
    }

    /// Look up an inheritable page attribute, walking `/Parent` links.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.document.get_dictionary(page_id).ok();
        // Bounded walk; malformed trees can contain cycles.
        for _ in 0..64 {
            let dict = current?;
            if let Ok(value) = dict.get(key) {
                return self.document.dereference(value).ok().map(|(_, obj)| obj);
            }
            current = dict
                .get(b"Parent")
                .ok()
                .and_then(|parent| parent.as_reference().ok())
                .and_then(|id| self.document.get_dictionary(id).ok());
        }
        None
    }
}

/// Read-only view of one page of a [`SourceDocument`].
#[derive(Clone, Copy)]
pub struct Page<'a> {
    source: &'a SourceDocument,
    index: usize,
    object_id: ObjectId,
    media_box: [f32; 4],
    rotation: u16,
}

impl<'a> Page<'a> {
    /// Zero-based position in the document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based page number, as shown to readers.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn source(&self) -> &'a SourceDocument {
        self.source
    }

    /// Visible page rectangle `[llx, lly, urx, ury]` in points.
    pub fn media_box(&self) -> [f32; 4] {
        self.media_box
    }

    /// Clockwise display rotation in degrees (0, 90, 180 or 270).
    pub fn rotation(&self) -> u16 {
        self.rotation
    }

    /// Displayed page size in points, rotation applied.
    pub fn size_points(&self) -> (f32, f32) {
        let width = (self.media_box[2] - self.media_box[0]).abs();
        let height = (self.media_box[3] - self.media_box[1]).abs();
        if self.rotation % 180 == 90 {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Pixel size of this page rendered at `dpi` (scale `dpi / 72`).
    pub fn pixel_dimensions(&self, dpi: u32) -> (u32, u32) {
        let dpi = dpi as f32;
        let (width, height) = self.size_points();
        (
            ((width * dpi / 72.0).ceil() as u32).max(1),
            ((height * dpi / 72.0).ceil() as u32).max(1),
        )
    }
}

impl std::fmt::Debug for Page<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("object_id", &self.object_id)
            .field("media_box", &self.media_box)
            .field("rotation", &self.rotation)
            .finish()
    }
}

fn parse_rect(object: &Object) -> Option<[f32; 4]> {
    let values = object.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut rect = [0.0f32; 4];
    for (slot, value) in rect.iter_mut().zip(values) {
        *slot = match value {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r,
            _ => return None,
        };
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blank_pdf, blank_pdf_with};

    #[test]
    fn open_reads_pages_and_title() {
        let tracker = HandleTracker::new();
        let bytes = blank_pdf(3, Some("Minutes"));
        let source = SourceDocument::open(&bytes, &tracker).expect("open");

        assert_eq!(source.page_count(), 3);
        assert_eq!(source.metadata().title(), Some("Minutes"));
        assert_eq!(tracker.open_handles(), 1);

        source.close();
        assert_eq!(tracker.open_handles(), 0);
    }

    #[test]
    fn garbage_is_an_open_error() {
        let tracker = HandleTracker::new();
        let result = SourceDocument::open(b"definitely not a pdf", &tracker);
        assert!(matches!(result, Err(ScanlayerError::Open(_))));
        assert_eq!(tracker.open_handles(), 0);
    }

    #[test]
    fn pixel_dimensions_scale_linearly_with_dpi() {
        let tracker = HandleTracker::new();
        let bytes = blank_pdf(1, None);
        let source = SourceDocument::open(&bytes, &tracker).expect("open");
        let page = source.page(0).expect("page");

        // Fixture pages are 612x792 pt.
        assert_eq!(page.pixel_dimensions(72), (612, 792));
        assert_eq!(page.pixel_dimensions(144), (1224, 1584));
        assert_eq!(page.pixel_dimensions(300), (2550, 3300));
    }

    #[test]
    fn media_box_and_rotation_are_inherited() {
        let tracker = HandleTracker::new();
        let bytes = blank_pdf_with(1, None, [0.0, 0.0, 200.0, 100.0], 90);
        let source = SourceDocument::open(&bytes, &tracker).expect("open");
        let page = source.page(0).expect("page");

        assert_eq!(page.media_box(), [0.0, 0.0, 200.0, 100.0]);
        assert_eq!(page.rotation(), 90);
        assert_eq!(page.size_points(), (100.0, 200.0));
    }

    #[test]
    fn out_of_range_page_is_a_render_error() {
        let tracker = HandleTracker::new();
        let source = SourceDocument::open(&blank_pdf(1, None), &tracker).expect("open");
        assert!(matches!(source.page(1), Err(ScanlayerError::Render { page: 2, .. })));
    }

    #[test]
    fn spool_file_holds_input_and_disappears_on_close() {
        let tracker = HandleTracker::new();
        let bytes = blank_pdf(1, None);
        let source = SourceDocument::open(&bytes, &tracker).expect("open");

        let path = source.spool_path().expect("spool").to_path_buf();
        assert_eq!(std::fs::read(&path).expect("read spool"), bytes);
        // Second call reuses the same file.
        assert_eq!(source.spool_path().expect("spool again"), path.as_path());

        source.close();
        assert!(!path.exists());
    }
}
