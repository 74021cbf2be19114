// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output assembly — collects recognised page fragments into one document and
// serialises it with the source metadata.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, info, instrument, warn};

use crate::handle::{HandleGuard, HandleKind, HandleTracker};
use crate::pdf::fragment::PageFragment;
use crate::pdf::metadata::DocumentMetadata;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Upper bound on `/Parent` hops, so malformed trees cannot loop forever.
const MAX_TREE_DEPTH: usize = 64;

/// Builds the output document one page at a time.
///
/// Pages are appended strictly in call order. [`finalize`](Self::finalize)
/// may be called once; afterwards the assembler rejects all further work.
pub struct DocumentAssembler {
    document: Document,
    pages_id: ObjectId,
    finalized: bool,
    _handle: HandleGuard,
}

impl DocumentAssembler {
    pub fn new(tracker: &HandleTracker) -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => Object::Integer(0),
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            pages_id,
            finalized: false,
            _handle: tracker.acquire(HandleKind::Output),
        }
    }

    /// Number of pages appended so far.
    pub fn page_count(&self) -> usize {
        self.document
            .get_dictionary(self.pages_id)
            .ok()
            .and_then(|pages| pages.get(b"Kids").ok())
            .and_then(|kids| kids.as_array().ok())
            .map_or(0, Vec::len)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Copy the fragment's page, and every object it references, to the end of
    /// the output. The fragment is consumed and closed.
    #[instrument(skip_all, fields(position = self.page_count() + 1))]
    pub fn append(&mut self, fragment: PageFragment) -> Result<()> {
        if self.finalized {
            return Err(ScanlayerError::Assembly("cannot append to a finalized document".into()));
        }

        let source = fragment.document();
        let page_id = fragment.page_id();
        let mut page = source
            .get_dictionary(page_id)
            .map_err(|err| ScanlayerError::Assembly(format!("fragment page {page_id:?} unreadable: {err}")))?
            .clone();

        for key in INHERITABLE {
            if page.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(source, page_id, key) {
                page.set(key.to_vec(), value.clone());
            }
        }

        let mut copier = ObjectCopier::new(source);
        let mut copied = copier.copy_dictionary(&mut self.document, &page);
        copied.set("Parent", Object::Reference(self.pages_id));
        let new_page_id = self.document.add_object(copied);

        let pages = self
            .document
            .get_dictionary_mut(self.pages_id)
            .map_err(|err| ScanlayerError::Assembly(format!("output page tree missing: {err}")))?;
        match pages.get_mut(b"Kids") {
            Ok(Object::Array(kids)) => kids.push(Object::Reference(new_page_id)),
            _ => return Err(ScanlayerError::Assembly("output /Kids is not an array".into())),
        }
        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages.set("Count", Object::Integer(count + 1));

        debug!(objects_copied = copier.copied(), "Fragment page appended");
        Ok(())
    }

    /// Write `metadata` as the output `/Info` dictionary and serialise.
    ///
    /// Unreferenced objects are pruned, empty streams removed, objects
    /// renumbered and streams compressed before saving.
    #[instrument(skip_all, fields(pages = self.page_count(), metadata_entries = metadata.len()))]
    pub fn finalize(&mut self, metadata: &DocumentMetadata) -> Result<Vec<u8>> {
        if self.finalized {
            return Err(ScanlayerError::Assembly("document already finalized".into()));
        }
        self.finalized = true;

        let info_id = self.document.add_object(metadata.to_dictionary());
        self.document.trailer.set("Info", Object::Reference(info_id));

        let pruned = self.document.prune_objects();
        let emptied = self.document.delete_zero_length_streams();
        self.document.renumber_objects();
        self.document.compress();
        debug!(pruned = pruned.len(), emptied = emptied.len(), "Output cleaned up");

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| ScanlayerError::Assembly(format!("failed to serialise output: {err}")))?;

        info!(bytes_len = output.len(), "Output document finalized");
        Ok(output)
    }

    /// Release the output document. Equivalent to dropping it, but logged.
    pub fn close(self) {
        debug!(pages = self.page_count(), finalized = self.finalized, "Output document closed");
    }
}

/// Find `key` on the nearest ancestor of `page_id` that defines it.
fn inherited_attribute<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = document
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Parent").ok())
        .and_then(|parent| parent.as_reference().ok());

    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(current?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        current = node.get(b"Parent").ok().and_then(|parent| parent.as_reference().ok());
    }
    None
}

/// Deep copy of objects from one document into another.
///
/// Each referenced source object is copied once, so shared resources stay
/// shared and reference cycles terminate. `/Parent` links are dropped; the
/// caller re-parents the copied page.
struct ObjectCopier<'a> {
    source: &'a Document,
    mapping: BTreeMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            mapping: BTreeMap::new(),
        }
    }

    fn copied(&self) -> usize {
        self.mapping.len()
    }

    fn copy_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if key == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.copy_object(target, value));
        }
        copy
    }

    fn copy_object(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(target, dict)),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.copy_object(target, item)).collect()),
            Object::Stream(stream) => {
                let dict = self.copy_dictionary(target, &stream.dict);
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            Object::Reference(id) => self.copy_reference(target, *id),
            other => other.clone(),
        }
    }

    fn copy_reference(&mut self, target: &mut Document, id: ObjectId) -> Object {
        if let Some(mapped) = self.mapping.get(&id) {
            return Object::Reference(*mapped);
        }

        let referenced = match self.source.get_object(id) {
            Ok(object) => object,
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                return Object::Null;
            }
        };

        // Reserve the target id before descending so cycles resolve to it.
        let new_id = target.new_object_id();
        self.mapping.insert(id, new_id);
        let copy = self.copy_object(target, referenced);
        target.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }
}
