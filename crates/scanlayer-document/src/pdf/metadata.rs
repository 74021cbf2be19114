// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document information dictionary (`/Info`) — decoding from a source PDF and
// writing onto the output PDF.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, StringFormat};
use tracing::{debug, warn};

/// A PDF text string as stored in the file, plus its decoded form.
///
/// The stored bytes are written back unchanged, so values read from a source
/// document reach the output byte for byte whatever their encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextString {
    text: String,
    raw: Vec<u8>,
    format: StringFormat,
}

impl TextString {
    /// Encode `text`: a literal for ASCII, otherwise UTF-16BE with a BOM.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let (raw, format) = encode_text_bytes(&text);
        Self { text, raw, format }
    }

    /// Keep `raw` as found in a document.
    pub fn from_raw(raw: &[u8], format: StringFormat) -> Self {
        Self {
            text: decode_text_string(raw),
            raw: raw.to_vec(),
            format,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    fn to_object(&self) -> Object {
        Object::String(self.raw.clone(), self.format)
    }
}

/// One value of the document information dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// PDF text string (Title, Author, dates, ...).
    Text(TextString),
    /// PDF name, e.g. `/Trapped /True`.
    Name(String),
    Integer(i64),
    Real(f32),
    Boolean(bool),
}

impl MetadataValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextString::new(text))
    }

    /// Text content, for `Text` and `Name` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::Name(s) => Some(s),
            _ => None,
        }
    }

    fn from_object(object: &Object) -> Option<Self> {
        match object {
            Object::String(bytes, format) => Some(Self::Text(TextString::from_raw(bytes, *format))),
            Object::Name(name) => Some(Self::Name(String::from_utf8_lossy(name).into_owned())),
            Object::Integer(value) => Some(Self::Integer(*value)),
            Object::Real(value) => Some(Self::Real(*value)),
            Object::Boolean(value) => Some(Self::Boolean(*value)),
            _ => None,
        }
    }

    fn to_object(&self) -> Object {
        match self {
            Self::Text(text) => text.to_object(),
            Self::Name(name) => Object::Name(name.as_bytes().to_vec()),
            Self::Integer(value) => Object::Integer(*value),
            Self::Real(value) => Object::Real(*value),
            Self::Boolean(value) => Object::Boolean(*value),
        }
    }
}

/// Complete key/value mapping of a document's `/Info` dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    entries: BTreeMap<String, MetadataValue>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `/Info` dictionary referenced from the trailer.
    ///
    /// A document without one yields empty metadata. Entries whose values are
    /// not scalars (arrays, dictionaries) are skipped with a warning.
    pub fn from_document(document: &Document) -> Self {
        let mut metadata = Self::new();

        let info = match document.trailer.get(b"Info") {
            Ok(object) => match document.dereference(object) {
                Ok((_, Object::Dictionary(dict))) => dict,
                _ => {
                    warn!("trailer /Info is not a dictionary; treating metadata as empty");
                    return metadata;
                }
            },
            Err(_) => return metadata,
        };

        for (key, value) in info.iter() {
            let key = String::from_utf8_lossy(key).into_owned();
            let resolved = match document.dereference(value) {
                Ok((_, object)) => object,
                Err(err) => {
                    warn!(key, %err, "cannot resolve metadata value; skipping");
                    continue;
                }
            };
            match MetadataValue::from_object(resolved) {
                Some(value) => {
                    metadata.entries.insert(key, value);
                }
                None => warn!(key, "non-scalar metadata value; skipping"),
            }
        }

        debug!(entries = metadata.len(), "document metadata read");
        metadata
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    /// Shortcut for the `/Title` text.
    pub fn title(&self) -> Option<&str> {
        self.get("Title").and_then(MetadataValue::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build an `/Info` dictionary holding every entry.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        for (key, value) in &self.entries {
            dict.set(key.as_bytes().to_vec(), value.to_object());
        }
        dict
    }
}

/// Decode a PDF text string: UTF-16BE or UTF-8 with a byte-order mark,
/// otherwise PDFDocEncoding.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| pdf_doc_char(b)).collect()
}

/// PDFDocEncoding agrees with Latin-1 except for a few diacritics below
/// 0x20, the typographic block 0x80..=0xA0, and the unassigned 0x9F/0xAD.
fn pdf_doc_char(byte: u8) -> char {
    const LOW: [char; 8] = ['\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}'];
    const HIGH: [char; 33] = [
        '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
        '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
        '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
        '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
        '\u{20AC}',
    ];
    match byte {
        0x18..=0x1F => LOW[(byte - 0x18) as usize],
        0x80..=0xA0 => HIGH[(byte - 0x80) as usize],
        0xAD => '\u{FFFD}',
        _ => byte as char,
    }
}

/// Encode `text` as a PDF text string: a literal for ASCII, otherwise
/// UTF-16BE with a byte-order mark.
pub fn encode_text_string(text: &str) -> Object {
    let (bytes, format) = encode_text_bytes(text);
    Object::String(bytes, format)
}

fn encode_text_bytes(text: &str) -> (Vec<u8>, StringFormat) {
    if text.is_ascii() {
        return (text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    (bytes, StringFormat::Hexadecimal)
}
