// src/record.rs
//! Raw records as delivered by a shard source.

use bytes::Bytes;
use image::DynamicImage;
use std::collections::HashMap;

/// One raw field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Undecoded object bytes (encoded image, UTF-8 caption text, ...).
    Bytes(Bytes),
    /// An already decoded image.
    Image(DynamicImage),
    /// A single caption.
    Text(String),
    /// Ordered caption candidates.
    TextList(Vec<String>),
}

/// A record: field name → raw value.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
}

/// Caption field after interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionField {
    Single(String),
    Candidates(Vec<String>),
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FieldValue {
    /// Interpret this value as a caption field.
    ///
    /// Bytes must be UTF-8. A JSON array of strings is a candidate list; any
    /// other text is one caption with surrounding whitespace trimmed. Returns
    /// `None` for images and non-UTF-8 bytes.
    pub fn as_caption(&self) -> Option<CaptionField> {
        match self {
            FieldValue::Text(s) => Some(CaptionField::Single(s.clone())),
            FieldValue::TextList(v) => Some(CaptionField::Candidates(v.clone())),
            FieldValue::Bytes(b) => {
                let text = std::str::from_utf8(b).ok()?.trim();
                if text.starts_with('[') {
                    if let Ok(list) = serde_json::from_str::<Vec<String>>(text) {
                        return Some(CaptionField::Candidates(list));
                    }
                }
                Some(CaptionField::Single(text.to_string()))
            }
            FieldValue::Image(_) => None,
        }
    }
}
