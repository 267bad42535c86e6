//! Data types for documents, chunks, and search results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value attached to a document or chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer, such as a page number.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string, such as a source path.
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Key-value metadata. Ordered so serialized records are stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A source document containing text content and metadata.
///
/// Documents are produced by the loader and are not modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier derived from the document's source.
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Metadata such as `source` and `page`.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous slice of a [`Document`]'s content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub content: String,
    /// Metadata copied unchanged from the parent document.
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its parent document.
    pub index: usize,
}

/// A stored record returned from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The record id.
    pub id: String,
    /// The stored chunk text.
    pub text: String,
    /// The stored chunk metadata.
    pub metadata: Metadata,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
