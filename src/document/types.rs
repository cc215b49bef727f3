//! Type definitions for documents.
//!
//! # Input vs Stored
//!
//! ```text
//! NewDocument (caller input: optional id, optional embedding)
//!     ↓ IndexService::add_documents()
//! Document (stored: id and embedding always resolved)
//!     ↓ IndexService::similarity_search()
//! Document with score set
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, Embedding};

/// Metadata attached to a document, ordered by key.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// MetadataValue
// ============================================================================

/// A metadata value.
///
/// Closed set of JSON-like values so documents round-trip through the
/// binary snapshot format unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Explicit absence of a value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Returns the string value, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Document
// ============================================================================

/// A stored document.
///
/// `score` is only populated on search results; stored documents always
/// have `score: None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier within the index.
    pub id: DocumentId,

    /// Text content.
    pub text: String,

    /// Embedding vector. Always present for documents added through
    /// `IndexService`.
    pub embedding: Option<Embedding>,

    /// Free-form metadata.
    pub metadata: Metadata,

    /// Similarity score, set by search (higher is closer).
    pub score: Option<f32>,
}

impl Document {
    /// Returns a copy of this document carrying a search score.
    pub(crate) fn scored(&self, score: f32) -> Self {
        Self {
            score: Some(score),
            ..self.clone()
        }
    }
}

// ============================================================================
// NewDocument
// ============================================================================

/// Input for adding a document.
///
/// Omit `id` to have one generated. Omit `embedding` to have the configured
/// [`EmbeddingService`](crate::embedding::EmbeddingService) compute it.
///
/// # Example
/// ```rust
/// use pulseindex::NewDocument;
///
/// let doc = NewDocument::new("Rust ownership rules")
///     .with_id("doc-1")
///     .with_embedding(vec![0.1, 0.2, 0.3])
///     .with_metadata("source", "book");
/// assert_eq!(doc.id.unwrap().as_str(), "doc-1");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewDocument {
    /// Caller-chosen ID. Generated (UUID v7) when `None`.
    pub id: Option<DocumentId>,

    /// Text content (required, non-empty).
    pub text: String,

    /// Pre-computed embedding.
    pub embedding: Option<Embedding>,

    /// Free-form metadata.
    pub metadata: Metadata,
}

impl NewDocument {
    /// Creates a document input with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Sets the document ID.
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets a pre-computed embedding.
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
