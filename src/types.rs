//! Core type definitions for PulseIndex identifiers and timestamps.
//!
//! Document IDs are caller-chosen strings. When a caller doesn't supply
//! one, PulseIndex generates a UUID v7 string so generated IDs sort by
//! creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Document identifier, unique within one index.
///
/// # Example
/// ```
/// use pulseindex::DocumentId;
///
/// let id = DocumentId::new("doc-1");
/// assert_eq!(id.as_str(), "doc-1");
///
/// let generated = DocumentId::generate();
/// assert!(!generated.as_str().is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Wraps a caller-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered identifier (UUID v7).
    #[inline]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unix timestamp in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embedding vector type.
///
/// A dense vector of 32-bit floats. Its length must equal the index's
/// configured dimension.
pub type Embedding = Vec<f32>;
