//! Vector index abstractions for semantic search.
//!
//! This module provides a trait-based abstraction over vector indexes,
//! allowing different ANN (Approximate Nearest Neighbor) backends.
//! The primary implementation is [`HnswIndex`], a pure Rust HNSW graph.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────────────┘
//!            │
//!    ┌───────┴────────┐
//!    │   HnswIndex    │  (layered proximity graph + tombstones)
//!    └────────────────┘
//! ```
//!
//! The document store is the **source of truth**. The HNSW graph is a
//! derived, rebuildable structure: deleting vectors means building a fresh
//! graph from the surviving documents.

mod distance;
mod hnsw;

pub use distance::{cosine_distance, euclidean_distance, DistanceMetric};
pub use hnsw::HnswIndex;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::types::{DocumentId, Embedding};

/// A vector keyed by the ID of the document it belongs to.
///
/// Immutable once inserted into an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Document ID, unique within the index.
    pub id: DocumentId,

    /// Fixed-length vector; its length equals the index dimension.
    pub vector: Embedding,
}

impl VectorRecord {
    /// Creates a new record.
    pub fn new(id: impl Into<DocumentId>, vector: Embedding) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

/// Vector index trait for approximate nearest neighbor search.
///
/// Implementations are NOT internally synchronized: mutating methods take
/// `&mut self`, and callers must serialize writers against readers
/// (`IndexService` does this with a read-write lock).
pub trait VectorIndex: Send + Sync {
    /// Dimension every vector in this index must have.
    fn dimension(&self) -> usize;

    /// Distance metric fixed at creation.
    fn metric(&self) -> DistanceMetric;

    /// Inserts a single vector.
    ///
    /// Re-inserting a live ID replaces its vector (the old node is tombstoned).
    fn insert(&mut self, id: DocumentId, vector: &[f32]) -> Result<()>;

    /// Inserts a batch of vectors.
    ///
    /// Every record is validated before the first insertion, so a dimension
    /// mismatch anywhere in the batch leaves the index untouched.
    fn insert_batch(&mut self, records: &[VectorRecord]) -> Result<()>;

    /// Searches for the k nearest neighbors to the query vector.
    ///
    /// Returns `(id, distance)` pairs sorted by distance ascending
    /// (closest first). Tombstoned vectors are never returned.
    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(DocumentId, f32)>>;

    /// Searches with a filter predicate applied during traversal.
    ///
    /// Only IDs where `filter(id)` returns `true` are collected, but
    /// filtered nodes are still used to navigate the graph. This keeps the
    /// result count up when many points are filtered.
    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        filter: &dyn Fn(&DocumentId) -> bool,
    ) -> Result<Vec<(DocumentId, f32)>>;

    /// Tombstones an ID (soft-delete).
    ///
    /// The vector remains in the graph but is excluded from search
    /// results. Returns `true` if the ID was live.
    fn mark_deleted(&mut self, id: &DocumentId) -> bool;

    /// Returns true if the ID is tombstoned and has no live replacement.
    fn is_deleted(&self, id: &DocumentId) -> bool;

    /// Returns true if the ID is live in the index.
    fn contains(&self, id: &DocumentId) -> bool;

    /// Returns the number of tombstoned vectors still held by the graph.
    fn deleted_count(&self) -> usize;

    /// Returns the number of live (non-deleted) vectors.
    fn len(&self) -> usize;

    /// Returns true if the index has no live vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks a vector against an index dimension.
///
/// Lengths are never truncated or padded. Non-finite components are
/// rejected because they make every distance involving the vector NaN.
pub(crate) fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(ValidationError::dimension_mismatch(dimension, vector.len()).into());
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::invalid_field(
            "embedding",
            format!("component at index {} is not a finite number", pos),
        )
        .into());
    }
    Ok(())
}
