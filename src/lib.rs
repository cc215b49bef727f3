//! # PulseIndex
//!
//! Embedded HNSW vector index for agentic AI systems.
//!
//! PulseIndex stores documents together with their embeddings and answers
//! "which stored documents are most similar to this one?" with an
//! approximate nearest-neighbor search over a Hierarchical Navigable Small
//! World graph. Index state can be persisted to a local directory and
//! reloaded on the next start.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pulseindex::{Config, EmbeddingDimension, IndexService, NewDocument};
//!
//! // Open (or create) the index named "agent-memory" under ./data
//! let index = IndexService::open(
//!     "agent-memory",
//!     Config::with_storage("./data", EmbeddingDimension::Custom(1536)),
//! )?;
//!
//! // Add documents with pre-computed embeddings
//! let ids = index.add_documents(vec![
//!     NewDocument::new("Always validate user input").with_embedding(embedding),
//! ])?;
//!
//! // Find the closest documents
//! let hits = index.similarity_search(&query_embedding, 10, None)?;
//!
//! // Remove documents; the graph is rebuilt without them
//! index.delete(ids)?;
//!
//! // Flush and release
//! index.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Index
//!
//! An **index** is a named collection of documents sharing one embedding
//! dimension and one distance metric. The name doubles as the file stem of
//! the persisted state.
//!
//! ### Document
//!
//! A **document** is text plus an embedding and free-form metadata. The
//! document store is the source of truth; the HNSW graph is derived from it
//! and can always be rebuilt.
//!
//! ### Deletion
//!
//! Deleted vectors are tombstoned immediately and never returned again.
//! The graph is physically rebuilt according to the configured
//! [`RebuildPolicy`].
//!
//! ### Embedding Providers
//!
//! - **External** (default): you supply every vector.
//! - **Custom**: implement [`embedding::EmbeddingService`] and pass it to
//!   [`IndexService::with_embedding`] to embed text-only documents and text
//!   queries.
//!
//! ## Thread Safety
//!
//! `IndexService` is `Send + Sync` and can be shared across threads using
//! `Arc`. Searches run concurrently; writes are exclusive.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod service;
mod types;

pub mod document;
pub mod embedding;
pub mod storage;

/// Vector index module for HNSW-based approximate nearest neighbor search.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main index interface
pub use service::{IndexService, IndexState, IndexStats};

// Configuration
pub use config::{
    Config, EmbeddingDimension, EmbeddingProvider, HnswConfig, PersistMode, RebuildPolicy,
    StorageBackendKind,
};

// Error handling
pub use error::{PulseIndexError, Result, StorageError, ValidationError};

// Core types
pub use types::{DocumentId, Embedding, Timestamp};

// Documents
pub use document::{Document, Metadata, MetadataValue, NewDocument};

// Vector search
pub use vector::{DistanceMetric, HnswIndex, VectorIndex, VectorRecord};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common PulseIndex usage.
///
/// ```rust
/// use pulseindex::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, EmbeddingDimension, PersistMode, RebuildPolicy};
    pub use crate::document::{Document, NewDocument};
    pub use crate::error::{PulseIndexError, Result};
    pub use crate::service::IndexService;
    pub use crate::types::DocumentId;
    pub use crate::vector::DistanceMetric;
}
