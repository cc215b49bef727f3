//! Persisted layout definitions and versioning.
//!
//! Every index is persisted as a blob pair (HNSW graph + document store)
//! plus an [`IndexMetadata`] record. The metadata is written last and is
//! checked first on load.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata. Persisted state with a
//! different version is refused with `SchemaVersionMismatch`.
//!
//! # redb Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                               │
//! │   Key: &str                                                  │
//! │   Value: &[u8] (bincode)                                     │
//! │   Entries: "index_metadata" -> IndexMetadata                 │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ BLOBS_TABLE                                                  │
//! │   Key: &str                                                  │
//! │   Value: &[u8]                                               │
//! │   Entries: "index" -> HNSW snapshot                          │
//! │            "documents" -> document store snapshot            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;
use crate::vector::DistanceMetric;

/// Current schema version.
///
/// Increment this when making breaking changes to the persisted layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum document text size in bytes (1 MiB).
pub const MAX_TEXT_SIZE: usize = 1024 * 1024;

/// Maximum length of a caller-supplied document ID in bytes.
pub const MAX_ID_LENGTH: usize = 512;

/// Maximum number of metadata entries per document.
pub const MAX_METADATA_ENTRIES: usize = 64;

/// Maximum length of a metadata key in bytes.
pub const MAX_METADATA_KEY_LENGTH: usize = 256;

/// Maximum length of an index name.
pub const MAX_INDEX_NAME_LENGTH: usize = 128;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table. Key is a string identifier, value is bincode.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Blob table holding the graph and document store snapshots.
pub const BLOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Key of the [`IndexMetadata`] entry in [`METADATA_TABLE`].
pub const METADATA_KEY: &str = "index_metadata";

/// Key of the HNSW snapshot in [`BLOBS_TABLE`].
pub const INDEX_BLOB_KEY: &str = "index";

/// Key of the document store snapshot in [`BLOBS_TABLE`].
pub const DOCUMENTS_BLOB_KEY: &str = "documents";

// ============================================================================
// Index Metadata
// ============================================================================

/// Metadata persisted alongside every snapshot.
///
/// Serialized with bincode by the redb backend and as JSON by the file
/// backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Index name.
    pub name: String,

    /// Vector dimension. Fixed for the lifetime of the index.
    pub dimension: usize,

    /// Distance metric. Fixed for the lifetime of the index.
    pub metric: DistanceMetric,

    /// Number of stored documents.
    pub document_count: u64,

    /// Number of graph nodes, including tombstoned ones.
    pub vector_count: u64,

    /// Length of the HNSW blob, used to detect torn writes.
    pub index_bytes: u64,

    /// Length of the document blob, used to detect torn writes.
    pub documents_bytes: u64,

    /// When the index was first persisted.
    pub created_at: Timestamp,

    /// When the index was last persisted.
    pub updated_at: Timestamp,
}

impl IndexMetadata {
    /// Creates metadata for a fresh index.
    pub fn new(name: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.into(),
            dimension,
            metric,
            document_count: 0,
            vector_count: 0,
            index_bytes: 0,
            documents_bytes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Updates the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// The persisted state of one index: metadata plus two opaque blobs.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexSnapshot {
    /// Metadata describing the blobs.
    pub metadata: IndexMetadata,

    /// Serialized HNSW graph.
    pub index: Vec<u8>,

    /// Serialized document store.
    pub documents: Vec<u8>,
}

impl IndexSnapshot {
    /// Bundles the blobs, recording their lengths in the metadata.
    pub fn new(mut metadata: IndexMetadata, index: Vec<u8>, documents: Vec<u8>) -> Self {
        metadata.index_bytes = index.len() as u64;
        metadata.documents_bytes = documents.len() as u64;
        Self {
            metadata,
            index,
            documents,
        }
    }

    /// Returns true if the blob lengths match the metadata.
    pub fn is_consistent(&self) -> bool {
        self.metadata.index_bytes == self.index.len() as u64
            && self.metadata.documents_bytes == self.documents.len() as u64
    }
}
