//! In-memory document store.
//!
//! Maps document IDs to documents. Ordered by ID so iteration, snapshots
//! and graph rebuilds are deterministic.

use std::collections::BTreeMap;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::error::{PulseIndexError, Result, StorageError};
use crate::types::DocumentId;
use crate::vector::VectorRecord;

use super::types::{Document, MetadataValue};

/// Snapshot format version for the store blob.
const STORE_SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoreSnapshotRef<'a> {
    version: u32,
    documents: Vec<&'a Document>,
}

#[derive(Deserialize)]
struct StoreSnapshot {
    version: u32,
    documents: Vec<Document>,
}

/// Document store: `DocumentId → Document`.
#[derive(Clone, Debug, Default)]
pub struct DocumentStore {
    documents: BTreeMap<DocumentId, Document>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document. Returns the previous one, if any.
    pub fn put(&mut self, document: Document) -> Option<Document> {
        self.documents.insert(document.id.clone(), document)
    }

    /// Looks up a document.
    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Removes a document. Absent IDs are a no-op returning `None`.
    pub fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        self.documents.remove(id)
    }

    /// Returns true if the ID is present.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Iterates over all documents in ID order.
    pub fn all(&self) -> impl Iterator<Item = (&DocumentId, &Document)> {
        self.documents.iter()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Collects the vectors of every document that has one, in ID order.
    ///
    /// This is the input for a graph rebuild.
    pub fn with_embeddings(&self) -> Vec<VectorRecord> {
        self.documents
            .values()
            .filter_map(|doc| {
                doc.embedding
                    .as_ref()
                    .map(|emb| VectorRecord::new(doc.id.clone(), emb.clone()))
            })
            .collect()
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_usage(&self) -> usize {
        self.documents
            .values()
            .map(|doc| {
                size_of::<Document>()
                    + doc.id.as_str().len()
                    + doc.text.len()
                    + doc
                        .embedding
                        .as_ref()
                        .map_or(0, |e| e.len() * size_of::<f32>())
                    + doc
                        .metadata
                        .iter()
                        .map(|(k, v)| k.len() + metadata_value_size(v))
                        .sum::<usize>()
            })
            .sum()
    }

    /// Serializes every document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let snapshot = StoreSnapshotRef {
            version: STORE_SNAPSHOT_VERSION,
            documents: self.documents.values().collect(),
        };
        bincode::serialize(&snapshot)
            .map_err(|e| StorageError::serialization(format!("document store: {}", e)).into())
    }

    /// Restores a store written by [`DocumentStore::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: StoreSnapshot = bincode::deserialize(bytes).map_err(|e| {
            PulseIndexError::Storage(StorageError::corrupted(format!(
                "Invalid document store snapshot: {}",
                e
            )))
        })?;

        if snapshot.version != STORE_SNAPSHOT_VERSION {
            return Err(StorageError::corrupted(format!(
                "Unsupported document store version {} (expected {})",
                snapshot.version, STORE_SNAPSHOT_VERSION
            ))
            .into());
        }

        let documents = snapshot
            .documents
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect();
        Ok(Self { documents })
    }
}

fn metadata_value_size(value: &MetadataValue) -> usize {
    size_of::<MetadataValue>()
        + match value {
            MetadataValue::String(s) => s.len(),
            MetadataValue::List(items) => items.iter().map(metadata_value_size).sum(),
            _ => 0,
        }
}
