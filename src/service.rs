//! IndexService: the coordinating façade over one named index.
//!
//! The [`IndexService`] owns the HNSW graph, the document store and the
//! persistence backend for a single index name. It provides:
//!
//! - Lifecycle (`init`, `close`) with an explicit state machine
//! - Adding documents, embedding the ones that arrive without a vector
//! - Similarity search by vector or by text
//! - Deletion with policy-driven graph rebuilds
//! - Full-state persistence after writes or on demand
//!
//! # Quick Start
//!
//! ```rust
//! use pulseindex::{Config, EmbeddingDimension, IndexService, NewDocument};
//!
//! # fn main() -> pulseindex::Result<()> {
//! let service = IndexService::open("notes", Config::in_memory(EmbeddingDimension::Custom(3)))?;
//!
//! service.add_documents(vec![
//!     NewDocument::new("alpha").with_id("A").with_embedding(vec![1.0, 0.0, 0.0]),
//!     NewDocument::new("beta").with_id("B").with_embedding(vec![0.0, 1.0, 0.0]),
//!     NewDocument::new("close to alpha").with_id("C").with_embedding(vec![0.9, 0.1, 0.0]),
//! ])?;
//!
//! let hits = service.similarity_search(&[1.0, 0.0, 0.0], 2, None)?;
//! assert_eq!(hits[0].id.as_str(), "A");
//! assert_eq!(hits[1].id.as_str(), "C");
//!
//! service.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! ```text
//! Uninitialized ──init()──► Ready ──close()──► Closed
//!                            │  ▲
//!                            └──┘ init() is a no-op
//! ```
//!
//! Every operation other than `init()` requires `Ready` and fails with
//! `NotInitialized` otherwise. `Closed` is terminal.
//!
//! # Thread Safety
//!
//! `IndexService` is `Send + Sync` and can be shared across threads using
//! `Arc`. Searches take a read lock and run concurrently with each other;
//! writes (`add_documents`, `delete`, `rebuild_index`, `flush`, `close`)
//! take the write lock. Embedding calls happen before the write lock is
//! taken, so a slow provider never blocks readers.
//!
//! # Durability
//!
//! Persistence is best-effort. A write is applied in memory first and then
//! saved; if the save fails the error is returned and memory stays ahead of
//! disk until the next successful save. There is no write-ahead log.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::document::validation::validate_new_document;
use crate::document::{Document, DocumentStore, NewDocument};
use crate::embedding::{create_embedding_service, EmbeddingService};
use crate::error::{PulseIndexError, Result};
use crate::storage::{open_storage, validate_index_name, IndexMetadata, IndexSnapshot, StorageBackend};
use crate::types::{DocumentId, Timestamp};
use crate::vector::{validate_vector, DistanceMetric, HnswIndex, VectorIndex, VectorRecord};

/// Lifecycle state of an [`IndexService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexState {
    /// Created but `init()` not yet called.
    Uninitialized,
    /// Loaded and serving requests.
    Ready,
    /// Closed; every further operation fails.
    Closed,
}

/// Point-in-time statistics for an index.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,

    /// Number of stored documents.
    pub document_count: usize,

    /// Vectors returned by search.
    pub live_vectors: usize,

    /// Graph nodes, including tombstoned ones.
    pub total_vectors: usize,

    /// Deleted or replaced vectors awaiting a rebuild.
    pub tombstoned_vectors: usize,

    /// Vector dimension.
    pub dimension: usize,

    /// Distance metric.
    pub metric: DistanceMetric,

    /// Number of HNSW layers.
    pub layer_count: usize,

    /// Approximate in-memory footprint of graph and documents, in bytes.
    pub memory_usage_bytes: usize,
}

/// Everything held while the index is `Ready`.
struct ReadyState {
    index: HnswIndex,
    store: DocumentStore,
    storage: Option<Box<dyn StorageBackend>>,
    created_at: Timestamp,
}

enum ServiceState {
    Uninitialized,
    Ready(Box<ReadyState>),
    Closed,
}

impl ServiceState {
    fn kind(&self) -> IndexState {
        match self {
            Self::Uninitialized => IndexState::Uninitialized,
            Self::Ready(_) => IndexState::Ready,
            Self::Closed => IndexState::Closed,
        }
    }
}

fn lock_poisoned() -> PulseIndexError {
    PulseIndexError::vector("Index state lock poisoned by a panicked writer")
}

/// A named, HNSW-backed vector index with document storage and persistence.
///
/// Create with [`IndexService::new`] (or [`IndexService::with_embedding`]
/// to supply an embedding provider), then call [`IndexService::init`].
/// [`IndexService::open`] does both.
pub struct IndexService {
    /// Index name; also the persisted file stem.
    name: String,

    /// Configuration, validated at construction.
    config: Config,

    /// Embedding provider for text-only documents and text queries.
    embedding: Box<dyn EmbeddingService>,

    /// Lifecycle state plus the loaded structures.
    state: RwLock<ServiceState>,
}

impl std::fmt::Debug for IndexService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexService")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl IndexService {
    /// Creates a service for the named index using the configured
    /// embedding provider. The index is not loaded until [`init`](Self::init).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the name is invalid.
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self> {
        let embedding = create_embedding_service(&config)?;
        Self::with_embedding(name, config, embedding)
    }

    /// Creates a service that embeds text with the given provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the name is invalid, or if
    /// the provider's dimension differs from the configured one.
    pub fn with_embedding(
        name: impl Into<String>,
        config: Config,
        embedding: Box<dyn EmbeddingService>,
    ) -> Result<Self> {
        let name = name.into();
        config.validate().map_err(PulseIndexError::from)?;
        validate_index_name(&name)?;

        if embedding.dimension() != config.dimension() {
            return Err(PulseIndexError::config(format!(
                "embedding service produces {}-dimensional vectors but the index is configured for {}",
                embedding.dimension(),
                config.dimension()
            )));
        }

        debug!(index = %name, dimension = config.dimension(), "Index service created");
        Ok(Self {
            name,
            config,
            embedding,
            state: RwLock::new(ServiceState::Uninitialized),
        })
    }

    /// Creates a service and initializes it in one step.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use pulseindex::{Config, EmbeddingDimension, IndexService};
    ///
    /// let service = IndexService::open(
    ///     "agent-memory",
    ///     Config::with_storage("./data", EmbeddingDimension::D768),
    /// )?;
    /// ```
    pub fn open(name: impl Into<String>, config: Config) -> Result<Self> {
        let service = Self::new(name, config)?;
        service.init()?;
        Ok(service)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads persisted state (or starts empty) and moves to `Ready`.
    ///
    /// Calling `init()` on a `Ready` index does nothing. Loading is
    /// best-effort: unreadable, corrupted or dimension-incompatible persisted
    /// state is logged and replaced by an empty index.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the index was closed, or an I/O error if
    /// the storage directory cannot be created.
    #[instrument(skip(self), fields(index = %self.name))]
    pub fn init(&self) -> Result<()> {
        let mut state = self.write_state()?;
        match &*state {
            ServiceState::Ready(_) => {
                debug!("Already initialized");
                return Ok(());
            }
            ServiceState::Closed => return Err(PulseIndexError::not_initialized(&self.name)),
            ServiceState::Uninitialized => {}
        }

        let storage = if self.config.persist_to_disk {
            Some(open_storage(&self.config)?)
        } else {
            None
        };

        let (index, store, created_at) = match storage.as_deref() {
            Some(backend) => self.load_or_empty(backend),
            None => self.empty(),
        };

        info!(
            documents = store.len(),
            dimension = self.dimension(),
            metric = self.config.metric.as_str(),
            persisted = storage.is_some(),
            "Index initialized"
        );

        *state = ServiceState::Ready(Box::new(ReadyState {
            index,
            store,
            storage,
            created_at,
        }));
        Ok(())
    }

    /// Flushes state to disk, releases memory and moves to `Closed`.
    ///
    /// The flush is synchronous and happens regardless of
    /// [`PersistMode`](crate::PersistMode). If it fails, the index stays
    /// `Ready` so the caller can retry.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if already closed, or the save error.
    #[instrument(skip(self), fields(index = %self.name))]
    pub fn close(&self) -> Result<()> {
        let mut state = self.write_state()?;
        match &*state {
            ServiceState::Closed => return Err(PulseIndexError::not_initialized(&self.name)),
            ServiceState::Uninitialized => {}
            ServiceState::Ready(ready) => self.persist(ready)?,
        }

        *state = ServiceState::Closed;
        info!("Index closed");
        Ok(())
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> IndexState {
        match self.state.read() {
            Ok(guard) => guard.kind(),
            Err(poisoned) => poisoned.into_inner().kind(),
        }
    }

    /// Returns the index name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration this service was created with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the vector dimension of this index.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Adds documents to the index.
    ///
    /// Documents without an embedding are embedded with a single
    /// `embed_batch` call. Every document and vector is validated before
    /// anything is mutated: one bad document rejects the whole call.
    /// Documents without an ID get a generated one. Re-using an existing ID
    /// replaces that document.
    ///
    /// Returns the IDs in input order.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if the index is not `Ready`
    /// - `Validation` (including `DimensionMismatch`) for bad input
    /// - `Embedding` if the provider fails
    /// - A storage error if the save after the write fails (the documents
    ///   remain added in memory)
    pub fn add_documents(&self, documents: Vec<NewDocument>) -> Result<Vec<DocumentId>> {
        self.ensure_ready()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let dimension = self.dimension();
        for doc in &documents {
            validate_new_document(doc, dimension)?;
        }

        let documents = self.embed_missing(documents)?;

        let mut ids = Vec::with_capacity(documents.len());
        let mut records = Vec::with_capacity(documents.len());
        let mut stored = Vec::with_capacity(documents.len());
        for new in documents {
            let id = new.id.unwrap_or_else(DocumentId::generate);
            let embedding = new.embedding.unwrap_or_default();
            records.push(VectorRecord::new(id.clone(), embedding.clone()));
            stored.push(Document {
                id: id.clone(),
                text: new.text,
                embedding: Some(embedding),
                metadata: new.metadata,
                score: None,
            });
            ids.push(id);
        }

        self.with_ready_mut(|ready| {
            ready.index.insert_batch(&records)?;
            for doc in stored {
                ready.store.put(doc);
            }
            debug!(
                index = %self.name,
                count = ids.len(),
                total = ready.store.len(),
                "Documents added"
            );

            // Re-used IDs leave tombstones behind
            self.apply_rebuild_policy(ready)?;
            self.persist_after_write(ready)
        })?;

        Ok(ids)
    }

    /// Deletes documents by ID.
    ///
    /// Absent IDs are ignored, so deleting twice has the same effect as
    /// deleting once. Deleted vectors are tombstoned immediately and never
    /// returned by search; the graph is physically rebuilt according to the
    /// configured [`RebuildPolicy`](crate::RebuildPolicy).
    ///
    /// Returns the number of documents actually removed.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let removed = service.delete(["doc-1", "doc-2"])?;
    /// ```
    pub fn delete<I, T>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<DocumentId>,
    {
        let ids: Vec<DocumentId> = ids.into_iter().map(Into::into).collect();

        self.with_ready_mut(|ready| {
            let mut removed = 0;
            let mut tombstoned = 0;
            for id in &ids {
                if ready.store.remove(id).is_some() {
                    removed += 1;
                }
                if ready.index.mark_deleted(id) {
                    tombstoned += 1;
                }
            }

            if removed == 0 && tombstoned == 0 {
                debug!(index = %self.name, requested = ids.len(), "Nothing to delete");
                return Ok(0);
            }

            debug!(
                index = %self.name,
                removed,
                remaining = ready.store.len(),
                "Documents deleted"
            );

            self.apply_rebuild_policy(ready)?;
            self.persist_after_write(ready)?;
            Ok(removed)
        })
    }

    /// Physically rebuilds the graph from the document store, dropping all
    /// tombstones.
    ///
    /// Cost is O(n) in the number of stored documents.
    #[instrument(skip(self), fields(index = %self.name))]
    pub fn rebuild_index(&self) -> Result<()> {
        self.with_ready_mut(|ready| {
            self.rebuild(ready)?;
            self.persist_after_write(ready)
        })
    }

    /// Saves the full state now, regardless of
    /// [`PersistMode`](crate::PersistMode). A no-op for in-memory indexes.
    pub fn flush(&self) -> Result<()> {
        self.with_ready_mut(|ready| self.persist(ready))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Finds the `k` documents closest to `query`.
    ///
    /// Results are ordered best match first, with `score` set to the
    /// similarity (`1 - distance` for cosine). When `max_distance` is given,
    /// results farther than it are dropped.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if the index is not `Ready`; `DimensionMismatch` if
    /// the query has the wrong length.
    pub fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<Document>> {
        self.similarity_search_with_ef(query, k, max_distance, self.config.hnsw.ef_search)
    }

    /// Like [`similarity_search`](Self::similarity_search) with an explicit
    /// search beam width. The effective `ef` is never smaller than `k`.
    pub fn similarity_search_with_ef(
        &self,
        query: &[f32],
        k: usize,
        max_distance: Option<f32>,
        ef_search: usize,
    ) -> Result<Vec<Document>> {
        self.with_ready(|ready| {
            // Graph nodes without a document would otherwise crowd out hits
            let orphans = ready.index.len().saturating_sub(ready.store.len());
            let neighbors = ready.index.search(query, k.saturating_add(orphans), ef_search)?;
            let metric = ready.index.metric();

            let mut results = Vec::with_capacity(neighbors.len().min(k));
            for (id, distance) in neighbors {
                // Neighbors are sorted, nothing after this can qualify
                if results.len() == k || max_distance.is_some_and(|max| distance > max) {
                    break;
                }
                match ready.store.get(&id) {
                    Some(doc) => results.push(doc.scored(metric.similarity(distance))),
                    None => warn!(
                        index = %self.name,
                        id = %id,
                        "Consistency fault: indexed vector has no document, skipping"
                    ),
                }
            }
            Ok(results)
        })
    }

    /// Embeds `query` with the embedding provider, then searches.
    ///
    /// # Errors
    ///
    /// As [`similarity_search`](Self::similarity_search), plus `Embedding`
    /// if the provider fails.
    pub fn similarity_search_by_text(
        &self,
        query: &str,
        k: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<Document>> {
        self.ensure_ready()?;
        let embedding = self.embedding.embed(query)?;
        self.similarity_search(&embedding, k, max_distance)
    }

    /// Returns a stored document by ID.
    pub fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.with_ready(|ready| Ok(ready.store.get(id).cloned()))
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> Result<usize> {
        self.with_ready(|ready| Ok(ready.store.len()))
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> Result<bool> {
        self.with_ready(|ready| Ok(ready.store.is_empty()))
    }

    /// Returns graph and store statistics.
    pub fn stats(&self) -> Result<IndexStats> {
        self.with_ready(|ready| {
            Ok(IndexStats {
                name: self.name.clone(),
                document_count: ready.store.len(),
                live_vectors: ready.index.len(),
                total_vectors: ready.index.total_count(),
                tombstoned_vectors: ready.index.deleted_count(),
                dimension: ready.index.dimension(),
                metric: ready.index.metric(),
                layer_count: ready.index.layer_count(),
                memory_usage_bytes: ready.index.memory_usage() + ready.store.memory_usage(),
            })
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ServiceState>> {
        self.state.read().map_err(|_| lock_poisoned())
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ServiceState>> {
        self.state.write().map_err(|_| lock_poisoned())
    }

    fn ensure_ready(&self) -> Result<()> {
        self.with_ready(|_| Ok(()))
    }

    fn with_ready<T>(&self, f: impl FnOnce(&ReadyState) -> Result<T>) -> Result<T> {
        let state = self.read_state()?;
        match &*state {
            ServiceState::Ready(ready) => f(ready.as_ref()),
            _ => Err(PulseIndexError::not_initialized(&self.name)),
        }
    }

    fn with_ready_mut<T>(&self, f: impl FnOnce(&mut ReadyState) -> Result<T>) -> Result<T> {
        let mut state = self.write_state()?;
        match &mut *state {
            ServiceState::Ready(ready) => f(ready.as_mut()),
            _ => Err(PulseIndexError::not_initialized(&self.name)),
        }
    }

    fn empty(&self) -> (HnswIndex, DocumentStore, Timestamp) {
        (
            HnswIndex::new(self.dimension(), self.config.metric, &self.config.hnsw),
            DocumentStore::new(),
            Timestamp::now(),
        )
    }

    fn load_or_empty(&self, storage: &dyn StorageBackend) -> (HnswIndex, DocumentStore, Timestamp) {
        match storage.load(&self.name) {
            Ok(Some(snapshot)) => match self.restore(snapshot) {
                Ok(restored) => restored,
                Err(e) => {
                    warn!(error = %e, "Persisted state unusable, starting with an empty index");
                    self.empty()
                }
            },
            Ok(None) => {
                debug!("No persisted state, starting with an empty index");
                self.empty()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load persisted state, starting with an empty index");
                self.empty()
            }
        }
    }

    /// Turns a loaded snapshot back into live structures.
    ///
    /// The document store is authoritative: if the graph blob is unreadable
    /// or disagrees with the documents, the graph is rebuilt from them.
    fn restore(&self, snapshot: IndexSnapshot) -> Result<(HnswIndex, DocumentStore, Timestamp)> {
        let dimension = self.dimension();
        let metric = self.config.metric;
        let metadata = &snapshot.metadata;

        if metadata.dimension != dimension || metadata.metric != metric {
            return Err(PulseIndexError::config(format!(
                "persisted index is {}-dimensional/{}, configured {}-dimensional/{}",
                metadata.dimension,
                metadata.metric.as_str(),
                dimension,
                metric.as_str()
            )));
        }

        let store = DocumentStore::from_bytes(&snapshot.documents)?;

        let index = match HnswIndex::from_bytes(&snapshot.index) {
            Ok(index)
                if index.dimension() == dimension
                    && index.metric() == metric
                    && graph_matches_store(&index, &store) =>
            {
                index
            }
            Ok(_) => {
                warn!("Persisted graph disagrees with documents, rebuilding from documents");
                HnswIndex::rebuild_from_records(
                    dimension,
                    metric,
                    &self.config.hnsw,
                    &store.with_embeddings(),
                )?
            }
            Err(e) => {
                warn!(error = %e, "Persisted graph unreadable, rebuilding from documents");
                HnswIndex::rebuild_from_records(
                    dimension,
                    metric,
                    &self.config.hnsw,
                    &store.with_embeddings(),
                )?
            }
        };

        debug!(
            documents = store.len(),
            tombstoned = index.deleted_count(),
            "Persisted state restored"
        );
        Ok((index, store, metadata.created_at))
    }

    /// Embeds every document lacking a vector with one batch call.
    fn embed_missing(&self, mut documents: Vec<NewDocument>) -> Result<Vec<NewDocument>> {
        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(documents);
        }

        let texts: Vec<&str> = missing.iter().map(|&i| documents[i].text.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts)?;
        if embeddings.len() != missing.len() {
            return Err(PulseIndexError::embedding(format!(
                "provider returned {} embeddings for {} texts",
                embeddings.len(),
                missing.len()
            )));
        }

        for embedding in &embeddings {
            validate_vector(embedding, self.dimension())?;
        }
        for (&i, embedding) in missing.iter().zip(embeddings) {
            documents[i].embedding = Some(embedding);
        }

        debug!(index = %self.name, count = missing.len(), "Embedded documents");
        Ok(documents)
    }

    fn apply_rebuild_policy(&self, ready: &mut ReadyState) -> Result<()> {
        let tombstoned = ready.index.deleted_count();
        let total = ready.index.total_count();
        if self.config.rebuild_policy.should_rebuild(tombstoned, total) {
            self.rebuild(ready)?;
        }
        Ok(())
    }

    fn rebuild(&self, ready: &mut ReadyState) -> Result<()> {
        let records = ready.store.with_embeddings();
        let dropped = ready.index.deleted_count();
        let rebuilt = HnswIndex::rebuild_from_records(
            ready.index.dimension(),
            ready.index.metric(),
            ready.index.config(),
            &records,
        )?;
        ready.index = rebuilt;

        info!(index = %self.name, count = records.len(), dropped, "Index rebuilt");
        Ok(())
    }

    fn persist_after_write(&self, ready: &ReadyState) -> Result<()> {
        if self.config.persist_mode.is_every_write() {
            self.persist(ready)
        } else {
            Ok(())
        }
    }

    /// Saves the full state. A no-op without a storage backend.
    fn persist(&self, ready: &ReadyState) -> Result<()> {
        let Some(storage) = ready.storage.as_deref() else {
            return Ok(());
        };

        let mut metadata =
            IndexMetadata::new(&self.name, ready.index.dimension(), ready.index.metric());
        metadata.created_at = ready.created_at;
        metadata.touch();
        metadata.document_count = ready.store.len() as u64;
        metadata.vector_count = ready.index.total_count() as u64;

        let snapshot =
            IndexSnapshot::new(metadata, ready.index.to_bytes()?, ready.store.to_bytes()?);

        storage
            .save(&self.name, &snapshot)
            .inspect_err(|e| warn!(index = %self.name, error = %e, "Save failed, memory is ahead of disk"))
    }
}

/// Returns true if the graph's live IDs are exactly the documents with vectors.
fn graph_matches_store(index: &HnswIndex, store: &DocumentStore) -> bool {
    let with_vectors = store
        .all()
        .filter(|(_, doc)| doc.embedding.is_some())
        .count();
    with_vectors == index.len()
        && store
            .all()
            .filter(|(_, doc)| doc.embedding.is_some())
            .all(|(id, _)| index.contains(id))
}

// IndexService is auto Send + Sync: Box<dyn EmbeddingService + Send + Sync>,
// Box<dyn StorageBackend + Send + Sync> and the graph are all Send + Sync.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingDimension, PersistMode, RebuildPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Deterministic provider: vector from the first three bytes of the text.
    struct CountingEmbedding {
        batches: Arc<AtomicUsize>,
    }

    impl EmbeddingService for CountingEmbedding {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let bytes = text.as_bytes();
            Ok((0..3)
                .map(|i| bytes.get(i).copied().unwrap_or(0) as f32)
                .collect())
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn config() -> Config {
        Config::in_memory(EmbeddingDimension::Custom(3))
    }

    fn doc(id: &str, v: [f32; 3]) -> NewDocument {
        NewDocument::new(format!("text {}", id))
            .with_id(id)
            .with_embedding(v.to_vec())
    }

    fn abc(service: &IndexService) {
        service
            .add_documents(vec![
                doc("A", [1.0, 0.0, 0.0]),
                doc("B", [0.0, 1.0, 0.0]),
                doc("C", [0.9, 0.1, 0.0]),
            ])
            .unwrap();
    }

    #[test]
    fn test_state_machine() {
        let service = IndexService::new("test", config()).unwrap();
        assert_eq!(service.state(), IndexState::Uninitialized);
        assert!(service.len().unwrap_err().is_not_initialized());

        service.init().unwrap();
        assert_eq!(service.state(), IndexState::Ready);
        service.init().unwrap();
        assert_eq!(service.state(), IndexState::Ready);

        service.close().unwrap();
        assert_eq!(service.state(), IndexState::Closed);
        assert!(service.init().unwrap_err().is_not_initialized());
        assert!(service.close().unwrap_err().is_not_initialized());
        assert!(service
            .similarity_search(&[1.0, 0.0, 0.0], 1, None)
            .unwrap_err()
            .is_not_initialized());
    }

    #[test]
    fn test_search_fills_k_past_missing_documents() {
        let service = IndexService::open("test", config()).unwrap();
        abc(&service);

        // Drop A from the store but leave its graph node live
        {
            let mut state = service.state.write().unwrap();
            let ServiceState::Ready(ready) = &mut *state else {
                panic!("service should be ready");
            };
            assert!(ready.store.remove(&"A".into()).is_some());
            assert!(ready.index.contains(&"A".into()));
        }

        let hits = service.similarity_search(&[1.0, 0.0, 0.0], 2, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = IndexService::new("../escape", config()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_embedding_dimension_must_match() {
        let err = IndexService::with_embedding(
            "test",
            Config::in_memory(EmbeddingDimension::Custom(4)),
            Box::new(CountingEmbedding {
                batches: Arc::default(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, PulseIndexError::Config { .. }));
    }

    #[test]
    fn test_scores_are_similarities() {
        let service = IndexService::open("test", config()).unwrap();
        abc(&service);

        let hits = service.similarity_search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        assert_eq!(hits[0].id.as_str(), "A");
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-5);
        for w in hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn test_max_distance_filters() {
        let service = IndexService::open("test", config()).unwrap();
        abc(&service);

        let hits = service
            .similarity_search(&[1.0, 0.0, 0.0], 3, Some(0.1))
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_one_embed_batch_per_add() {
        let batches = Arc::new(AtomicUsize::new(0));
        let service = IndexService::with_embedding(
            "test",
            config(),
            Box::new(CountingEmbedding {
                batches: Arc::clone(&batches),
            }),
        )
        .unwrap();
        service.init().unwrap();

        service
            .add_documents(vec![
                NewDocument::new("abc"),
                NewDocument::new("xyz"),
                doc("given", [1.0, 1.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(batches.load(Ordering::SeqCst), 1);
        assert_eq!(service.len().unwrap(), 3);

        // Nothing to embed: no provider call
        service.add_documents(vec![doc("v", [0.0, 0.0, 1.0])]).unwrap();
        assert_eq!(batches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generated_ids() {
        let service = IndexService::open("test", config()).unwrap();
        let ids = service
            .add_documents(vec![NewDocument::new("x").with_embedding(vec![1.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert!(!ids[0].is_empty());
        assert!(service.get_document(&ids[0]).unwrap().is_some());
    }

    #[test]
    fn test_external_provider_rejects_text_only() {
        let service = IndexService::open("test", config()).unwrap();
        let err = service.add_documents(vec![NewDocument::new("no vector")]).unwrap_err();
        assert!(err.is_embedding());
        assert_eq!(service.len().unwrap(), 0);

        let err = service.similarity_search_by_text("query", 1, None).unwrap_err();
        assert!(err.is_embedding());
    }

    #[test]
    fn test_reinsert_replaces_document() {
        let service = IndexService::open(
            "test",
            Config {
                rebuild_policy: RebuildPolicy::Manual,
                ..config()
            },
        )
        .unwrap();
        abc(&service);
        service.add_documents(vec![doc("A", [0.0, 0.0, 1.0])]).unwrap();

        assert_eq!(service.len().unwrap(), 3);
        let stats = service.stats().unwrap();
        assert_eq!(stats.tombstoned_vectors, 1);

        let hits = service.similarity_search(&[0.0, 0.0, 1.0], 1, None).unwrap();
        assert_eq!(hits[0].id.as_str(), "A");
    }

    #[test]
    fn test_delete_manual_policy_keeps_tombstones() {
        let service = IndexService::open(
            "test",
            Config {
                rebuild_policy: RebuildPolicy::Manual,
                ..config()
            },
        )
        .unwrap();
        abc(&service);

        assert_eq!(service.delete(["B"]).unwrap(), 1);
        let stats = service.stats().unwrap();
        assert_eq!(stats.tombstoned_vectors, 1);
        assert_eq!(stats.document_count, 2);

        let hits = service.similarity_search(&[0.0, 1.0, 0.0], 1, None).unwrap();
        assert_ne!(hits[0].id.as_str(), "B");

        service.rebuild_index().unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.tombstoned_vectors, 0);
        assert_eq!(stats.total_vectors, 2);
    }

    #[test]
    fn test_delete_immediate_policy_rebuilds() {
        let service = IndexService::open("test", config()).unwrap();
        abc(&service);

        service.delete(["B"]).unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.tombstoned_vectors, 0);
        assert_eq!(stats.total_vectors, 2);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let service = IndexService::open("test", config()).unwrap();
        abc(&service);
        assert_eq!(service.delete(["missing"]).unwrap(), 0);
        assert_eq!(service.len().unwrap(), 3);
    }

    #[test]
    fn test_stats() {
        let service = IndexService::open(
            "stats",
            Config {
                persist_mode: PersistMode::OnClose,
                ..config()
            },
        )
        .unwrap();
        abc(&service);

        let stats = service.stats().unwrap();
        assert_eq!(stats.name, "stats");
        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.live_vectors, 3);
        assert_eq!(stats.dimension, 3);
        assert_eq!(stats.metric, DistanceMetric::Cosine);
        assert!(stats.layer_count >= 1);
        assert!(stats.memory_usage_bytes > 0);
    }

    #[test]
    fn test_debug_output() {
        let service = IndexService::new("dbg", config()).unwrap();
        let debug = format!("{:?}", service);
        assert!(debug.contains("IndexService"));
        assert!(debug.contains("dbg"));
        assert!(debug.contains("Uninitialized"));
    }

    #[test]
    fn test_index_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndexService>();
    }
}
