//! Configuration types for PulseIndex.
//!
//! The [`Config`] struct controls index behavior including:
//! - Embedding provider and dimension
//! - HNSW graph parameters (M, ef_construction, ef_search)
//! - Persistence location, backend and durability mode
//! - When deletes trigger a physical graph rebuild
//!
//! # Example
//! ```rust
//! use pulseindex::{Config, EmbeddingDimension, HnswConfig, PersistMode};
//!
//! // Use defaults (External provider, 384 dimensions, cosine metric)
//! let config = Config::default();
//!
//! // Customize for a small local index
//! let config = Config {
//!     embedding_dimension: EmbeddingDimension::Custom(3),
//!     hnsw: HnswConfig {
//!         max_nb_connection: 16,
//!         ef_construction: 200,
//!         ..Default::default()
//!     },
//!     persist_mode: PersistMode::OnClose,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::vector::DistanceMetric;

/// Index configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use pulseindex::Config;
///
/// let config = Config {
///     persist_to_disk: false,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// How embeddings are generated or provided.
    pub embedding_provider: EmbeddingProvider,

    /// Embedding vector dimension (must match provider output).
    ///
    /// Fixed for the lifetime of an index. Persisted state with a different
    /// dimension is ignored on load.
    pub embedding_dimension: EmbeddingDimension,

    /// Distance metric used by the graph. Fixed at creation.
    pub metric: DistanceMetric,

    /// HNSW tuning parameters.
    pub hnsw: HnswConfig,

    /// Directory that holds persisted index state.
    pub storage_path: PathBuf,

    /// Whether the index is saved to and loaded from disk at all.
    pub persist_to_disk: bool,

    /// Which persistence backend to use when `persist_to_disk` is set.
    pub storage_backend: StorageBackendKind,

    /// When mutating operations are written to disk.
    pub persist_mode: PersistMode,

    /// When deletes trigger a physical rebuild of the graph.
    pub rebuild_policy: RebuildPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // External is the safe default - no model dependency required
            embedding_provider: EmbeddingProvider::External,
            // 384 matches all-MiniLM-L6-v2
            embedding_dimension: EmbeddingDimension::D384,
            metric: DistanceMetric::Cosine,
            hnsw: HnswConfig::default(),
            storage_path: PathBuf::from("./pulseindex"),
            persist_to_disk: true,
            storage_backend: StorageBackendKind::Redb,
            persist_mode: PersistMode::EveryWrite,
            rebuild_policy: RebuildPolicy::Immediate,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config whose state lives under `storage_path`.
    ///
    /// # Example
    /// ```rust
    /// use pulseindex::{Config, EmbeddingDimension};
    ///
    /// let config = Config::with_storage("/tmp/my-index", EmbeddingDimension::Custom(1536));
    /// assert_eq!(config.dimension(), 1536);
    /// ```
    pub fn with_storage(storage_path: impl Into<PathBuf>, dimension: EmbeddingDimension) -> Self {
        Self {
            storage_path: storage_path.into(),
            embedding_dimension: dimension,
            ..Default::default()
        }
    }

    /// Creates a Config for a purely in-memory index.
    ///
    /// Nothing is read from or written to disk; `close()` just releases memory.
    pub fn in_memory(dimension: EmbeddingDimension) -> Self {
        Self {
            embedding_dimension: dimension,
            persist_to_disk: false,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `IndexService::new()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - Custom dimension is 0 or > 4096
    /// - Any HNSW parameter is out of range (see [`HnswConfig::validate`])
    /// - `storage_path` is empty while `persist_to_disk` is set
    /// - A rebuild threshold is outside `(0.0, 1.0]`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let EmbeddingDimension::Custom(dim) = self.embedding_dimension {
            if dim == 0 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must be greater than 0",
                ));
            }
            if dim > 4096 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must not exceed 4096",
                ));
            }
        }

        self.hnsw.validate()?;

        if self.persist_to_disk && self.storage_path.as_os_str().is_empty() {
            return Err(ValidationError::required_field("storage_path"));
        }

        if let RebuildPolicy::Threshold(ratio) = self.rebuild_policy {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ValidationError::invalid_field(
                    "rebuild_policy",
                    format!("threshold must be in (0.0, 1.0], got {}", ratio),
                ));
            }
        }

        Ok(())
    }

    /// Returns the embedding dimension as a numeric value.
    pub fn dimension(&self) -> usize {
        self.embedding_dimension.size()
    }
}

/// Embedding provider configuration.
///
/// Determines how embedding vectors are obtained for documents and
/// text queries.
#[derive(Clone, Debug, Default)]
pub enum EmbeddingProvider {
    /// Caller provides pre-computed embedding vectors.
    ///
    /// Text-only documents and text queries fail with an embedding error
    /// unless an [`EmbeddingService`](crate::embedding::EmbeddingService)
    /// is supplied to `IndexService::with_embedding()`.
    #[default]
    External,
}

impl EmbeddingProvider {
    /// Returns true if this is the external provider.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

/// Embedding vector dimensions.
///
/// Standard dimensions are provided for common models. Use `Custom` for
/// other embedding services.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingDimension {
    /// 384 dimensions (all-MiniLM-L6-v2).
    #[default]
    D384,

    /// 768 dimensions (bge-base-en-v1.5, BERT-base).
    D768,

    /// Custom dimension for other embedding models.
    ///
    /// Must be between 1 and 4096.
    Custom(usize),
}

impl EmbeddingDimension {
    /// Returns the numeric size of this dimension.
    ///
    /// # Example
    /// ```rust
    /// use pulseindex::EmbeddingDimension;
    ///
    /// assert_eq!(EmbeddingDimension::D384.size(), 384);
    /// assert_eq!(EmbeddingDimension::D768.size(), 768);
    /// assert_eq!(EmbeddingDimension::Custom(3).size(), 3);
    /// ```
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::D384 => 384,
            Self::D768 => 768,
            Self::Custom(n) => *n,
        }
    }
}

/// HNSW graph parameters.
///
/// Fixed when the graph is created. A rebuild reuses the same parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum neighbors per node on upper layers (M).
    ///
    /// Layer 0 allows `2 * M`. Larger values improve recall at the cost of
    /// memory and build time.
    pub max_nb_connection: usize,

    /// Candidate list size during insertion.
    pub ef_construction: usize,

    /// Default candidate list size during search.
    ///
    /// Individual searches may override it; the effective value is never
    /// smaller than `k`.
    pub ef_search: usize,

    /// Highest layer a node may be assigned to.
    pub max_layer: usize,

    /// Capacity hint used to pre-size node storage.
    pub max_elements: usize,

    /// Seed for level assignment, so identical insert sequences build
    /// identical graphs.
    pub level_seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 50,
            max_layer: 16,
            max_elements: 10_000,
            level_seed: 0x5EED_5EED,
        }
    }
}

impl HnswConfig {
    /// Validates graph parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_nb_connection < 2 {
            return Err(ValidationError::invalid_field(
                "max_nb_connection",
                "must be at least 2",
            ));
        }
        if self.ef_construction == 0 {
            return Err(ValidationError::invalid_field(
                "ef_construction",
                "must be greater than 0",
            ));
        }
        if self.ef_search == 0 {
            return Err(ValidationError::invalid_field(
                "ef_search",
                "must be greater than 0",
            ));
        }
        if self.max_elements == 0 {
            return Err(ValidationError::invalid_field(
                "max_elements",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Persistence backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackendKind {
    /// One redb database per index; the blob pair is committed atomically.
    #[default]
    Redb,

    /// Plain files: `{name}.index`, `{name}.documents` and `{name}.meta.json`.
    Files,
}

/// Durability mode for mutating operations.
///
/// Controls the trade-off between write cost and crash safety. Saving is a
/// full-state write, O(n) in the number of documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistMode {
    /// Save after every `add_documents`, `delete` and rebuild.
    #[default]
    EveryWrite,

    /// Save only on `flush()` and `close()`.
    ///
    /// Everything written since the last flush is lost on crash.
    OnClose,
}

impl PersistMode {
    /// Returns true if every mutation is followed by a save.
    pub fn is_every_write(&self) -> bool {
        matches!(self, Self::EveryWrite)
    }
}

/// When deleted documents are physically removed from the graph.
///
/// Until a rebuild happens, deleted IDs are tombstoned and skipped during
/// search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RebuildPolicy {
    /// Rebuild at the end of every write that leaves a tombstone behind
    /// (a delete, or an add that replaces an existing ID).
    #[default]
    Immediate,

    /// Rebuild once tombstones exceed this fraction of indexed vectors.
    Threshold(f32),

    /// Only rebuild on an explicit `rebuild_index()` call.
    Manual,
}

impl RebuildPolicy {
    /// Returns true if a rebuild is due for the given tombstone and total counts.
    pub fn should_rebuild(&self, tombstoned: usize, total: usize) -> bool {
        if tombstoned == 0 {
            return false;
        }
        match self {
            Self::Immediate => true,
            Self::Threshold(ratio) => {
                total == 0 || (tombstoned as f32 / total as f32) >= *ratio
            }
            Self::Manual => false,
        }
    }
}
