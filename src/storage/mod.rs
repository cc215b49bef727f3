//! Storage layer abstractions for PulseIndex.
//!
//! Persistence is a full-state write: the whole graph and document store
//! are serialized into an [`IndexSnapshot`] and handed to a backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      IndexService                            │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │   StorageBackend    │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                    ▲         ▲                              │
//! │                    │         │                              │
//! │         ┌─────────┴─┐   ┌───┴─────────┐                    │
//! │         │RedbStorage│   │ FileStorage │                    │
//! │         └───────────┘   └─────────────┘                    │
//! │       (one .redb per      ({name}.index,                   │
//! │        index, atomic)      {name}.documents)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod file;
pub mod redb;
pub mod schema;

pub use self::file::FileStorage;
pub use self::redb::RedbStorage;
pub use schema::{IndexMetadata, IndexSnapshot, SCHEMA_VERSION};

use std::path::Path;

use crate::config::{Config, StorageBackendKind};
use crate::error::{Result, ValidationError};

use schema::MAX_INDEX_NAME_LENGTH;

/// Storage backend trait for PulseIndex.
///
/// A backend persists snapshots for any number of named indexes under one
/// directory. Saving replaces whatever was stored for that name.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so an `IndexService` can be shared
/// across threads.
pub trait StorageBackend: Send + Sync {
    /// Persists a snapshot, replacing any previous one for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails. What was on disk before may or
    /// may not have been replaced, depending on the backend.
    fn save(&self, name: &str, snapshot: &IndexSnapshot) -> Result<()>;

    /// Loads the snapshot for `name`.
    ///
    /// Returns `None` if nothing was ever persisted under that name.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state exists but cannot be read, is
    /// corrupted, or has an incompatible schema version.
    fn load(&self, name: &str) -> Result<Option<IndexSnapshot>>;

    /// Deletes everything persisted for `name`.
    ///
    /// Returns `true` if anything was removed.
    fn remove(&self, name: &str) -> Result<bool>;

    /// Returns the directory this backend stores indexes in.
    fn path(&self) -> &Path;
}

/// Opens the storage backend selected by the configuration.
///
/// The storage directory is created if it doesn't exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn open_storage(config: &Config) -> Result<Box<dyn StorageBackend>> {
    match config.storage_backend {
        StorageBackendKind::Redb => Ok(Box::new(RedbStorage::open(&config.storage_path)?)),
        StorageBackendKind::Files => Ok(Box::new(FileStorage::open(&config.storage_path)?)),
    }
}

/// Validates an index name.
///
/// Names become file names, so only ASCII letters, digits, `-`, `_` and
/// `.` are allowed, and a name may not start with `.`.
pub(crate) fn validate_index_name(name: &str) -> std::result::Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::required_field("index name"));
    }
    if name.len() > MAX_INDEX_NAME_LENGTH {
        return Err(ValidationError::invalid_field(
            "index name",
            format!(
                "exceeds max length of {} chars (got {})",
                MAX_INDEX_NAME_LENGTH,
                name.len()
            ),
        ));
    }
    if name.starts_with('.') {
        return Err(ValidationError::invalid_field(
            "index name",
            "must not start with '.'",
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ValidationError::invalid_field(
            "index name",
            format!("invalid character {:?}", c),
        ));
    }
    Ok(())
}
