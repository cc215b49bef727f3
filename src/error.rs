//! Error types for PulseIndex.
//!
//! PulseIndex uses a hierarchical error system:
//! - `PulseIndexError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use pulseindex::{Config, IndexService, Result};
//!
//! fn example() -> Result<()> {
//!     let service = IndexService::open("notes", Config::default())?;
//!     // ... operations that may fail ...
//!     service.close()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for PulseIndex operations.
pub type Result<T> = std::result::Result<T, PulseIndexError>;

/// Top-level error enum for all PulseIndex operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum PulseIndexError {
    /// Storage layer error (persistence, corruption, transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Operation attempted before `init()` or after `close()`.
    #[error("Index '{name}' is not initialized")]
    NotInitialized {
        /// Name of the index the operation targeted.
        name: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding provider failure, surfaced unchanged.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index error (HNSW operations).
    #[error("Vector index error: {0}")]
    Vector(String),
}

impl PulseIndexError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a not-initialized error for the named index.
    pub fn not_initialized(name: impl Into<String>) -> Self {
        Self::NotInitialized { name: name.into() }
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a vector index error with the given message.
    pub fn vector(msg: impl Into<String>) -> Self {
        Self::Vector(msg.into())
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a dimension mismatch.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::DimensionMismatch { .. })
        )
    }

    /// Returns true if the index was not in the `Ready` state.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }

    /// Returns true if this is an embedding provider error.
    pub fn is_embedding(&self) -> bool {
        matches!(self, Self::Embedding(_))
    }

    /// Returns true if this is a storage or I/O error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }

    /// Returns true if this is a vector index error.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Persisted data is corrupted.
    #[error("Index data corrupted: {0}")]
    Corrupted(String),

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// The index database is locked by another process.
    #[error("Index database is locked by another process")]
    DatabaseLocked,

    /// Persisted schema version doesn't match the expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found on disk.
        found: u32,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to PulseIndexError for convenience
impl From<redb::TableError> for PulseIndexError {
    fn from(err: redb::TableError) -> Self {
        PulseIndexError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for PulseIndexError {
    fn from(err: redb::StorageError) -> Self {
        PulseIndexError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for PulseIndexError {
    fn from(err: bincode::Error) -> Self {
        PulseIndexError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
/// They are always raised before any mutation takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Vector length doesn't match the index's fixed dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Actual vector length provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Content exceeds maximum allowed size.
    #[error("Content too large: {size} bytes (max: {max} bytes)")]
    ContentTooLarge {
        /// Actual content size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// Too many items in a collection field.
    #[error("Too many items in '{field}': {count} (max: {max})")]
    TooManyItems {
        /// Name of the field.
        field: String,
        /// Actual count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a content too large error.
    pub fn content_too_large(size: usize, max: usize) -> Self {
        Self::ContentTooLarge { size, max }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a too many items error.
    pub fn too_many_items(field: impl Into<String>, count: usize, max: usize) -> Self {
        Self::TooManyItems {
            field: field.into(),
            count,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PulseIndexError::config("Invalid dimension");
        assert_eq!(err.to_string(), "Configuration error: Invalid dimension");
    }

    #[test]
    fn test_not_initialized_display() {
        let err = PulseIndexError::not_initialized("notes");
        assert_eq!(err.to_string(), "Index 'notes' is not initialized");
        assert!(err.is_not_initialized());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SchemaVersionMismatch {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Schema version mismatch: expected 2, found 1"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::dimension_mismatch(3, 5);
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 3, got 5"
        );
    }

    #[test]
    fn test_is_dimension_mismatch() {
        let err: PulseIndexError = ValidationError::dimension_mismatch(384, 768).into();
        assert!(err.is_validation());
        assert!(err.is_dimension_mismatch());

        let err: PulseIndexError = ValidationError::required_field("text").into();
        assert!(err.is_validation());
        assert!(!err.is_dimension_mismatch());
    }

    #[test]
    fn test_vector_error_display() {
        let err = PulseIndexError::vector("HNSW insert failed");
        assert_eq!(err.to_string(), "Vector index error: HNSW insert failed");
        assert!(err.is_vector());
        assert!(!err.is_storage());
    }

    #[test]
    fn test_embedding_error() {
        let err = PulseIndexError::embedding("provider timed out");
        assert_eq!(err.to_string(), "Embedding error: provider timed out");
        assert!(err.is_embedding());
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }

    #[test]
    fn test_io_error_is_storage() {
        let err: PulseIndexError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.is_storage());
    }
}
