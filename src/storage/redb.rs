//! redb storage backend.
//!
//! The default backend. Each index lives in its own
//! [redb](https://docs.rs/redb) database file, `{dir}/{name}.redb`.
//!
//! A save writes both blobs and the metadata in a single write transaction
//! into a fresh `{name}.redb.tmp`, then renames it over the live file. The
//! previous snapshot stays intact until the rename, and an unreadable live
//! file never blocks the next save.
//!
//! Database handles are opened per call and dropped before returning, so no
//! file lock outlives a save or load.

use std::fs;
use std::path::{Path, PathBuf};

use ::redb::{Database, DatabaseError};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    IndexMetadata, IndexSnapshot, BLOBS_TABLE, DOCUMENTS_BLOB_KEY, INDEX_BLOB_KEY, METADATA_KEY,
    METADATA_TABLE, SCHEMA_VERSION,
};
use super::StorageBackend;
use crate::error::{PulseIndexError, Result, StorageError};

/// File extension of per-index database files.
const DB_EXTENSION: &str = "redb";

/// Extension of the database file a save is written to before the rename.
const TMP_EXTENSION: &str = "redb.tmp";

/// redb storage backend.
///
/// # Thread Safety
///
/// `RedbStorage` is `Send + Sync`. redb serializes writers to the same file
/// and gives readers MVCC snapshots.
#[derive(Debug)]
pub struct RedbStorage {
    /// Directory holding one database file per index.
    dir: PathBuf,
}

impl RedbStorage {
    /// Opens a backend rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use pulseindex::storage::RedbStorage;
    ///
    /// let storage = RedbStorage::open("./pulseindex")?;
    /// ```
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        info!("redb storage opened");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of the database file for an index.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, DB_EXTENSION))
    }

    /// Creates or opens a redb database file.
    fn create_database(path: &Path) -> Result<Database> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StorageError::DatabaseLocked,
            other => StorageError::from(other),
        })?;
        debug!(path = %path.display(), "Database file opened");
        Ok(db)
    }

    /// Reads a snapshot out of an open database.
    fn read_snapshot(db: &Database) -> Result<IndexSnapshot> {
        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)?
                .ok_or_else(|| StorageError::corrupted("Missing index metadata"))?;

            bincode::deserialize::<IndexMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };

        if !metadata.is_compatible() {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(PulseIndexError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        let blobs = read_txn
            .open_table(BLOBS_TABLE)
            .map_err(|e| StorageError::corrupted(format!("Cannot open blob table: {}", e)))?;
        let index = blobs
            .get(INDEX_BLOB_KEY)?
            .ok_or_else(|| StorageError::corrupted("Missing index blob"))?
            .value()
            .to_vec();
        let documents = blobs
            .get(DOCUMENTS_BLOB_KEY)?
            .ok_or_else(|| StorageError::corrupted("Missing documents blob"))?
            .value()
            .to_vec();

        let snapshot = IndexSnapshot {
            metadata,
            index,
            documents,
        };
        if !snapshot.is_consistent() {
            return Err(StorageError::corrupted("Blob lengths do not match metadata").into());
        }
        Ok(snapshot)
    }
}

impl StorageBackend for RedbStorage {
    #[instrument(skip(self, snapshot), fields(index = name))]
    fn save(&self, name: &str, snapshot: &IndexSnapshot) -> Result<()> {
        let metadata_bytes = bincode::serialize(&snapshot.metadata)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        let path = self.database_path(name);
        let tmp = path.with_extension(TMP_EXTENSION);
        if tmp.exists() {
            warn!(path = %tmp.display(), "Removing leftover file from an interrupted save");
            fs::remove_file(&tmp)?;
        }

        {
            let db = Self::create_database(&tmp)?;

            // Blobs and metadata commit together or not at all
            let write_txn = db.begin_write().map_err(StorageError::from)?;
            {
                let mut blobs = write_txn.open_table(BLOBS_TABLE)?;
                blobs.insert(INDEX_BLOB_KEY, snapshot.index.as_slice())?;
                blobs.insert(DOCUMENTS_BLOB_KEY, snapshot.documents.as_slice())?;

                let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
                meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
            }
            write_txn.commit().map_err(StorageError::from)?;
        }

        fs::rename(&tmp, &path)?;

        debug!(
            index_bytes = snapshot.index.len(),
            documents_bytes = snapshot.documents.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(index = name))]
    fn load(&self, name: &str) -> Result<Option<IndexSnapshot>> {
        let path = self.database_path(name);
        if !path.exists() {
            debug!("No persisted state");
            return Ok(None);
        }

        let db = Self::create_database(&path)?;
        let snapshot = Self::read_snapshot(&db)?;

        debug!(
            documents = snapshot.metadata.document_count,
            vectors = snapshot.metadata.vector_count,
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let path = self.database_path(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        info!(index = name, "Persisted state removed");
        Ok(true)
    }

    fn path(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::DistanceMetric;
    use tempfile::tempdir;

    fn snapshot(index: &[u8], documents: &[u8]) -> IndexSnapshot {
        IndexSnapshot::new(
            IndexMetadata::new("notes", 3, DistanceMetric::Cosine),
            index.to_vec(),
            documents.to_vec(),
        )
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        assert!(!root.exists());

        let storage = RedbStorage::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.path(), root.as_path());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();
        assert!(storage.load("nothing").unwrap().is_none());
        // Loading must not create the file
        assert!(!storage.database_path("nothing").exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        let saved = snapshot(b"graph-bytes", b"document-bytes");
        storage.save("notes", &saved).unwrap();
        assert!(storage.database_path("notes").exists());

        let loaded = storage.load("notes").unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        storage.save("notes", &snapshot(b"v1", b"v1")).unwrap();
        storage.save("notes", &snapshot(b"version-2", b"v2")).unwrap();

        let loaded = storage.load("notes").unwrap().unwrap();
        assert_eq!(loaded.index, b"version-2");
        assert_eq!(loaded.documents, b"v2");
    }

    #[test]
    fn test_save_replaces_unreadable_file() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();
        let path = storage.database_path("notes");
        fs::write(&path, b"not a database").unwrap();

        assert!(storage.load("notes").is_err());

        storage.save("notes", &snapshot(b"x", b"y")).unwrap();
        assert_eq!(storage.load("notes").unwrap().unwrap().index, b"x");
        assert!(!path.with_extension(TMP_EXTENSION).exists());
    }

    #[test]
    fn test_indexes_are_independent() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        storage.save("a", &snapshot(b"a", b"a")).unwrap();
        storage.save("b", &snapshot(b"bb", b"bb")).unwrap();

        assert_eq!(storage.load("a").unwrap().unwrap().index, b"a");
        assert_eq!(storage.load("b").unwrap().unwrap().index, b"bb");
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        assert!(!storage.remove("notes").unwrap());
        storage.save("notes", &snapshot(b"x", b"y")).unwrap();
        assert!(storage.remove("notes").unwrap());
        assert!(storage.load("notes").unwrap().is_none());
    }

    // ====================================================================
    // Corruption Detection Tests
    // ====================================================================

    #[test]
    fn test_corruption_detection_invalid_metadata_bytes() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();
        storage.save("notes", &snapshot(b"x", b"y")).unwrap();

        {
            let db = Database::create(storage.database_path("notes")).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let mut meta = write_txn.open_table(METADATA_TABLE).unwrap();
                meta.insert(METADATA_KEY, b"not-valid-bincode-data".as_slice())
                    .unwrap();
            }
            write_txn.commit().unwrap();
        }

        match storage.load("notes").unwrap_err() {
            PulseIndexError::Storage(StorageError::Corrupted(msg)) => {
                assert!(
                    msg.contains("Invalid metadata format"),
                    "Error should mention invalid format, got: {}",
                    msg
                );
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }

    #[test]
    fn test_corruption_detection_missing_metadata_table() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        // A raw redb database without our tables
        {
            let db = Database::create(storage.database_path("notes")).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let dummy: ::redb::TableDefinition<&str, &str> =
                    ::redb::TableDefinition::new("dummy");
                let mut table = write_txn.open_table(dummy).unwrap();
                table.insert("key", "value").unwrap();
            }
            write_txn.commit().unwrap();
        }

        match storage.load("notes").unwrap_err() {
            PulseIndexError::Storage(StorageError::Corrupted(msg)) => {
                assert!(msg.contains("Cannot open metadata table"), "got: {}", msg);
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path()).unwrap();

        let mut future = snapshot(b"x", b"y");
        future.metadata.schema_version = SCHEMA_VERSION + 1;
        storage.save("notes", &future).unwrap();

        let err = storage.load("notes").unwrap_err();
        assert!(matches!(
            err,
            PulseIndexError::Storage(StorageError::SchemaVersionMismatch { expected, found })
                if expected == SCHEMA_VERSION && found == SCHEMA_VERSION + 1
        ));
    }
}
