//! Plain-file storage backend.
//!
//! Each index is three files in the storage directory:
//!
//! ```text
//! {dir}/{name}.index       HNSW snapshot (bincode)
//! {dir}/{name}.documents   document store snapshot (bincode)
//! {dir}/{name}.meta.json   IndexMetadata (JSON, human-readable)
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place.
//! The metadata goes last and records both blob lengths, so a crash between
//! renames is detected on load as corruption instead of silently pairing a
//! new graph with old documents.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::schema::{IndexMetadata, IndexSnapshot, SCHEMA_VERSION};
use super::StorageBackend;
use crate::error::{PulseIndexError, Result, StorageError};

const INDEX_EXTENSION: &str = "index";
const DOCUMENTS_EXTENSION: &str = "documents";
const METADATA_EXTENSION: &str = "meta.json";

/// Plain-file storage backend.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens a backend rooted at `dir`, creating the directory if needed.
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        info!("File storage opened");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn file_path(&self, name: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, extension))
    }

    /// Path of the HNSW blob for an index.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.file_path(name, INDEX_EXTENSION)
    }

    /// Path of the document blob for an index.
    pub fn documents_path(&self, name: &str) -> PathBuf {
        self.file_path(name, DOCUMENTS_EXTENSION)
    }

    /// Path of the metadata sidecar for an index.
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.file_path(name, METADATA_EXTENSION)
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads a blob that the metadata says must exist.
fn read_required(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::corrupted(format!(
            "Missing blob file {}",
            path.display()
        ))
        .into()),
        Err(e) => Err(e.into()),
    }
}

impl StorageBackend for FileStorage {
    #[instrument(skip(self, snapshot), fields(index = name))]
    fn save(&self, name: &str, snapshot: &IndexSnapshot) -> Result<()> {
        let metadata_json = serde_json::to_vec_pretty(&snapshot.metadata).map_err(StorageError::from)?;

        write_atomic(&self.index_path(name), &snapshot.index)?;
        write_atomic(&self.documents_path(name), &snapshot.documents)?;
        write_atomic(&self.metadata_path(name), &metadata_json)?;

        debug!(
            index_bytes = snapshot.index.len(),
            documents_bytes = snapshot.documents.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(index = name))]
    fn load(&self, name: &str) -> Result<Option<IndexSnapshot>> {
        let metadata_bytes = match fs::read(self.metadata_path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.index_path(name).exists() || self.documents_path(name).exists() {
                    return Err(StorageError::corrupted("Blob files present without metadata").into());
                }
                debug!("No persisted state");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let metadata: IndexMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?;

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

        let snapshot = IndexSnapshot {
            index: read_required(&self.index_path(name))?,
            documents: read_required(&self.documents_path(name))?,
            metadata,
        };
        if !snapshot.is_consistent() {
            return Err(StorageError::corrupted(
                "Blob lengths do not match metadata (interrupted save?)",
            )
            .into());
        }

        debug!(
            documents = snapshot.metadata.document_count,
            vectors = snapshot.metadata.vector_count,
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let mut removed = false;
        for path in [
            self.metadata_path(name),
            self.index_path(name),
            self.documents_path(name),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed {
            info!(index = name, "Persisted state removed");
        }
        Ok(removed)
    }

    fn path(&self) -> &Path {
        &self.dir
    }
}
