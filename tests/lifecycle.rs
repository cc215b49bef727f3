//! Integration tests for IndexService lifecycle operations.
//!
//! These tests verify the end-to-end behavior of:
//! - Creating and initializing new indexes
//! - Reopening existing indexes
//! - Configuration and name validation
//! - The Uninitialized → Ready → Closed state machine
//! - Resource cleanup on close

use pulseindex::{
    Config, EmbeddingDimension, IndexService, IndexState, NewDocument, PersistMode,
    PulseIndexError, StorageBackendKind, ValidationError,
};
use tempfile::tempdir;

fn doc(id: &str, v: [f32; 3]) -> NewDocument {
    NewDocument::new(format!("document {}", id))
        .with_id(id)
        .with_embedding(v.to_vec())
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_open_creates_storage_file() {
    let dir = tempdir().unwrap();
    let config = Config::with_storage(dir.path(), EmbeddingDimension::Custom(3));

    let service = IndexService::open("notes", config).unwrap();
    service.add_documents(vec![doc("A", [1.0, 0.0, 0.0])]).unwrap();

    // EveryWrite: the add was saved
    assert!(dir.path().join("notes.redb").exists());

    service.close().unwrap();
}

#[test]
fn test_open_with_default_config() {
    let dir = tempdir().unwrap();
    let config = Config {
        storage_path: dir.path().to_path_buf(),
        ..Default::default()
    };

    let service = IndexService::open("default", config).unwrap();

    assert_eq!(service.dimension(), 384);
    assert_eq!(service.config().persist_mode, PersistMode::EveryWrite);
    assert!(service.config().embedding_provider.is_external());
    assert!(service.is_empty().unwrap());

    service.close().unwrap();
}

#[test]
fn test_open_with_custom_dimension() {
    let config = Config::in_memory(EmbeddingDimension::Custom(1536)); // OpenAI ada-002
    let service = IndexService::open("openai", config).unwrap();

    assert_eq!(service.dimension(), 1536);
    assert_eq!(service.stats().unwrap().dimension, 1536);
}

#[test]
fn test_new_does_not_touch_disk() {
    let dir = tempdir().unwrap();
    let storage = dir.path().join("nested");
    let config = Config::with_storage(&storage, EmbeddingDimension::Custom(3));

    let service = IndexService::new("lazy", config).unwrap();
    assert_eq!(service.state(), IndexState::Uninitialized);
    assert!(!storage.exists());

    service.init().unwrap();
    assert!(storage.exists());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_dimension_rejected() {
    let config = Config::in_memory(EmbeddingDimension::Custom(0));
    let err = IndexService::new("bad", config).unwrap_err();
    assert!(matches!(
        err,
        PulseIndexError::Validation(ValidationError::InvalidField { .. })
    ));
}

#[test]
fn test_invalid_hnsw_config_rejected() {
    let mut config = Config::in_memory(EmbeddingDimension::Custom(3));
    config.hnsw.max_nb_connection = 1;
    assert!(IndexService::new("bad", config).unwrap_err().is_validation());
}

#[test]
fn test_invalid_index_names_rejected() {
    for name in ["", ".hidden", "a/b", "a\\b", "sp ace"] {
        let config = Config::in_memory(EmbeddingDimension::Custom(3));
        let result = IndexService::new(name, config);
        assert!(result.unwrap_err().is_validation(), "name {:?} accepted", name);
    }
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn test_operations_require_init() {
    let service =
        IndexService::new("idle", Config::in_memory(EmbeddingDimension::Custom(3))).unwrap();

    assert!(service
        .add_documents(vec![doc("A", [1.0, 0.0, 0.0])])
        .unwrap_err()
        .is_not_initialized());
    assert!(service
        .similarity_search(&[1.0, 0.0, 0.0], 1, None)
        .unwrap_err()
        .is_not_initialized());
    assert!(service.delete(["A"]).unwrap_err().is_not_initialized());
    assert!(service.flush().unwrap_err().is_not_initialized());
    assert!(service.stats().unwrap_err().is_not_initialized());
}

#[test]
fn test_init_is_idempotent() {
    let service =
        IndexService::open("twice", Config::in_memory(EmbeddingDimension::Custom(3))).unwrap();
    service.add_documents(vec![doc("A", [1.0, 0.0, 0.0])]).unwrap();

    // Re-init must not reset the loaded state
    service.init().unwrap();
    assert_eq!(service.len().unwrap(), 1);
}

#[test]
fn test_closed_is_terminal() {
    let service =
        IndexService::open("done", Config::in_memory(EmbeddingDimension::Custom(3))).unwrap();
    service.close().unwrap();

    assert_eq!(service.state(), IndexState::Closed);
    assert!(service.init().unwrap_err().is_not_initialized());
    assert!(service.len().unwrap_err().is_not_initialized());
    assert!(service.close().unwrap_err().is_not_initialized());
}

#[test]
fn test_close_uninitialized() {
    let service =
        IndexService::new("never", Config::in_memory(EmbeddingDimension::Custom(3))).unwrap();
    service.close().unwrap();
    assert_eq!(service.state(), IndexState::Closed);
}

// ============================================================================
// Reopen
// ============================================================================

#[test]
fn test_reopen_existing_index() {
    for backend in [StorageBackendKind::Redb, StorageBackendKind::Files] {
        let dir = tempdir().unwrap();
        let config = Config {
            storage_backend: backend,
            ..Config::with_storage(dir.path(), EmbeddingDimension::Custom(3))
        };

        {
            let service = IndexService::open("memory", config.clone()).unwrap();
            service
                .add_documents(vec![doc("A", [1.0, 0.0, 0.0]), doc("B", [0.0, 1.0, 0.0])])
                .unwrap();
            service.close().unwrap();
        }

        let service = IndexService::open("memory", config).unwrap();
        assert_eq!(service.len().unwrap(), 2, "backend {:?}", backend);
        let a = service.get_document(&"A".into()).unwrap().unwrap();
        assert_eq!(a.text, "document A");
        service.close().unwrap();
    }
}

#[test]
fn test_separate_names_are_isolated() {
    let dir = tempdir().unwrap();
    let config = Config::with_storage(dir.path(), EmbeddingDimension::Custom(3));

    let first = IndexService::open("first", config.clone()).unwrap();
    let second = IndexService::open("second", config).unwrap();

    first.add_documents(vec![doc("A", [1.0, 0.0, 0.0])]).unwrap();

    assert_eq!(first.len().unwrap(), 1);
    assert_eq!(second.len().unwrap(), 0);

    first.close().unwrap();
    second.close().unwrap();
}

#[test]
fn test_on_close_mode_saves_only_on_close() {
    let dir = tempdir().unwrap();
    let config = Config {
        persist_mode: PersistMode::OnClose,
        ..Config::with_storage(dir.path(), EmbeddingDimension::Custom(3))
    };

    let service = IndexService::open("deferred", config.clone()).unwrap();
    service.add_documents(vec![doc("A", [1.0, 0.0, 0.0])]).unwrap();
    assert!(!dir.path().join("deferred.redb").exists());

    service.close().unwrap();
    assert!(dir.path().join("deferred.redb").exists());

    let reopened = IndexService::open("deferred", config).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
}

#[test]
fn test_service_is_shareable_across_threads() {
    use std::sync::Arc;
    use std::thread;

    let service = Arc::new(
        IndexService::open("shared", Config::in_memory(EmbeddingDimension::Custom(3))).unwrap(),
    );
    service
        .add_documents(vec![doc("A", [1.0, 0.0, 0.0]), doc("B", [0.0, 1.0, 0.0])])
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let id = format!("T{}", i);
                service
                    .add_documents(vec![doc(&id, [0.0, 0.0, 1.0])])
                    .unwrap();
                let hits = service.similarity_search(&[1.0, 0.0, 0.0], 1, None).unwrap();
                assert_eq!(hits[0].id.as_str(), "A");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(service.len().unwrap(), 6);
}
