//! Decoding arbitrary bytes as persisted state must fail cleanly, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pulseindex::document::DocumentStore;
use pulseindex::{HnswIndex, VectorIndex};

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = HnswIndex::from_bytes(data) {
        // Anything that decodes must be searchable
        if index.dimension() <= 4096 {
            let query = vec![0.5; index.dimension()];
            let _ = index.search(&query, 3, 10);
        }
    }
    let _ = DocumentStore::from_bytes(data);
});
