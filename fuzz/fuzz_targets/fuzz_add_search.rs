//! Arbitrary documents and queries against a small in-memory index.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pulseindex::{Config, EmbeddingDimension, IndexService, NewDocument};

const DIM: usize = 4;

fuzz_target!(|data: (Vec<(String, Vec<f32>)>, Vec<f32>, u8)| {
    let (docs, query, k) = data;
    let Ok(service) = IndexService::open("fuzz", Config::in_memory(EmbeddingDimension::Custom(DIM)))
    else {
        return;
    };

    let docs = docs
        .into_iter()
        .take(64)
        .map(|(text, vector)| NewDocument::new(text).with_embedding(vector))
        .collect();

    // Invalid input is rejected as a whole; valid input must be searchable
    if service.add_documents(docs).is_ok() {
        if let Ok(hits) = service.similarity_search(&query, k as usize, None) {
            assert!(hits.len() <= k as usize);
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
});
