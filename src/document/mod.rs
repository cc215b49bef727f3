//! Documents and the in-memory document store.
//!
//! A [`Document`] is the unit callers add and get back from search: text,
//! an optional embedding, and free-form metadata. The [`DocumentStore`] is
//! the source of truth for an index; the HNSW graph is rebuilt from it.

pub mod store;
pub mod types;
pub(crate) mod validation;

pub use store::DocumentStore;
pub use types::{Document, Metadata, MetadataValue, NewDocument};
