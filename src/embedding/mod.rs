//! Embedding service abstractions for PulseIndex.
//!
//! The index never computes embeddings itself. Documents added without a
//! vector, and text queries, are sent to an [`EmbeddingService`].
//!
//! # Providers
//!
//! - [`ExternalEmbedding`] - Caller supplies every vector (the default)
//! - Any custom type implementing [`EmbeddingService`], passed to
//!   `IndexService::with_embedding()`
//!
//! # Example
//!
//! ```rust
//! use pulseindex::embedding::{EmbeddingService, ExternalEmbedding};
//!
//! // External mode - user provides embeddings
//! let service = ExternalEmbedding::new(384);
//! assert_eq!(service.dimension(), 384);
//!
//! // Validation only - cannot generate embeddings
//! assert!(service.embed("hello").is_err());
//! ```

use crate::error::{PulseIndexError, Result};
use crate::types::Embedding;
use crate::vector::validate_vector;

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`): searches on
/// different threads may embed their queries concurrently. Failures are
/// surfaced to the caller unchanged; the index never retries.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use pulseindex::embedding::EmbeddingService;
/// use pulseindex::{Embedding, Result};
///
/// struct MyEmbeddingService {
///     client: MyApiClient,
///     dimension: usize,
/// }
///
/// impl EmbeddingService for MyEmbeddingService {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         Ok(self.client.get_embedding(text)?)
///     }
///
///     fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
///         Ok(self.client.get_embeddings(texts)?)
///     }
///
///     fn dimension(&self) -> usize {
///         self.dimension
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `PulseIndexError::Embedding` if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts in one call.
    ///
    /// Must return exactly one embedding per input text, in input order.
    ///
    /// # Errors
    ///
    /// Returns `PulseIndexError::Embedding` if any embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the dimension of embeddings produced by this service.
    fn dimension(&self) -> usize;

    /// Validates that an embedding has the correct dimension and finite values.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if dimensions don't match.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        validate_vector(embedding, self.dimension())
    }
}

/// External embedding provider.
///
/// Used when embeddings are generated outside the index (OpenAI, Cohere, a
/// local model server). It validates dimensions but cannot generate
/// embeddings: every document must carry its vector, and text search fails
/// with an embedding error.
///
/// # Example
///
/// ```rust
/// use pulseindex::embedding::{EmbeddingService, ExternalEmbedding};
///
/// // OpenAI text-embedding-3-small
/// let service = ExternalEmbedding::new(1536);
/// assert_eq!(service.dimension(), 1536);
/// ```
#[derive(Clone, Debug)]
pub struct ExternalEmbedding {
    dimension: usize,
}

impl ExternalEmbedding {
    /// Creates a new external embedding provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingService for ExternalEmbedding {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(PulseIndexError::embedding(
            "External embedding mode: embeddings must be provided by the caller",
        ))
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(PulseIndexError::embedding(
            "External embedding mode: embeddings must be provided by the caller",
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Creates an embedding service based on the configuration.
pub fn create_embedding_service(
    config: &crate::config::Config,
) -> Result<Box<dyn EmbeddingService>> {
    use crate::config::EmbeddingProvider;

    match &config.embedding_provider {
        EmbeddingProvider::External => Ok(Box::new(ExternalEmbedding::new(config.dimension()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_embedding_dimension() {
        let service = ExternalEmbedding::new(384);
        assert_eq!(service.dimension(), 384);
    }

    #[test]
    fn test_external_embedding_embed_returns_error() {
        let service = ExternalEmbedding::new(384);
        let result = service.embed("hello world");
        assert!(result.unwrap_err().is_embedding());
    }

    #[test]
    fn test_external_embedding_embed_batch_returns_error() {
        let service = ExternalEmbedding::new(384);
        let result = service.embed_batch(&["hello", "world"]);
        assert!(result.unwrap_err().is_embedding());
    }

    #[test]
    fn test_validate_embedding_correct_dimension() {
        let service = ExternalEmbedding::new(3);
        let embedding = vec![1.0, 2.0, 3.0];
        assert!(service.validate_embedding(&embedding).is_ok());
    }

    #[test]
    fn test_validate_embedding_wrong_dimension() {
        let service = ExternalEmbedding::new(3);
        let embedding = vec![1.0, 2.0];
        let result = service.validate_embedding(&embedding);
        assert!(result.unwrap_err().is_dimension_mismatch());
    }

    #[test]
    fn test_external_embedding_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExternalEmbedding>();
    }

    #[test]
    fn test_create_embedding_service_external() {
        let config = crate::config::Config::default();
        let service = create_embedding_service(&config).unwrap();
        assert_eq!(service.dimension(), 384);
    }
}
