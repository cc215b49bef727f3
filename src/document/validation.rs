//! Input validation for documents.
//!
//! Validates [`NewDocument`] fields before anything reaches the index or
//! the store. Size limits are defined as constants in
//! [`crate::storage::schema`].

use crate::error::{PulseIndexError, ValidationError};
use crate::storage::schema::{MAX_ID_LENGTH, MAX_METADATA_ENTRIES, MAX_METADATA_KEY_LENGTH, MAX_TEXT_SIZE};
use crate::vector::validate_vector;

use super::types::NewDocument;

/// Validates a [`NewDocument`] before indexing.
///
/// # Rules
///
/// | Field | Constraint |
/// |-------|------------|
/// | `id` | If present: non-empty, max 512 bytes |
/// | `text` | Max 1 MiB, may be empty |
/// | `metadata` | Max 64 entries, keys non-empty and max 256 bytes |
/// | `embedding` | If present: length equals `dimension`, finite components |
pub(crate) fn validate_new_document(
    doc: &NewDocument,
    dimension: usize,
) -> Result<(), PulseIndexError> {
    if let Some(ref id) = doc.id {
        if id.is_empty() {
            return Err(ValidationError::required_field("id").into());
        }
        if id.as_str().len() > MAX_ID_LENGTH {
            return Err(ValidationError::invalid_field(
                "id",
                format!(
                    "exceeds max length of {} bytes (got {})",
                    MAX_ID_LENGTH,
                    id.as_str().len()
                ),
            )
            .into());
        }
    }

    // Text: max size
    if doc.text.len() > MAX_TEXT_SIZE {
        return Err(ValidationError::content_too_large(doc.text.len(), MAX_TEXT_SIZE).into());
    }

    // Metadata: entry count
    if doc.metadata.len() > MAX_METADATA_ENTRIES {
        return Err(ValidationError::too_many_items(
            "metadata",
            doc.metadata.len(),
            MAX_METADATA_ENTRIES,
        )
        .into());
    }

    // Metadata: key shape
    for key in doc.metadata.keys() {
        if key.is_empty() {
            return Err(
                ValidationError::invalid_field("metadata", "keys must be non-empty").into(),
            );
        }
        if key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(ValidationError::invalid_field(
                "metadata",
                format!(
                    "key exceeds max length of {} bytes (got {})",
                    MAX_METADATA_KEY_LENGTH,
                    key.len()
                ),
            )
            .into());
        }
    }

    if let Some(ref embedding) = doc.embedding {
        validate_vector(embedding, dimension)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NewDocument {
        NewDocument::new("some text").with_embedding(vec![1.0, 0.0, 0.0])
    }

    #[test]
    fn test_valid_document() {
        assert!(validate_new_document(&valid(), 3).is_ok());
        assert!(validate_new_document(&NewDocument::new("no vector yet"), 3).is_ok());
    }

    #[test]
    fn test_empty_text_with_vector_accepted() {
        let empty = NewDocument { text: String::new(), ..valid() };
        assert!(validate_new_document(&empty, 3).is_ok());

        let blank = NewDocument { text: "   ".into(), ..valid() };
        assert!(validate_new_document(&blank, 3).is_ok());
    }

    #[test]
    fn test_text_too_large() {
        let doc = NewDocument {
            text: "x".repeat(MAX_TEXT_SIZE + 1),
            ..valid()
        };
        let err = validate_new_document(&doc, 3).unwrap_err();
        assert!(matches!(
            err,
            PulseIndexError::Validation(ValidationError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        let doc = valid().with_id("");
        assert!(validate_new_document(&doc, 3).unwrap_err().is_validation());
    }

    #[test]
    fn test_too_many_metadata_entries() {
        let mut doc = valid();
        for i in 0..=MAX_METADATA_ENTRIES {
            doc = doc.with_metadata(format!("k{}", i), i as i64);
        }
        let err = validate_new_document(&doc, 3).unwrap_err();
        assert!(matches!(
            err,
            PulseIndexError::Validation(ValidationError::TooManyItems { .. })
        ));
    }

    #[test]
    fn test_empty_metadata_key_rejected() {
        let doc = valid().with_metadata("", true);
        assert!(validate_new_document(&doc, 3).unwrap_err().is_validation());
    }

    #[test]
    fn test_wrong_dimension() {
        let doc = NewDocument::new("t").with_embedding(vec![1.0; 5]);
        assert!(validate_new_document(&doc, 3)
            .unwrap_err()
            .is_dimension_mismatch());
    }
}
