use crate::model::EntityReference;

/// Error types raised inside the indexing pipeline.
///
/// None of these ever reach the callers of `Indexer::index` or `Indexer::delete`:
/// the workers log them and move on to the next entry.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Failed to resolve indexable references for '{reference}': {message}")]
    Resolution {
        reference: EntityReference,
        message: String,
    },

    #[error("Failed to extract index document for '{reference}': {message}")]
    Extraction {
        reference: EntityReference,
        message: String,
    },

    #[error("Content source error: {message}")]
    ContentSource { message: String },

    #[error("Index store operation '{operation}' failed: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    #[error("Invalid entity reference '{input}': {message}")]
    InvalidReference { input: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexerError {
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        IndexerError::Store {
            operation,
            message: message.into(),
        }
    }

    pub fn content_source(message: impl Into<String>) -> Self {
        IndexerError::ContentSource {
            message: message.into(),
        }
    }
}

pub type IndexerResult<T> = std::result::Result<T, IndexerError>;
