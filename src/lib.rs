//! Wiki indexer keeps a search index in sync with wiki content.
//!
//! This crate provides the indexing pipeline as a library: callers report
//! changed entities to an [`Indexer`] and the pipeline resolves, extracts and
//! commits them to an [`IndexStore`] in the background.

pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod model;

// Re-export commonly used types for convenience
pub use config::IndexerConfig;
pub use error::{IndexerError, IndexerResult};
pub use indexing::{
    ExtractorRegistry, IndexDocument, IndexStore, Indexer, MemoryIndexStore, ProgressIndicator,
    ReferenceResolver, ResyncRequest,
};
pub use model::{ContentSource, EntityReference, EntityType, MemoryContentSource};
