//! Asynchronous indexing pipeline
//!
//! Change notifications go through two FIFO stages:
//! - the resolve stage expands coarse references (a wiki, a space, a whole
//!   document) into per-entity index requests;
//! - the batch stage turns those into index documents and commits them to the
//!   store in bounded batches.
//!
//! Resyncs are tracked with a [`ProgressIndicator`] that travels through both
//! stages behind the work it measures.

pub mod batch;
pub mod context;
pub mod document;
pub mod extractor;
pub mod indexer;
pub mod progress;
pub mod query;
pub mod queue;
pub mod request;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use batch::{BatchAccumulator, BatchLimits, FlushOutcome};
pub use context::IndexContext;
pub use document::{FieldValue, IndexDocument};
pub use extractor::{
    AttachmentExtractor, DocumentExtractor, Extractor, ExtractorRegistry, ObjectExtractor,
    PropertyExtractor,
};
pub use indexer::{Indexer, IndexerStats, IndexerStatsSnapshot};
pub use progress::ProgressIndicator;
pub use query::{entity_id, subtree_query};
pub use queue::{QueueProbe, QueueSnapshot};
pub use request::{IndexRequest, IndexTarget, Operation, ResolveRequest, ResyncRequest};
pub use resolver::ReferenceResolver;
pub use store::{IndexStore, MemoryIndexStore};
