//! Accumulation of store writes into bounded commits.
//!
//! Documents are buffered until the batch reaches its entry count or textual
//! length limit. Deletes go to the store right away, after any buffered add,
//! so the store sees operations in submission order. A failed commit is rolled
//! back.

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::document::IndexDocument;
use super::store::IndexStore;

/// Limits deciding when the accumulator flushes on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum number of add/delete entries per commit
    pub max_size: usize,
    /// Maximum cumulative textual length of pending documents
    pub max_length: usize,
}

/// Outcome of one flush, used for statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub added: usize,
    pub failed_adds: usize,
    pub committed: bool,
    pub commit_failed: bool,
    pub rolled_back: bool,
}

/// Groups index operations into commits against the store.
///
/// Documents are buffered and pushed at flush time, deletes are sent to the
/// store immediately but still count toward the batch size. Buffered documents
/// are pushed ahead of a delete so the store sees operations in queue order.
/// Store failures are logged and never escape.
pub struct BatchAccumulator {
    store: Arc<dyn IndexStore>,
    limits: BatchLimits,
    pending: Vec<IndexDocument>,
    length: usize,
    count: usize,
    /// Adds pushed to the store since the last commit
    added: usize,
    failed_adds: usize,
}

impl BatchAccumulator {
    pub fn new(store: Arc<dyn IndexStore>, limits: BatchLimits) -> Self {
        Self {
            store,
            limits,
            pending: Vec::new(),
            length: 0,
            count: 0,
            added: 0,
            failed_adds: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Buffer a document, flushing when a limit is reached.
    /// Returns the flush outcome when one happened.
    pub async fn add(&mut self, document: IndexDocument) -> Option<FlushOutcome> {
        self.length += document.length();
        self.count += 1;
        self.pending.push(document);
        self.flush_if_full().await
    }

    pub async fn delete_by_id(&mut self, id: &str) -> Option<FlushOutcome> {
        self.push_pending().await;
        if let Err(e) = self.store.delete_by_id(id).await {
            warn!("Failed to delete '{}' from the index: {}", id, e);
        }
        self.count += 1;
        self.flush_if_full().await
    }

    pub async fn delete_by_query(&mut self, query: &str) -> Option<FlushOutcome> {
        self.push_pending().await;
        if let Err(e) = self.store.delete_by_query(query).await {
            warn!("Failed to delete '{}' from the index: {}", query, e);
        }
        self.count += 1;
        self.flush_if_full().await
    }

    async fn flush_if_full(&mut self) -> Option<FlushOutcome> {
        if self.length >= self.limits.max_length || self.count >= self.limits.max_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    async fn push_pending(&mut self) {
        for document in self.pending.drain(..) {
            let id = document.id().unwrap_or_default().to_string();
            match self.store.add(document).await {
                Ok(()) => self.added += 1,
                Err(e) => {
                    self.failed_adds += 1;
                    warn!("Failed to add '{}' to the index: {}", id, e);
                }
            }
        }
    }

    /// Push pending documents and commit. A failed commit is rolled back.
    /// Counters reset whatever happens.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.count == 0 {
            return FlushOutcome::default();
        }

        debug!(
            "Flushing batch: {} entries, {} pending documents, length {}",
            self.count,
            self.pending.len(),
            self.length
        );

        self.push_pending().await;
        let mut outcome = FlushOutcome {
            added: std::mem::take(&mut self.added),
            failed_adds: std::mem::take(&mut self.failed_adds),
            ..Default::default()
        };
        self.length = 0;
        self.count = 0;

        match self.store.commit().await {
            Ok(()) => outcome.committed = true,
            Err(e) => {
                outcome.commit_failed = true;
                error!("Failed to commit index batch: {}", e);
                match self.store.rollback().await {
                    Ok(()) => outcome.rolled_back = true,
                    Err(e) => error!("Failed to roll back index batch: {}", e),
                }
            }
        }

        outcome
    }
}

impl std::fmt::Debug for BatchAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAccumulator")
            .field("limits", &self.limits)
            .field("pending", &self.pending.len())
            .field("length", &self.length)
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexerError, IndexerResult};
    use crate::indexing::store::MemoryIndexStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn document(id: &str, content: &str) -> IndexDocument {
        let mut document = IndexDocument::new();
        document.set_field("id", id);
        document.set_field("doccontent", content);
        document
    }

    fn limits(max_size: usize, max_length: usize) -> BatchLimits {
        BatchLimits {
            max_size,
            max_length,
        }
    }

    #[tokio::test]
    async fn test_flushes_on_size() {
        let store = Arc::new(MemoryIndexStore::new());
        let mut batch = BatchAccumulator::new(store.clone(), limits(2, 10_000));

        assert!(batch.add(document("a", "x")).await.is_none());
        let outcome = batch.add(document("b", "y")).await.unwrap();
        assert_eq!(outcome.added, 2);
        assert!(outcome.committed);
        assert!(batch.is_empty());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_flushes_on_length() {
        let store = Arc::new(MemoryIndexStore::new());
        let mut batch = BatchAccumulator::new(store.clone(), limits(50, 10));

        assert!(batch.add(document("a", "12345")).await.is_none());
        assert!(batch.length() > 5);
        assert!(batch.add(document("b", "1234567890")).await.is_some());
        assert_eq!(batch.length(), 0);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_deletes_count_toward_batch() {
        let store = Arc::new(MemoryIndexStore::new());
        let mut batch = BatchAccumulator::new(store.clone(), limits(2, 10_000));
        batch.add(document("a", "x")).await;
        batch.flush().await;

        assert!(batch.delete_by_id("a").await.is_none());
        assert_eq!(batch.count(), 1);
        assert!(batch.delete_by_query("id:b").await.is_some());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_follows_earlier_add() {
        let store = Arc::new(MemoryIndexStore::new());
        let mut batch = BatchAccumulator::new(store.clone(), limits(10, 10_000));
        batch.add(document("a", "x")).await;
        batch.add(document("b", "y")).await;
        batch.delete_by_id("a").await;

        let outcome = batch.flush().await;
        assert_eq!(outcome.added, 2);
        assert_eq!(store.ids().await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_commit() {
        let store = Arc::new(MemoryIndexStore::new());
        let mut batch = BatchAccumulator::new(store.clone(), limits(2, 10));
        assert_eq!(batch.flush().await, FlushOutcome::default());
        assert_eq!(store.commit_count(), 0);
    }

    #[derive(Default)]
    struct FailingStore {
        fail_commit: AtomicBool,
        fail_rollback: AtomicBool,
        rollbacks: AtomicUsize,
    }

    #[async_trait]
    impl IndexStore for FailingStore {
        async fn add(&self, document: IndexDocument) -> IndexerResult<()> {
            if document.id() == Some("bad") {
                return Err(IndexerError::store("add", "rejected"));
            }
            Ok(())
        }

        async fn delete_by_id(&self, _id: &str) -> IndexerResult<()> {
            Err(IndexerError::store("delete_by_id", "unavailable"))
        }

        async fn delete_by_query(&self, _query: &str) -> IndexerResult<()> {
            Ok(())
        }

        async fn commit(&self) -> IndexerResult<()> {
            if self.fail_commit.load(Ordering::Relaxed) {
                Err(IndexerError::store("commit", "disk full"))
            } else {
                Ok(())
            }
        }

        async fn rollback(&self) -> IndexerResult<()> {
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
            if self.fail_rollback.load(Ordering::Relaxed) {
                Err(IndexerError::store("rollback", "gone"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_failed_add_still_commits_the_rest() {
        let store = Arc::new(FailingStore::default());
        let mut batch = BatchAccumulator::new(store.clone(), limits(10, 10_000));
        batch.add(document("bad", "x")).await;
        batch.add(document("good", "y")).await;

        let outcome = batch.flush().await;
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failed_adds, 1);
        assert!(outcome.committed);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let store = Arc::new(FailingStore::default());
        store.fail_commit.store(true, Ordering::Relaxed);
        let mut batch = BatchAccumulator::new(store.clone(), limits(10, 10_000));
        batch.add(document("a", "x")).await;

        let outcome = batch.flush().await;
        assert!(!outcome.committed);
        assert!(outcome.commit_failed);
        assert!(outcome.rolled_back);
        assert_eq!(store.rollbacks.load(Ordering::Relaxed), 1);
        assert!(batch.is_empty());

        // Rollback failure is only logged
        store.fail_rollback.store(true, Ordering::Relaxed);
        batch.add(document("b", "x")).await;
        let outcome = batch.flush().await;
        assert!(!outcome.committed);
        assert!(!outcome.rolled_back);
    }

    #[tokio::test]
    async fn test_failed_delete_still_counts() {
        let store = Arc::new(FailingStore::default());
        let mut batch = BatchAccumulator::new(store, limits(1, 10_000));
        let outcome = batch.delete_by_id("a").await.unwrap();
        assert!(outcome.committed);
    }
}
