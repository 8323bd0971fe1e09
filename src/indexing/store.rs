//! Backing index store interface and an in-memory implementation.
//!
//! Only the batch worker talks to the store, so commit and rollback calls are
//! naturally serialized.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::document::IndexDocument;
use super::query::unescape_query_value;
use crate::error::{IndexerError, IndexerResult};

/// Narrow add/delete/commit/rollback interface of the search backend
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn add(&self, document: IndexDocument) -> IndexerResult<()>;

    async fn delete_by_id(&self, id: &str) -> IndexerResult<()>;

    async fn delete_by_query(&self, query: &str) -> IndexerResult<()>;

    async fn commit(&self) -> IndexerResult<()>;

    async fn rollback(&self) -> IndexerResult<()>;
}

#[derive(Debug, Clone)]
enum PendingChange {
    Add(IndexDocument),
    DeleteId(String),
    DeleteQuery(Vec<(String, String)>),
}

/// Parse the conjunctive `field:value AND field:value` form
fn parse_query(query: &str) -> IndexerResult<Vec<(String, String)>> {
    query
        .split(" AND ")
        .map(|clause| {
            let clause = clause.trim();
            let mut chars = clause.char_indices();
            while let Some((index, c)) = chars.next() {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    ':' => {
                        return Ok((
                            clause[..index].to_string(),
                            unescape_query_value(&clause[index + 1..]),
                        ))
                    }
                    _ => {}
                }
            }
            Err(IndexerError::store(
                "delete_by_query",
                format!("unsupported query clause '{}'", clause),
            ))
        })
        .collect()
}

fn matches(document: &IndexDocument, clauses: &[(String, String)]) -> bool {
    clauses.iter().all(|(field, value)| {
        document
            .get(field)
            .is_some_and(|values| values.iter().any(|v| v.as_query_text() == *value))
    })
}

/// In-memory store that stages changes until commit, keyed by document id
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    committed: RwLock<BTreeMap<String, IndexDocument>>,
    pending: RwLock<Vec<PendingChange>>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed documents in id order
    pub async fn documents(&self) -> Vec<IndexDocument> {
        self.committed.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<IndexDocument> {
        self.committed.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.committed.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.committed.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rollback_count(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn add(&self, document: IndexDocument) -> IndexerResult<()> {
        if document.id().is_none() {
            return Err(IndexerError::store("add", "document has no id"));
        }
        self.pending.write().await.push(PendingChange::Add(document));
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> IndexerResult<()> {
        self.pending
            .write()
            .await
            .push(PendingChange::DeleteId(id.to_string()));
        Ok(())
    }

    async fn delete_by_query(&self, query: &str) -> IndexerResult<()> {
        let clauses = parse_query(query)?;
        self.pending
            .write()
            .await
            .push(PendingChange::DeleteQuery(clauses));
        Ok(())
    }

    async fn commit(&self) -> IndexerResult<()> {
        let changes = std::mem::take(&mut *self.pending.write().await);
        let mut committed = self.committed.write().await;

        for change in changes {
            match change {
                PendingChange::Add(document) => {
                    if let Some(id) = document.id().map(str::to_string) {
                        committed.insert(id, document);
                    }
                }
                PendingChange::DeleteId(id) => {
                    committed.remove(&id);
                }
                PendingChange::DeleteQuery(clauses) => {
                    committed.retain(|_, document| !matches(document, &clauses));
                }
            }
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Committed index store ({} documents)", committed.len());
        Ok(())
    }

    async fn rollback(&self) -> IndexerResult<()> {
        let discarded = {
            let mut pending = self.pending.write().await;
            let discarded = pending.len();
            pending.clear();
            discarded
        };
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        debug!("Rolled back {} pending index changes", discarded);
        Ok(())
    }
}
