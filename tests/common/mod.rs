//! Shared fixtures and test doubles for the pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiki_indexer::indexing::{
    DocumentExtractor, Extractor, ExtractorRegistry, IndexContext, IndexDocument, IndexStore,
    MemoryIndexStore,
};
use wiki_indexer::model::{WikiDocument, WikiObject, WikiProperty};
use wiki_indexer::{
    ContentSource, EntityReference, EntityType, IndexerError, IndexerResult, MemoryContentSource,
    ProgressIndicator,
};

/// Store operation as seen by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Add(String),
    DeleteId(String),
    DeleteQuery(String),
    Commit,
    Rollback,
}

/// Memory store that records every call in order and can fail commits or
/// slow them down
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryIndexStore,
    ops: Mutex<Vec<StoreOp>>,
    /// Number of upcoming commits that fail
    pub failing_commits: AtomicUsize,
    pub commit_delay_ms: AtomicU64,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first_commits(count: usize) -> Self {
        let store = Self::default();
        store.failing_commits.store(count, Ordering::Relaxed);
        store
    }

    pub fn with_commit_delay(delay: Duration) -> Self {
        let store = Self::default();
        store
            .commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
        store
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn added_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Add(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &StoreOp) -> usize {
        self.ops().iter().filter(|op| *op == wanted).count()
    }

    pub fn delete_queries(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::DeleteQuery(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl IndexStore for RecordingStore {
    async fn add(&self, document: IndexDocument) -> IndexerResult<()> {
        self.record(StoreOp::Add(document.id().unwrap_or_default().to_string()));
        self.inner.add(document).await
    }

    async fn delete_by_id(&self, id: &str) -> IndexerResult<()> {
        self.record(StoreOp::DeleteId(id.to_string()));
        self.inner.delete_by_id(id).await
    }

    async fn delete_by_query(&self, query: &str) -> IndexerResult<()> {
        self.record(StoreOp::DeleteQuery(query.to_string()));
        self.inner.delete_by_query(query).await
    }

    async fn commit(&self) -> IndexerResult<()> {
        let delay = self.commit_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.record(StoreOp::Commit);
        let failing = self.failing_commits.load(Ordering::Relaxed);
        if failing > 0 {
            self.failing_commits.store(failing - 1, Ordering::Relaxed);
            return Err(IndexerError::store("commit", "simulated commit failure"));
        }
        self.inner.commit().await
    }

    async fn rollback(&self) -> IndexerResult<()> {
        self.record(StoreOp::Rollback);
        self.inner.rollback().await
    }
}

/// Document extractor that fails for one document name
pub struct FailingExtractor {
    inner: DocumentExtractor,
    failing_name: String,
}

impl FailingExtractor {
    pub fn new(source: Arc<MemoryContentSource>, failing_name: &str) -> Self {
        Self {
            inner: DocumentExtractor::new(source),
            failing_name: failing_name.to_string(),
        }
    }
}

#[async_trait]
impl Extractor for FailingExtractor {
    async fn id(&self, reference: &EntityReference, ctx: &IndexContext) -> IndexerResult<String> {
        self.inner.id(reference, ctx).await
    }

    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>> {
        if reference.name() == self.failing_name {
            return Err(IndexerError::Extraction {
                reference: reference.clone(),
                message: "simulated extraction failure".to_string(),
            });
        }
        self.inner.document(reference, ctx).await
    }
}

pub fn failing_registry(source: Arc<MemoryContentSource>, failing_name: &str) -> ExtractorRegistry {
    ExtractorRegistry::with_defaults(source.clone()).with(
        EntityType::Document,
        Arc::new(FailingExtractor::new(source, failing_name)),
    )
}

pub fn document(title: &str, content: &str) -> WikiDocument {
    WikiDocument {
        title: title.to_string(),
        content: content.to_string(),
        ..Default::default()
    }
}

/// One wiki `w` with space `S` holding `count` documents named `D000`, `D001`...
pub fn numbered_source(count: usize) -> Arc<MemoryContentSource> {
    let source = MemoryContentSource::new();
    for i in 0..count {
        let name = format!("D{:03}", i);
        source.put_document("w", "S", &name, document(&name, "some content"));
    }
    Arc::new(source)
}

/// Content with a translation, attachments and objects
pub fn rich_source() -> Arc<MemoryContentSource> {
    let source = MemoryContentSource::from_json(
        r#"{"wikis": {"xwiki": {
            "Main": {
                "WebHome": {
                    "title": "Home",
                    "content": "Welcome",
                    "locale": "en",
                    "translations": {"fr": {"title": "Accueil", "content": "Bienvenue"}},
                    "attachments": [{"filename": "logo.png", "mime_type": "image/png", "size": 42}]
                }
            },
            "Code": {
                "Config": {
                    "title": "Config",
                    "objects": [{"class": "Code.Settings", "number": 0, "properties": [
                        {"name": "endpoint", "value": "https://example.org"},
                        {"name": "secret", "kind": "password", "value": "hunter2"}
                    ]}]
                }
            }
        }}}"#,
    )
    .unwrap();
    Arc::new(source)
}

pub fn object_with_property(class: &str, property: &str, value: &str) -> WikiObject {
    WikiObject {
        class: class.to_string(),
        number: 0,
        properties: vec![WikiProperty {
            name: property.to_string(),
            value: serde_json::Value::String(value.to_string()),
            ..Default::default()
        }],
    }
}

pub async fn wait_done(progress: &ProgressIndicator) {
    tokio::time::timeout(Duration::from_secs(10), progress.wait())
        .await
        .expect("resync did not complete in time");
}

/// Content source whose listings fail for one space
pub struct FailingSource {
    inner: MemoryContentSource,
    failing_space: String,
}

impl FailingSource {
    pub fn new(inner: MemoryContentSource, failing_space: &str) -> Self {
        Self {
            inner,
            failing_space: failing_space.to_string(),
        }
    }
}

#[async_trait]
impl ContentSource for FailingSource {
    async fn spaces(&self, wiki: &str) -> IndexerResult<Vec<String>> {
        self.inner.spaces(wiki).await
    }

    async fn documents(&self, wiki: &str, space: &str) -> IndexerResult<Vec<String>> {
        if space == self.failing_space {
            return Err(IndexerError::content_source(format!(
                "space '{}' is unavailable",
                space
            )));
        }
        self.inner.documents(wiki, space).await
    }

    async fn document(&self, reference: &EntityReference) -> IndexerResult<Option<WikiDocument>> {
        self.inner.document(reference).await
    }
}
