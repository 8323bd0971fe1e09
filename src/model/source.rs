//! Access to the wiki content that has to be indexed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockWriteGuard};
use tracing::warn;

use super::content::WikiDocument;
use super::reference::{EntityReference, EntityType};
use crate::error::{IndexerError, IndexerResult};

/// Read access to wiki content.
///
/// Implementations are shared between the resolve worker and the extractors, so
/// they must be safe to call concurrently.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Names of the spaces of a wiki
    async fn spaces(&self, wiki: &str) -> IndexerResult<Vec<String>>;

    /// Names of the documents of a space
    async fn documents(&self, wiki: &str, space: &str) -> IndexerResult<Vec<String>>;

    /// Default translation of a document, `None` when it does not exist.
    /// Any locale carried by the reference is ignored.
    async fn document(&self, reference: &EntityReference) -> IndexerResult<Option<WikiDocument>>;
}

type SpaceMap = BTreeMap<String, WikiDocument>;
type WikiMap = BTreeMap<String, SpaceMap>;

/// Serialized form of a whole content model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentModel {
    #[serde(default)]
    pub wikis: BTreeMap<String, WikiMap>,
}

/// In-memory content source over ordered maps, iteration order is name order
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    wikis: RwLock<BTreeMap<String, WikiMap>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_model(model: ContentModel) -> Self {
        Self {
            wikis: RwLock::new(model.wikis),
        }
    }

    pub fn from_json(json: &str) -> IndexerResult<Self> {
        let model: ContentModel = serde_json::from_str(json)?;
        Ok(Self::from_model(model))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read content model: {:?}", path.as_ref()))?;
        let source = Self::from_json(&content).context("Failed to parse content model")?;
        Ok(source)
    }

    /// Create or replace a document
    pub fn put_document(&self, wiki: &str, space: &str, name: &str, document: WikiDocument) {
        self.write()
            .entry(wiki.to_string())
            .or_default()
            .entry(space.to_string())
            .or_default()
            .insert(name.to_string(), document);
    }

    /// Remove a document, dropping its space once empty
    pub fn remove_document(&self, wiki: &str, space: &str, name: &str) -> Option<WikiDocument> {
        let mut wikis = self.write();
        let spaces = wikis.get_mut(wiki)?;
        let documents = spaces.get_mut(space)?;
        let removed = documents.remove(name);
        if documents.is_empty() {
            spaces.remove(space);
        }
        removed
    }

    /// Wiki names in name order
    pub fn wikis(&self) -> Vec<String> {
        self.wikis
            .read()
            .map(|wikis| wikis.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document_count(&self) -> usize {
        self.wikis
            .read()
            .map(|wikis| {
                wikis
                    .values()
                    .flat_map(|spaces| spaces.values())
                    .map(|documents| documents.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Write access, taking over a lock poisoned by a panicking writer
    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, WikiMap>> {
        self.wikis.write().unwrap_or_else(|poisoned| {
            warn!("Content lock was poisoned by a panicking writer, recovering");
            self.wikis.clear_poison();
            poisoned.into_inner()
        })
    }

    fn read(&self) -> IndexerResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, WikiMap>>> {
        self.wikis
            .read()
            .map_err(|_| IndexerError::content_source("content lock poisoned"))
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn spaces(&self, wiki: &str) -> IndexerResult<Vec<String>> {
        Ok(self
            .read()?
            .get(wiki)
            .map(|spaces| spaces.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn documents(&self, wiki: &str, space: &str) -> IndexerResult<Vec<String>> {
        Ok(self
            .read()?
            .get(wiki)
            .and_then(|spaces| spaces.get(space))
            .map(|documents| documents.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn document(&self, reference: &EntityReference) -> IndexerResult<Option<WikiDocument>> {
        let document = reference
            .extract(EntityType::Document)
            .ok_or_else(|| {
                IndexerError::content_source(format!("'{}' is not inside a document", reference))
            })?;
        let (Some(wiki), Some(space)) = (document.wiki_name(), document.space_name()) else {
            return Ok(None);
        };

        Ok(self
            .read()?
            .get(wiki)
            .and_then(|spaces| spaces.get(space))
            .and_then(|documents| documents.get(document.name()))
            .cloned())
    }
}
