//! Conversion of entity references into index documents.
//!
//! One extractor is registered per entity type. Types without an extractor
//! (wikis, spaces) are simply not indexable and get skipped by the batch worker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::context::IndexContext;
use super::document::IndexDocument;
use super::query::{
    entity_id, FIELD_CLASS, FIELD_FULLNAME, FIELD_HIDDEN, FIELD_ID, FIELD_LANGUAGE, FIELD_LOCALE,
    FIELD_NAME, FIELD_NUMBER, FIELD_SPACE, FIELD_TYPE, FIELD_WIKI,
};
use crate::error::{IndexerError, IndexerResult};
use crate::model::{ContentSource, EntityReference, EntityType, WikiDocument};

pub const FIELD_TITLE: &str = "title";
pub const FIELD_DOCUMENT_CONTENT: &str = "doccontent";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_MIME_TYPE: &str = "mimetype";
pub const FIELD_ATTACHMENT_LENGTH: &str = "attlength";
pub const FIELD_ATTACHMENT_CONTENT: &str = "attcontent";
pub const FIELD_OBJECT_CONTENT: &str = "objcontent";
pub const FIELD_PROPERTY_NAME: &str = "propertyname";
pub const FIELD_PROPERTY_VALUE: &str = "propertyvalue";

/// Converts references of one entity type into index payloads
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identifier of the entity in the index, used for deletes
    async fn id(&self, reference: &EntityReference, ctx: &IndexContext) -> IndexerResult<String>;

    /// Payload for the entity, `None` when it does not exist (anymore) or must
    /// not be indexed
    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>>;
}

/// Extractors keyed by the entity type they handle, built once at startup
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<EntityType, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the extractors for documents, attachments, objects and
    /// object properties
    pub fn with_defaults(source: Arc<dyn ContentSource>) -> Self {
        Self::new()
            .with(
                EntityType::Document,
                Arc::new(DocumentExtractor::new(source.clone())),
            )
            .with(
                EntityType::Attachment,
                Arc::new(AttachmentExtractor::new(source.clone())),
            )
            .with(
                EntityType::Object,
                Arc::new(ObjectExtractor::new(source.clone())),
            )
            .with(
                EntityType::ObjectProperty,
                Arc::new(PropertyExtractor::new(source)),
            )
    }

    pub fn with(mut self, entity_type: EntityType, extractor: Arc<dyn Extractor>) -> Self {
        self.register(entity_type, extractor);
        self
    }

    pub fn register(&mut self, entity_type: EntityType, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(entity_type, extractor);
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&Arc<dyn Extractor>> {
        self.extractors.get(&entity_type)
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.extractors.keys().collect();
        types.sort();
        f.debug_struct("ExtractorRegistry")
            .field("types", &types)
            .finish()
    }
}

async fn load_document(
    source: &dyn ContentSource,
    reference: &EntityReference,
) -> IndexerResult<Option<WikiDocument>> {
    source
        .document(reference)
        .await
        .map_err(|e| IndexerError::Extraction {
            reference: reference.clone(),
            message: e.to_string(),
        })
}

/// Language part of a locale, `pt_BR` gives `pt`
fn language_of(locale: &str) -> &str {
    locale.split(&['_', '-'][..]).next().unwrap_or(locale)
}

/// Index id of an entity, derived from the reference alone so that deletes
/// still find entities that are gone from the content source
fn reference_id(reference: &EntityReference) -> String {
    entity_id(reference, reference.locale().unwrap_or_default())
}

/// Fields shared by every entity: identity plus the owning document's
/// location, visibility and locale
fn set_common_fields(
    payload: &mut IndexDocument,
    reference: &EntityReference,
    document: &WikiDocument,
    locale: &str,
) {
    payload.set_field(FIELD_ID, reference_id(reference));
    payload.set_field(FIELD_TYPE, reference.entity_type().as_str());
    payload.set_field(FIELD_HIDDEN, document.hidden);
    if let Some(wiki) = reference.wiki_name() {
        payload.set_field(FIELD_WIKI, wiki);
    }
    if let Some(space) = reference.space_name() {
        payload.set_field(FIELD_SPACE, space);
    }
    if let Some(name) = reference.document_name() {
        payload.set_field(FIELD_NAME, name);
    }
    if let Some(fullname) = reference.local_document_name() {
        payload.set_field(FIELD_FULLNAME, fullname);
    }
    payload.set_field(FIELD_LOCALE, locale);
    payload.set_field(FIELD_LANGUAGE, language_of(locale));
}

fn set_object_fields(payload: &mut IndexDocument, reference: &EntityReference) {
    if let Some(class) = reference.object_class() {
        payload.set_field(FIELD_CLASS, class);
    }
    if let Some(number) = reference.object_number() {
        payload.set_field(FIELD_NUMBER, number);
    }
}

pub struct DocumentExtractor {
    source: Arc<dyn ContentSource>,
}

impl DocumentExtractor {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Extractor for DocumentExtractor {
    /// The default translation has no locale suffix, translations carry
    /// `_<locale>`
    async fn id(&self, reference: &EntityReference, _ctx: &IndexContext) -> IndexerResult<String> {
        Ok(reference_id(reference))
    }

    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>> {
        let Some(document) = load_document(self.source.as_ref(), reference).await? else {
            return Ok(None);
        };

        let (locale, title, content) = match reference.locale() {
            Some(locale) if locale != document.locale => match document.translation(locale) {
                Some(translation) => (locale, &translation.title, &translation.content),
                None => return Ok(None),
            },
            _ => (
                ctx.locale_or_default(&document.locale),
                &document.title,
                &document.content,
            ),
        };

        let mut payload = IndexDocument::new();
        set_common_fields(&mut payload, reference, &document, locale);
        payload.set_field(FIELD_TITLE, title.as_str());
        payload.set_field(FIELD_DOCUMENT_CONTENT, content.as_str());
        Ok(Some(payload))
    }
}

pub struct AttachmentExtractor {
    source: Arc<dyn ContentSource>,
}

impl AttachmentExtractor {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Extractor for AttachmentExtractor {
    async fn id(&self, reference: &EntityReference, _ctx: &IndexContext) -> IndexerResult<String> {
        Ok(reference_id(reference))
    }

    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>> {
        let Some(document) = load_document(self.source.as_ref(), reference).await? else {
            return Ok(None);
        };
        let Some(attachment) = document.attachment(reference.name()) else {
            return Ok(None);
        };

        let mut payload = IndexDocument::new();
        set_common_fields(
            &mut payload,
            reference,
            &document,
            ctx.locale_or_default(&document.locale),
        );
        payload.set_field(FIELD_FILENAME, attachment.filename.as_str());
        payload.set_field(FIELD_MIME_TYPE, attachment.mime_type.as_str());
        payload.set_field(
            FIELD_ATTACHMENT_LENGTH,
            i64::try_from(attachment.size).unwrap_or(i64::MAX),
        );
        if let Some(content) = &attachment.content {
            payload.set_field(FIELD_ATTACHMENT_CONTENT, content.as_str());
        }
        Ok(Some(payload))
    }
}

pub struct ObjectExtractor {
    source: Arc<dyn ContentSource>,
}

impl ObjectExtractor {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Extractor for ObjectExtractor {
    async fn id(&self, reference: &EntityReference, _ctx: &IndexContext) -> IndexerResult<String> {
        Ok(reference_id(reference))
    }

    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>> {
        let Some(document) = load_document(self.source.as_ref(), reference).await? else {
            return Ok(None);
        };
        let (Some(class), Some(number)) = (reference.object_class(), reference.object_number())
        else {
            return Ok(None);
        };
        let Some(object) = document.object(class, number) else {
            return Ok(None);
        };

        let mut payload = IndexDocument::new();
        set_common_fields(
            &mut payload,
            reference,
            &document,
            ctx.locale_or_default(&document.locale),
        );
        set_object_fields(&mut payload, reference);
        for property in object.indexable_properties() {
            payload.add_field(
                FIELD_OBJECT_CONTENT,
                format!("{} : {}", property.name, property.value_text()),
            );
        }
        Ok(Some(payload))
    }
}

pub struct PropertyExtractor {
    source: Arc<dyn ContentSource>,
}

impl PropertyExtractor {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Extractor for PropertyExtractor {
    async fn id(&self, reference: &EntityReference, _ctx: &IndexContext) -> IndexerResult<String> {
        Ok(reference_id(reference))
    }

    async fn document(
        &self,
        reference: &EntityReference,
        ctx: &IndexContext,
    ) -> IndexerResult<Option<IndexDocument>> {
        let Some(document) = load_document(self.source.as_ref(), reference).await? else {
            return Ok(None);
        };
        let property = match (reference.object_class(), reference.object_number()) {
            (Some(class), Some(number)) => document
                .object(class, number)
                .and_then(|object| object.property(reference.name())),
            _ => None,
        };
        let Some(property) = property.filter(|p| p.is_indexable()) else {
            return Ok(None);
        };

        let mut payload = IndexDocument::new();
        set_common_fields(
            &mut payload,
            reference,
            &document,
            ctx.locale_or_default(&document.locale),
        );
        set_object_fields(&mut payload, reference);
        payload.set_field(FIELD_PROPERTY_NAME, property.name.as_str());
        payload.set_field(FIELD_PROPERTY_VALUE, property.value_text());
        Ok(Some(payload))
    }
}
