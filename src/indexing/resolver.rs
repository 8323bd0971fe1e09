//! Expansion of change notifications into leaf index requests.
//!
//! A non-recursive request is already a leaf and passes through untouched. A
//! recursive index request walks the content tree below the reference; a
//! recursive delete becomes a single delete-by-query so nothing about to be
//! removed has to be resolved first.

use std::sync::Arc;
use tracing::debug;

use super::query::subtree_query;
use super::request::{IndexRequest, Operation, ResolveRequest};
use crate::error::{IndexerError, IndexerResult};
use crate::model::{ContentSource, EntityReference, EntityType, WikiDocument};

pub struct ReferenceResolver {
    source: Arc<dyn ContentSource>,
}

impl ReferenceResolver {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Turn one resolve request into the index requests it stands for
    pub async fn resolve(&self, request: &ResolveRequest) -> IndexerResult<Vec<IndexRequest>> {
        let reference = &request.reference;

        if !request.recurse {
            return Ok(vec![match request.operation {
                Operation::Index => IndexRequest::index(reference.clone()),
                Operation::Delete => IndexRequest::delete(reference.clone()),
            }]);
        }

        match request.operation {
            Operation::Delete => Ok(vec![IndexRequest::delete_query(subtree_query(reference))]),
            Operation::Index => {
                let references =
                    self.expand(reference)
                        .await
                        .map_err(|e| IndexerError::Resolution {
                            reference: reference.clone(),
                            message: e.to_string(),
                        })?;
                debug!(
                    "Resolved '{}' into {} indexable references",
                    reference,
                    references.len()
                );
                Ok(references.into_iter().map(IndexRequest::index).collect())
            }
        }
    }

    /// Every indexable entity at or below `reference`, parents before children
    pub async fn expand(&self, reference: &EntityReference) -> IndexerResult<Vec<EntityReference>> {
        let mut references = Vec::new();

        match reference.entity_type() {
            EntityType::Wiki => {
                for space in self.source.spaces(reference.name()).await? {
                    self.expand_space(&reference.join_space(&space), &mut references)
                        .await?;
                }
            }
            EntityType::Space => self.expand_space(reference, &mut references).await?,
            EntityType::Document => {
                if let Some(document) = self.source.document(reference).await? {
                    expand_document(reference, &document, &mut references);
                }
            }
            EntityType::Attachment => {
                if let Some(document) = self.source.document(reference).await? {
                    if document.attachment(reference.name()).is_some() {
                        references.push(reference.clone());
                    }
                }
            }
            EntityType::Object => {
                if let Some(document) = self.source.document(reference).await? {
                    expand_object(reference, &document, &mut references);
                }
            }
            EntityType::ObjectProperty => {
                if let Some(document) = self.source.document(reference).await? {
                    let property = match (reference.object_class(), reference.object_number()) {
                        (Some(class), Some(number)) => document
                            .object(class, number)
                            .and_then(|object| object.property(reference.name())),
                        _ => None,
                    };
                    if property.is_some_and(|p| p.is_indexable()) {
                        references.push(reference.clone());
                    }
                }
            }
        }

        Ok(references)
    }

    async fn expand_space(
        &self,
        space: &EntityReference,
        references: &mut Vec<EntityReference>,
    ) -> IndexerResult<()> {
        let wiki = space.wiki_name().unwrap_or_default();
        for name in self.source.documents(wiki, space.name()).await? {
            let document_reference = space.join_document(&name);
            if let Some(document) = self.source.document(&document_reference).await? {
                expand_document(&document_reference, &document, references);
            }
        }
        Ok(())
    }
}

fn expand_document(
    reference: &EntityReference,
    document: &WikiDocument,
    references: &mut Vec<EntityReference>,
) {
    // A translation reference only stands for itself
    if let Some(locale) = reference.locale() {
        if document.translation(locale).is_some() || document.locale == locale {
            references.push(reference.clone());
        }
        return;
    }

    references.push(reference.clone());
    for locale in document.translations.keys() {
        references.push(reference.clone().with_locale(locale.as_str()));
    }
    for attachment in &document.attachments {
        references.push(reference.join_attachment(&attachment.filename));
    }
    for object in &document.objects {
        let object_reference = reference.join_object(&object.class, object.number);
        expand_object(&object_reference, document, references);
    }
}

fn expand_object(
    reference: &EntityReference,
    document: &WikiDocument,
    references: &mut Vec<EntityReference>,
) {
    let (Some(class), Some(number)) = (reference.object_class(), reference.object_number()) else {
        return;
    };
    let Some(object) = document.object(class, number) else {
        return;
    };

    references.push(reference.clone());
    for property in object.indexable_properties() {
        references.push(reference.join_property(&property.name));
    }
}
