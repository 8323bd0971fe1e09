//! Entity references: immutable identifiers of indexable wiki entities.
//!
//! A reference is a typed name plus a parent chain, e.g. a property lives in an
//! object, which lives in a document, which lives in a space of a wiki.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::IndexerError;

/// Kind of entity a reference points at, ordered from the root down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Wiki,
    Space,
    Document,
    Attachment,
    Object,
    ObjectProperty,
}

impl EntityType {
    /// Name stored in the `type` field of index documents
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Wiki => "WIKI",
            EntityType::Space => "SPACE",
            EntityType::Document => "DOCUMENT",
            EntityType::Attachment => "ATTACHMENT",
            EntityType::Object => "OBJECT",
            EntityType::ObjectProperty => "OBJECT_PROPERTY",
        }
    }

    /// Type expected for the parent of an entity of this type
    pub fn parent_type(self) -> Option<EntityType> {
        match self {
            EntityType::Wiki => None,
            EntityType::Space => Some(EntityType::Wiki),
            EntityType::Document => Some(EntityType::Space),
            EntityType::Attachment | EntityType::Object => Some(EntityType::Document),
            EntityType::ObjectProperty => Some(EntityType::Object),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a wiki entity.
///
/// Equality covers the type, the name, the locale and the whole parent chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityReference {
    entity_type: EntityType,
    name: String,
    locale: Option<String>,
    parent: Option<Arc<EntityReference>>,
}

impl EntityReference {
    pub fn wiki(name: impl Into<String>) -> Self {
        Self {
            entity_type: EntityType::Wiki,
            name: name.into(),
            locale: None,
            parent: None,
        }
    }

    pub fn new_space(wiki: &str, space: &str) -> Self {
        Self::wiki(wiki).join_space(space)
    }

    pub fn new_document(wiki: &str, space: &str, document: &str) -> Self {
        Self::wiki(wiki).join_space(space).join_document(document)
    }

    fn child(&self, entity_type: EntityType, name: String) -> Self {
        debug_assert_eq!(entity_type.parent_type(), Some(self.entity_type));
        Self {
            entity_type,
            name,
            locale: None,
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn join_space(&self, name: &str) -> Self {
        self.child(EntityType::Space, name.to_string())
    }

    pub fn join_document(&self, name: &str) -> Self {
        self.child(EntityType::Document, name.to_string())
    }

    /// Attachments hang off the default (locale-less) document
    pub fn join_attachment(&self, filename: &str) -> Self {
        self.without_locale()
            .child(EntityType::Attachment, filename.to_string())
    }

    /// `class` is the wiki-local class reference (`Space.Class`)
    pub fn join_object(&self, class: &str, number: u32) -> Self {
        let document = self.without_locale();
        let wiki = document.wiki_name().unwrap_or_default().to_string();
        document.child(
            EntityType::Object,
            format!("{}:{}[{}]", wiki, class, number),
        )
    }

    pub fn join_property(&self, name: &str) -> Self {
        self.child(EntityType::ObjectProperty, name.to_string())
    }

    /// Document reference for a given translation; ignored for other types
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        if self.entity_type == EntityType::Document {
            let locale = locale.into();
            self.locale = if locale.is_empty() { None } else { Some(locale) };
        }
        self
    }

    pub fn without_locale(&self) -> Self {
        let mut reference = self.clone();
        reference.locale = None;
        reference
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn parent(&self) -> Option<&EntityReference> {
        self.parent.as_deref()
    }

    /// Walk up the parent chain (self included) to the first entity of the given type
    pub fn extract(&self, entity_type: EntityType) -> Option<&EntityReference> {
        let mut current = Some(self);
        while let Some(reference) = current {
            if reference.entity_type == entity_type {
                return Some(reference);
            }
            current = reference.parent();
        }
        None
    }

    pub fn wiki_name(&self) -> Option<&str> {
        self.extract(EntityType::Wiki).map(|r| r.name())
    }

    pub fn space_name(&self) -> Option<&str> {
        self.extract(EntityType::Space).map(|r| r.name())
    }

    pub fn document_name(&self) -> Option<&str> {
        self.extract(EntityType::Document).map(|r| r.name())
    }

    /// Owning document reference, locale-less unless `self` is a translated document
    pub fn document_reference(&self) -> Option<EntityReference> {
        self.extract(EntityType::Document).cloned()
    }

    /// Local class reference (`Space.Class`) of an object or of a property's object
    pub fn object_class(&self) -> Option<&str> {
        let object = self.extract(EntityType::Object)?;
        let name = object.name();
        let end = name.rfind('[')?;
        let class = &name[..end];
        Some(class.split_once(':').map(|(_, local)| local).unwrap_or(class))
    }

    /// Number of an object or of a property's object
    pub fn object_number(&self) -> Option<u32> {
        let object = self.extract(EntityType::Object)?;
        let name = object.name();
        let start = name.rfind('[')?;
        name[start + 1..].strip_suffix(']')?.parse().ok()
    }

    /// `Space.Document` form used for the `fullname` field
    pub fn local_document_name(&self) -> Option<String> {
        Some(format!(
            "{}.{}",
            escape(self.space_name()?, &['.', ':']),
            escape(self.document_name()?, &['.'])
        ))
    }
}

fn escape(name: &str, specials: &[char]) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\\' || specials.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.entity_type, self.parent()) {
            (EntityType::Wiki, _) | (_, None) => write!(f, "{}", escape(&self.name, &[':'])),
            (EntityType::Space, Some(parent)) => {
                write!(f, "{}:{}", parent, escape(&self.name, &['.', ':']))
            }
            (EntityType::Document, Some(parent)) => {
                write!(f, "{}.{}", parent, escape(&self.name, &['.']))
            }
            (EntityType::Attachment, Some(parent)) => {
                write!(f, "{}@{}", parent, escape(&self.name, &['@']))
            }
            (EntityType::Object, Some(parent)) => write!(f, "{}^{}", parent, self.name),
            (EntityType::ObjectProperty, Some(parent)) => {
                write!(f, "{}.{}", parent, escape(&self.name, &['.']))
            }
        }
    }
}

/// Split `input` on the first unescaped `separator`, unescaping the head
fn split_unescaped(input: &str, separator: char) -> (String, Option<&str>) {
    let mut head = String::new();
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        if c == '\\' {
            if let Some((_, escaped)) = chars.next() {
                head.push(escaped);
            }
        } else if c == separator {
            return (head, Some(&input[index + c.len_utf8()..]));
        } else {
            head.push(c);
        }
    }
    (head, None)
}

fn unescape(input: &str) -> String {
    split_unescaped(input, '\\').0
}

/// Parses root references in the forms `wiki`, `wiki:Space` and `wiki:Space.Document`
impl FromStr for EntityReference {
    type Err = IndexerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| IndexerError::InvalidReference {
            input: input.to_string(),
            message: message.to_string(),
        };

        let (wiki, rest) = split_unescaped(input.trim(), ':');
        if wiki.is_empty() {
            return Err(invalid("missing wiki name"));
        }
        let wiki = EntityReference::wiki(wiki);
        let Some(rest) = rest else {
            return Ok(wiki);
        };

        let (space, document) = split_unescaped(rest, '.');
        if space.is_empty() {
            return Err(invalid("missing space name"));
        }
        let space = wiki.join_space(&space);
        let Some(document) = document else {
            return Ok(space);
        };

        let document = unescape(document);
        if document.is_empty() {
            return Err(invalid("missing document name"));
        }
        Ok(space.join_document(&document))
    }
}
