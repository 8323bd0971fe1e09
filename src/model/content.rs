//! Wiki content as seen by the indexer: documents, translations, attachments and
//! objects with their properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A wiki document in its default locale, with its translations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiDocument {
    pub title: String,
    pub content: String,
    pub hidden: bool,
    /// Locale of the default translation (empty = root locale)
    pub locale: String,
    /// Translations keyed by locale
    pub translations: BTreeMap<String, Translation>,
    pub attachments: Vec<WikiAttachment>,
    pub objects: Vec<WikiObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Translation {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    /// Extracted text, if the attachment has any
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiObject {
    /// Wiki-local class reference, `Space.Class`
    pub class: String,
    pub number: u32,
    pub properties: Vec<WikiProperty>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    String,
    Text,
    Integer,
    Boolean,
    List,
    Password,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiProperty {
    pub name: String,
    pub kind: PropertyKind,
    pub value: serde_json::Value,
}

impl WikiDocument {
    pub fn translation(&self, locale: &str) -> Option<&Translation> {
        self.translations.get(locale)
    }

    pub fn attachment(&self, filename: &str) -> Option<&WikiAttachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }

    pub fn object(&self, class: &str, number: u32) -> Option<&WikiObject> {
        self.objects
            .iter()
            .find(|o| o.class == class && o.number == number)
    }
}

impl WikiObject {
    pub fn property(&self, name: &str) -> Option<&WikiProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Properties whose values may end up in the index
    pub fn indexable_properties(&self) -> impl Iterator<Item = &WikiProperty> {
        self.properties.iter().filter(|p| p.is_indexable())
    }
}

impl WikiProperty {
    pub fn is_indexable(&self) -> bool {
        self.kind != PropertyKind::Password
    }

    /// Textual form of the value; list entries are joined with `|`
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("|"),
            other => other.to_string(),
        }
    }
}
