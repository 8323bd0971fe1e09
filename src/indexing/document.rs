//! Flat field-to-values payload sent to the index store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::query::FIELD_ID;

/// Single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Long(i64),
    Text(String),
}

impl FieldValue {
    /// Number of bytes this value contributes to a batch
    pub fn length(&self) -> usize {
        match self {
            FieldValue::Text(text) => text.len(),
            FieldValue::Bool(_) | FieldValue::Long(_) => 0,
        }
    }

    /// Form used when matching queries against stored documents
    pub fn as_query_text(&self) -> String {
        match self {
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Long(value) => value.to_string(),
            FieldValue::Text(value) => value.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Long(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Long(i64::from(value))
    }
}

/// Index document that keeps track of its cumulative textual length, which
/// drives the batch length threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(flatten)]
    fields: BTreeMap<String, Vec<FieldValue>>,
    #[serde(skip)]
    length: usize,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of a field
    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        if let Some(previous) = self.fields.remove(name) {
            self.length -= previous.iter().map(FieldValue::length).sum::<usize>();
        }
        self.length += value.length();
        self.fields.insert(name.to_string(), vec![value]);
    }

    /// Append a value to a multi-valued field
    pub fn add_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        self.length += value.length();
        self.fields.entry(name.to_string()).or_default().push(value);
    }

    pub fn get(&self, name: &str) -> Option<&[FieldValue]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// First value of a text field
    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)?.first()? {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.get_text(FIELD_ID)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<FieldValue>> {
        &self.fields
    }

    pub fn length(&self) -> usize {
        self.length
    }
}
