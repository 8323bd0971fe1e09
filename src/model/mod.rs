//! Wiki content model consumed by the indexing pipeline

pub mod content;
pub mod reference;
pub mod source;

pub use content::{
    PropertyKind, Translation, WikiAttachment, WikiDocument, WikiObject, WikiProperty,
};
pub use reference::{EntityReference, EntityType};
pub use source::{ContentModel, ContentSource, MemoryContentSource};
