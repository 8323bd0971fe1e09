//! Index identifiers and delete queries for entity references.
//!
//! Identifiers are the serialized reference, with the locale appended for
//! documents. Queries use the conjunctive `field:value AND ...` form understood
//! by the index store.

use crate::model::{EntityReference, EntityType};

pub const FIELD_ID: &str = "id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_WIKI: &str = "wiki";
pub const FIELD_SPACE: &str = "space";
pub const FIELD_NAME: &str = "name";
pub const FIELD_FULLNAME: &str = "fullname";
pub const FIELD_LOCALE: &str = "locale";
pub const FIELD_LANGUAGE: &str = "language";
pub const FIELD_HIDDEN: &str = "hidden";
pub const FIELD_CLASS: &str = "class";
pub const FIELD_NUMBER: &str = "number";

/// Characters with a meaning in the Lucene query syntax
const SPECIAL_CHARS: &[char] = &[
    '\\', '+', '-', '!', '(', ')', ':', '^', '[', ']', '"', '{', '}', '~', '*', '?', '|', '&',
    ';', '/',
];

/// Escape a value so it matches literally inside a query
pub fn escape_query_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if SPECIAL_CHARS.contains(&c) || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reverse of [`escape_query_value`]
pub fn unescape_query_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

/// Index identifier of an entity. `locale` only matters for documents.
pub fn entity_id(reference: &EntityReference, locale: &str) -> String {
    match reference.entity_type() {
        EntityType::Document if !locale.is_empty() => {
            format!("{}_{}", reference.without_locale(), locale)
        }
        EntityType::Document => reference.without_locale().to_string(),
        _ => reference.to_string(),
    }
}

/// Query matching the entity and everything indexed below it
pub fn subtree_query(reference: &EntityReference) -> String {
    let mut clauses = Vec::new();
    let mut field = |name: &str, value: &str| {
        clauses.push(format!("{}:{}", name, escape_query_value(value)));
    };

    match reference.entity_type() {
        EntityType::Attachment | EntityType::ObjectProperty => {
            field(FIELD_ID, &entity_id(reference, ""));
        }
        entity_type => {
            if let Some(wiki) = reference.wiki_name() {
                field(FIELD_WIKI, wiki);
            }
            if entity_type >= EntityType::Space {
                if let Some(space) = reference.space_name() {
                    field(FIELD_SPACE, space);
                }
            }
            if entity_type >= EntityType::Document {
                if let Some(name) = reference.document_name() {
                    field(FIELD_NAME, name);
                }
            }
            if entity_type == EntityType::Document {
                if let Some(locale) = reference.locale() {
                    field(FIELD_LOCALE, locale);
                }
            }
            if entity_type == EntityType::Object {
                if let Some(class) = reference.object_class() {
                    field(FIELD_CLASS, class);
                }
                if let Some(number) = reference.object_number() {
                    field(FIELD_NUMBER, &number.to_string());
                }
            }
        }
    }

    clauses.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document122() -> EntityReference {
        EntityReference::new_document("wiki1", "space12", "document122")
    }

    #[test]
    fn test_query_wiki_and_space() {
        assert_eq!(subtree_query(&EntityReference::wiki("wiki1")), "wiki:wiki1");
        assert_eq!(
            subtree_query(&EntityReference::new_space("wiki1", "space11")),
            "wiki:wiki1 AND space:space11"
        );
    }

    #[test]
    fn test_query_document() {
        let document = EntityReference::new_document("wiki1", "space11", "class111");
        assert_eq!(
            subtree_query(&document),
            "wiki:wiki1 AND space:space11 AND name:class111"
        );
        assert_eq!(
            subtree_query(&document.with_locale("ro")),
            "wiki:wiki1 AND space:space11 AND name:class111 AND locale:ro"
        );
    }

    #[test]
    fn test_query_object() {
        let object = EntityReference::new_document("wiki1", "space12", "space12")
            .join_object("space11.class111", 0);
        assert_eq!(
            subtree_query(&object),
            "wiki:wiki1 AND space:space12 AND name:space12 AND class:space11.class111 AND number:0"
        );
    }

    #[test]
    fn test_query_property_and_attachment_use_id() {
        let property = document122()
            .join_object("space11.class111", 1)
            .join_property("aStringProperty");
        assert_eq!(
            subtree_query(&property),
            "id:wiki1\\:space12.document122\\^wiki1\\:space11.class111\\[1\\].aStringProperty"
        );

        let attachment = EntityReference::new_document("wiki1", "space12", "document121")
            .join_attachment("attachment1211.ext");
        assert_eq!(
            subtree_query(&attachment),
            "id:wiki1\\:space12.document121@attachment1211.ext"
        );
    }

    #[test]
    fn test_document_ids() {
        let document = EntityReference::new_document("wiki", "space", "name");
        assert_eq!(entity_id(&document, "en"), "wiki:space.name_en");
        assert_eq!(entity_id(&document, ""), "wiki:space.name");
        assert_eq!(
            entity_id(&document.clone().with_locale("fr"), "fr"),
            "wiki:space.name_fr"
        );
    }

    #[test]
    fn test_escape_round_trip_with_whitespace() {
        let escaped = escape_query_value("My Space");
        assert_eq!(escaped, "My\\ Space");
        assert_eq!(unescape_query_value(&escaped), "My Space");
    }
}
