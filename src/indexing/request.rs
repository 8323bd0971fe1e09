//! Requests flowing through the two indexing queues

use std::fmt;

use crate::model::EntityReference;

/// What to do with the targeted entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Index,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Delete => "delete",
        }
    }
}

/// Coarse-grained change notification, expanded by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub reference: EntityReference,
    pub recurse: bool,
    pub operation: Operation,
}

impl ResolveRequest {
    pub fn index(reference: EntityReference, recurse: bool) -> Self {
        Self {
            reference,
            recurse,
            operation: Operation::Index,
        }
    }

    pub fn delete(reference: EntityReference, recurse: bool) -> Self {
        Self {
            reference,
            recurse,
            operation: Operation::Delete,
        }
    }
}

/// Entity or entities an index request applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexTarget {
    /// A single resolved entity
    Reference(EntityReference),
    /// Every indexed entity matching the query; only used for deletes
    Query(String),
}

/// Per-entity operation for the batch worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub target: IndexTarget,
    pub operation: Operation,
}

impl IndexRequest {
    pub fn index(reference: EntityReference) -> Self {
        Self {
            target: IndexTarget::Reference(reference),
            operation: Operation::Index,
        }
    }

    pub fn delete(reference: EntityReference) -> Self {
        Self {
            target: IndexTarget::Reference(reference),
            operation: Operation::Delete,
        }
    }

    pub fn delete_query(query: impl Into<String>) -> Self {
        Self {
            target: IndexTarget::Query(query.into()),
            operation: Operation::Delete,
        }
    }

    pub fn reference(&self) -> Option<&EntityReference> {
        match &self.target {
            IndexTarget::Reference(reference) => Some(reference),
            IndexTarget::Query(_) => None,
        }
    }
}

impl fmt::Display for IndexRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            IndexTarget::Reference(reference) => {
                write!(f, "{} '{}'", self.operation.as_str(), reference)
            }
            IndexTarget::Query(query) => write!(f, "{} query [{}]", self.operation.as_str(), query),
        }
    }
}

/// Bulk resync of a subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncRequest {
    pub root: EntityReference,
    /// Remove everything indexed under the root before re-indexing it
    pub purge: bool,
}

impl ResyncRequest {
    pub fn new(root: EntityReference) -> Self {
        Self { root, purge: false }
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }
}
