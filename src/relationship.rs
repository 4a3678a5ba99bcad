//! Relationship type (spec.md §3). Edges are represented by id pairs, not by
//! object references, per Design Note "Relationships as cycles" — this keeps
//! the bipartite aggregate/constituent graph free of ownership cycles.

use crate::contact::ContactId;

pub const AGGREGATES: &str = "Aggregates";
pub const IS_NOT: &str = "IsNot";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationshipKind {
    /// aggregate → constituent
    Aggregates,
    /// manual "do not merge" assertion
    IsNot,
    Other(String),
}

impl RelationshipKind {
    pub fn as_str(&self) -> &str {
        match self {
            RelationshipKind::Aggregates => AGGREGATES,
            RelationshipKind::IsNot => IS_NOT,
            RelationshipKind::Other(tag) => tag.as_str(),
        }
    }

    pub fn from_str(tag: &str) -> Self {
        match tag {
            AGGREGATES => RelationshipKind::Aggregates,
            IS_NOT => RelationshipKind::IsNot,
            other => RelationshipKind::Other(other.to_string()),
        }
    }
}

/// A directed triple (firstId, secondId, typeTag). The set of relationships
/// is unique on the full triple (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relationship {
    pub first: ContactId,
    pub second: ContactId,
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(first: ContactId, second: ContactId, kind: RelationshipKind) -> Self { Relationship { first, second, kind } }

    pub fn aggregates(aggregate: ContactId, constituent: ContactId) -> Self {
        Relationship::new(aggregate, constituent, RelationshipKind::Aggregates)
    }

    pub fn is_self_relationship(&self) -> bool { self.first == self.second }
}
