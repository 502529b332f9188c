//! Read-side composite views

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use halo_core::{
    AddressAttributes, CompanyAttributes, Entity, EntityIdentifier, EntityKind, EntityStatus,
    PersonAttributes, Predicate,
};

/// An entity with its identifiers, attributes, and SAME_AS links
///
/// Identifier values stay ciphertext; callers with a need to know decrypt
/// through the PII codec explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
    pub entity: Entity,
    pub identifiers: Vec<EntityIdentifier>,
    pub person: Option<PersonAttributes>,
    pub company: Option<CompanyAttributes>,
    pub address: Option<AddressAttributes>,
    /// Entities asserted identical to this one (merge history)
    pub same_as: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub status: EntityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub fact_id: Uuid,
    pub subject_id: Uuid,
    pub predicate: Predicate,
    pub object_id: Uuid,
}

/// A bounded neighborhood subgraph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub root: Uuid,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Set when the node cap cut the expansion short
    pub truncated: bool,
}

/// One ranked search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: Entity,
    pub score: f64,
}
