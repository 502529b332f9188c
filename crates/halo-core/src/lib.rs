//! # Halo Core
//!
//! Canonical data model for the Halo entity-resolution engine.
//!
//! ## Key Types
//!
//! - [`Entity`] — a canonical person, company, address, or event
//! - [`Fact`] — a temporal, provenanced assertion with supersession history
//! - [`Mention`] — a raw extraction awaiting resolution
//! - [`Provenance`] — where a record came from and how it was extracted
//! - [`AuditEventInput`] — input to the append-only HMAC audit chain
//! - [`HaloConfig`] — immutable runtime configuration, built once at startup
//!
//! Everything here is a plain serde value type: no I/O, no global state.
//! Stores, resolvers, and derivation engines live in the sibling crates.

pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod fact;
pub mod mention;
pub mod provenance;

pub use audit::{ActorType, AuditEntry, AuditEventInput, AuditEventType};
pub use config::{BlockingConfig, DerivationConfig, HaloConfig, ResolverConfig, Thresholds};
pub use entity::{
    AddressAttributes, CompanyAttributes, Entity, EntityIdentifier, EntityKind, EntityStatus,
    IdentifierKind, PersonAttributes,
};
pub use error::HaloError;
pub use fact::{Fact, FactInput, FactValue, Predicate};
pub use mention::{
    DecisionOutcome, ExtractedAttributes, Mention, MentionInput, ResolutionDecision,
    ResolutionStatus,
};
pub use provenance::{Provenance, ProvenanceInput, SourceKind};
