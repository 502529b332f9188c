//! # Halo API
//!
//! The transport-agnostic facade over the Halo core. [`HaloService`] wires
//! the stores, resolver, derivation engine, and pattern detector behind the
//! operations an HTTP layer (out of scope here) would expose, and
//! [`SourceAdapter`] is the narrow seam through which scrapers and registry
//! feeds hand records to the core. Adapters yield provenance, mentions, and
//! facts; they never write entities.

pub mod ingest;
pub mod service;
pub mod views;

pub use ingest::{IngestReport, SourceAdapter, SourceBatch, SourceFact};
pub use service::HaloService;
pub use views::{EntityView, GraphEdge, GraphNode, RelationshipGraph, SearchHit};
