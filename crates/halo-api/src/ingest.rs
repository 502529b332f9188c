//! The ingestion seam: adapters yield records, the core owns the writes

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use halo_core::{FactValue, HaloError, MentionInput, Predicate, ProvenanceInput};

/// A relationship or value assertion an adapter can already bind to a
/// resolved subject
///
/// The provenance reference is filled in by the core when the batch's
/// provenance row is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFact {
    pub subject_id: Uuid,
    pub predicate: Predicate,
    pub object_id: Option<Uuid>,
    pub value: Option<FactValue>,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub confidence: f64,
}

/// One source record, translated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBatch {
    pub provenance: ProvenanceInput,
    pub mentions: Vec<MentionInput>,
    pub facts: Vec<SourceFact>,
}

/// What one ingested batch produced
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub provenance_id: Uuid,
    pub mention_ids: Vec<Uuid>,
    pub fact_ids: Vec<Uuid>,
}

/// Source-specific adapters implement this and nothing else
///
/// Adapters normalize forms and validate extracted identifiers before
/// yielding; the core treats their mention inputs as pre-validated.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable adapter name, recorded in provenance
    fn name(&self) -> &str;

    /// The next batch of translated records, or None when drained
    async fn next_batch(&mut self) -> Result<Option<SourceBatch>, HaloError>;
}
