//! Provenance records: where data came from and how it was extracted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a record originated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Bolagsverket,
    Allabolag,
    Skatteverket,
    Lantmateriet,
    ManualEntry,
    DerivedComputation,
    Other(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bolagsverket => "BOLAGSVERKET",
            Self::Allabolag => "ALLABOLAG",
            Self::Skatteverket => "SKATTEVERKET",
            Self::Lantmateriet => "LANTMATERIET",
            Self::ManualEntry => "MANUAL_ENTRY",
            Self::DerivedComputation => "DERIVED_COMPUTATION",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "BOLAGSVERKET" => Self::Bolagsverket,
            "ALLABOLAG" => Self::Allabolag,
            "SKATTEVERKET" => Self::Skatteverket,
            "LANTMATERIET" => Self::Lantmateriet,
            "MANUAL_ENTRY" => Self::ManualEntry,
            "DERIVED_COMPUTATION" => Self::DerivedComputation,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A provenance row; referenced by every fact, identifier, and mention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub url: Option<String>,
    pub document_hash: Option<String>,
    pub extraction_method: String,
    pub extracted_at: DateTime<Utc>,
    pub system_version: String,
    /// Inputs, for provenance of derived facts
    pub derived_from: Vec<Uuid>,
    pub derivation_rule: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Adapter-supplied provenance input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceInput {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub url: Option<String>,
    pub document_hash: Option<String>,
    pub extraction_method: String,
    pub extracted_at: DateTime<Utc>,
    pub system_version: String,
    pub derived_from: Vec<Uuid>,
    pub derivation_rule: Option<String>,
}

impl ProvenanceInput {
    /// Provenance for a derivation-engine output referencing its inputs
    pub fn derived_computation(rule: &str, derived_from: Vec<Uuid>) -> Self {
        Self {
            source_kind: SourceKind::DerivedComputation,
            source_id: rule.to_string(),
            url: None,
            document_hash: None,
            extraction_method: "derivation".to_string(),
            extracted_at: Utc::now(),
            system_version: env!("CARGO_PKG_VERSION").to_string(),
            derived_from,
            derivation_rule: Some(rule.to_string()),
        }
    }
}
