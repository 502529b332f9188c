//! Mentions awaiting resolution and the decisions made about them

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;

/// Mention lifecycle
///
/// Created PENDING; the resolver moves it to exactly one terminal state.
/// A mention scored into the review band stays PENDING and becomes visible
/// to the review queue through its PENDING_REVIEW decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Pending,
    AutoMatched,
    HumanMatched,
    AutoRejected,
    HumanRejected,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AutoMatched => "AUTO_MATCHED",
            Self::HumanMatched => "HUMAN_MATCHED",
            Self::AutoRejected => "AUTO_REJECTED",
            Self::HumanRejected => "HUMAN_REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "AUTO_MATCHED" => Some(Self::AutoMatched),
            "HUMAN_MATCHED" => Some(Self::HumanMatched),
            "AUTO_REJECTED" => Some(Self::AutoRejected),
            "HUMAN_REJECTED" => Some(Self::HumanRejected),
            _ => None,
        }
    }
}

/// Outcome recorded per candidate considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    AutoMatch,
    AutoReject,
    HumanMatch,
    HumanReject,
    PendingReview,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoMatch => "AUTO_MATCH",
            Self::AutoReject => "AUTO_REJECT",
            Self::HumanMatch => "HUMAN_MATCH",
            Self::HumanReject => "HUMAN_REJECT",
            Self::PendingReview => "PENDING_REVIEW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_MATCH" => Some(Self::AutoMatch),
            "AUTO_REJECT" => Some(Self::AutoReject),
            "HUMAN_MATCH" => Some(Self::HumanMatch),
            "HUMAN_REJECT" => Some(Self::HumanReject),
            "PENDING_REVIEW" => Some(Self::PendingReview),
            _ => None,
        }
    }
}

/// Structured attributes extracted alongside a mention
///
/// Populated by source adapters; used to seed attribute rows on new-entity
/// creation and as the mention side of pairwise feature comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedAttributes {
    pub birth_year: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub legal_form: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub sni_codes: Vec<String>,
    pub latest_employees: Option<i64>,
    pub latest_revenue: Option<i64>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub entrance: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Already-resolved entities co-occurring with this mention in its
    /// source document; feeds the network_overlap feature
    pub related_entities: Vec<Uuid>,
}

/// A raw extraction awaiting resolution
///
/// Extracted identifiers are stored encrypted with their blind indexes; the
/// plaintext never leaves the ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: Uuid,
    pub kind: EntityKind,
    pub surface_form: String,
    pub normalized_form: String,
    pub personnummer_cipher: Option<String>,
    pub personnummer_index: Option<String>,
    pub orgnummer_cipher: Option<String>,
    pub orgnummer_index: Option<String>,
    pub attributes: ExtractedAttributes,
    pub provenance_id: Uuid,
    pub document_location: Option<String>,
    pub resolution_status: ResolutionStatus,
    pub resolved_to: Option<Uuid>,
    pub resolution_confidence: Option<f64>,
    pub resolution_method: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Adapter-supplied mention input
///
/// Normalized forms are already applied and extracted identifiers already
/// validated by the adapter; the store encrypts and blind-indexes them on
/// insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionInput {
    pub kind: EntityKind,
    pub surface_form: String,
    pub normalized_form: String,
    pub personnummer: Option<String>,
    pub orgnummer: Option<String>,
    pub attributes: ExtractedAttributes,
    pub document_location: Option<String>,
}

/// Per-candidate record of a resolution pass, retained for audit and
/// accuracy measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub id: Uuid,
    pub mention_id: Uuid,
    pub candidate_entity_id: Option<Uuid>,
    pub overall_score: f64,
    pub feature_scores: serde_json::Value,
    pub outcome: DecisionOutcome,
    pub reviewer: Option<String>,
    pub justification: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            ResolutionStatus::Pending,
            ResolutionStatus::AutoMatched,
            ResolutionStatus::HumanMatched,
            ResolutionStatus::AutoRejected,
            ResolutionStatus::HumanRejected,
        ] {
            assert_eq!(ResolutionStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn extracted_attributes_tolerate_sparse_json() {
        let attrs: ExtractedAttributes =
            serde_json::from_str(r#"{"birth_year": 1985}"#).unwrap();
        assert_eq!(attrs.birth_year, Some(1985));
        assert!(attrs.sni_codes.is_empty());
    }
}
