//! Temporal, provenanced facts with append-only supersession

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fact predicates
///
/// The first four are relationship predicates (the `object` entity column is
/// meaningful); the rest carry a value in one of the typed value columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    DirectorOf,
    ShareholderOf,
    RegisteredAt,
    SameAs,
    RiskScore,
    ShellIndicator,
    DirectorVelocity,
    NetworkCluster,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectorOf => "DIRECTOR_OF",
            Self::ShareholderOf => "SHAREHOLDER_OF",
            Self::RegisteredAt => "REGISTERED_AT",
            Self::SameAs => "SAME_AS",
            Self::RiskScore => "RISK_SCORE",
            Self::ShellIndicator => "SHELL_INDICATOR",
            Self::DirectorVelocity => "DIRECTOR_VELOCITY",
            Self::NetworkCluster => "NETWORK_CLUSTER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECTOR_OF" => Some(Self::DirectorOf),
            "SHAREHOLDER_OF" => Some(Self::ShareholderOf),
            "REGISTERED_AT" => Some(Self::RegisteredAt),
            "SAME_AS" => Some(Self::SameAs),
            "RISK_SCORE" => Some(Self::RiskScore),
            "SHELL_INDICATOR" => Some(Self::ShellIndicator),
            "DIRECTOR_VELOCITY" => Some(Self::DirectorVelocity),
            "NETWORK_CLUSTER" => Some(Self::NetworkCluster),
            _ => None,
        }
    }

    /// True for predicates whose object column references another entity
    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            Self::DirectorOf | Self::ShareholderOf | Self::RegisteredAt | Self::SameAs
        )
    }
}

/// Tagged wrapper over the one-column-per-shape fact value storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Bool(bool),
    Json(serde_json::Value),
}

/// A temporal assertion about an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub predicate: Predicate,
    /// Object entity for relationship predicates
    pub object_id: Option<Uuid>,
    /// Typed value for non-relationship predicates
    pub value: Option<FactValue>,
    pub relationship_attributes: Option<serde_json::Value>,
    pub valid_from: NaiveDate,
    /// None means currently valid
    pub valid_to: Option<NaiveDate>,
    pub confidence: f64,
    pub provenance_id: Uuid,
    /// Self-reference set when a newer fact replaced this one
    pub superseded_by: Option<Uuid>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub is_derived: bool,
    pub derivation_rule: Option<String>,
    pub derived_from: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// A fact is live when nothing superseded it and its validity window is open
    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none() && self.valid_to.is_none()
    }
}

/// Input for asserting a new fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactInput {
    pub subject_id: Uuid,
    pub predicate: Predicate,
    pub object_id: Option<Uuid>,
    pub value: Option<FactValue>,
    pub relationship_attributes: Option<serde_json::Value>,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
    pub confidence: f64,
    pub provenance_id: Uuid,
    pub is_derived: bool,
    pub derivation_rule: Option<String>,
    pub derived_from: Vec<Uuid>,
}

impl FactInput {
    /// A source-asserted relationship fact, currently valid
    pub fn relationship(
        subject_id: Uuid,
        predicate: Predicate,
        object_id: Uuid,
        valid_from: NaiveDate,
        confidence: f64,
        provenance_id: Uuid,
    ) -> Self {
        Self {
            subject_id,
            predicate,
            object_id: Some(object_id),
            value: None,
            relationship_attributes: None,
            valid_from,
            valid_to: None,
            confidence,
            provenance_id,
            is_derived: false,
            derivation_rule: None,
            derived_from: Vec::new(),
        }
    }

    /// A derived value fact produced by a named rule
    pub fn derived(
        subject_id: Uuid,
        predicate: Predicate,
        value: FactValue,
        valid_from: NaiveDate,
        provenance_id: Uuid,
        rule: &str,
        derived_from: Vec<Uuid>,
    ) -> Self {
        Self {
            subject_id,
            predicate,
            object_id: None,
            value: Some(value),
            relationship_attributes: None,
            valid_from,
            valid_to: None,
            confidence: 1.0,
            provenance_id,
            is_derived: true,
            derivation_rule: Some(rule.to_string()),
            derived_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_round_trips_through_str() {
        for p in [
            Predicate::DirectorOf,
            Predicate::ShareholderOf,
            Predicate::RegisteredAt,
            Predicate::SameAs,
            Predicate::RiskScore,
            Predicate::ShellIndicator,
            Predicate::DirectorVelocity,
            Predicate::NetworkCluster,
        ] {
            assert_eq!(Predicate::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn relationship_predicates_are_flagged() {
        assert!(Predicate::DirectorOf.is_relationship());
        assert!(Predicate::SameAs.is_relationship());
        assert!(!Predicate::RiskScore.is_relationship());
    }

    #[test]
    fn fact_value_serializes_tagged() {
        let v = FactValue::Float(0.75);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "float");
        assert_eq!(json["value"], 0.75);
    }
}
