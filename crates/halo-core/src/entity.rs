//! Entities, identifiers, and per-kind attribute records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of thing an entity denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Person,
    Company,
    Address,
    Event,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Company => "COMPANY",
            Self::Address => "ADDRESS",
            Self::Event => "EVENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PERSON" => Some(Self::Person),
            "COMPANY" => Some(Self::Company),
            "ADDRESS" => Some(Self::Address),
            "EVENT" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Entity lifecycle status
///
/// Exactly one ACTIVE row exists per canonical identity. MERGED rows are
/// preserved and point at their survivor; ANONYMIZED rows keep id and kind
/// but carry no PII.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Merged,
    Split,
    Anonymized,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Merged => "MERGED",
            Self::Split => "SPLIT",
            Self::Anonymized => "ANONYMIZED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "MERGED" => Some(Self::Merged),
            "SPLIT" => Some(Self::Split),
            "ANONYMIZED" => Some(Self::Anonymized),
            _ => None,
        }
    }
}

/// A canonical thing in the world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    /// Display name; light-normalized (uppercased, punctuation cleaned),
    /// legal-form tokens retained for companies
    pub canonical_name: String,
    /// Phonetic blocking code computed from the heavy-normalized name
    pub phonetic_code: String,
    pub resolution_confidence: f64,
    pub status: EntityStatus,
    /// Survivor pointer, set when status is MERGED
    pub merged_into: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(kind: EntityKind, canonical_name: &str, phonetic_code: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            canonical_name: canonical_name.to_string(),
            phonetic_code: phonetic_code.to_string(),
            resolution_confidence: 1.0,
            status: EntityStatus::Active,
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Identifier kinds bound to entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierKind {
    Personnummer,
    Samordningsnummer,
    Organisationsnummer,
    PostalCode,
    PropertyId,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personnummer => "PERSONNUMMER",
            Self::Samordningsnummer => "SAMORDNINGSNUMMER",
            Self::Organisationsnummer => "ORGANISATIONSNUMMER",
            Self::PostalCode => "POSTAL_CODE",
            Self::PropertyId => "PROPERTY_ID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PERSONNUMMER" => Some(Self::Personnummer),
            "SAMORDNINGSNUMMER" => Some(Self::Samordningsnummer),
            "ORGANISATIONSNUMMER" => Some(Self::Organisationsnummer),
            "POSTAL_CODE" => Some(Self::PostalCode),
            "PROPERTY_ID" => Some(Self::PropertyId),
            _ => None,
        }
    }
}

/// A (kind, value) pair bound to an entity
///
/// The raw value is stored encrypted; equality lookups go through the keyed
/// blind index. (entity, kind, blind_index) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityIdentifier {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub kind: IdentifierKind,
    /// `enc2:` ciphertext of the identifier value
    pub value_cipher: String,
    /// 32 lowercase hex chars, HMAC-derived
    pub blind_index: String,
    pub provenance_id: Uuid,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Attribute record for PERSON entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonAttributes {
    pub entity_id: Uuid,
    pub birth_year: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub directorship_count: i64,
    pub active_directorship_count: i64,
    pub dissolved_company_count: i64,
    pub risk_score: Option<f64>,
    pub risk_factors: Vec<String>,
    pub cluster_id: Option<String>,
}

/// Attribute record for COMPANY entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyAttributes {
    pub entity_id: Uuid,
    pub legal_form: Option<String>,
    pub status: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub dissolution_date: Option<NaiveDate>,
    pub sni_codes: Vec<String>,
    pub latest_revenue: Option<i64>,
    pub latest_employees: Option<i64>,
    pub director_count: i64,
    pub director_change_velocity: Option<f64>,
    pub shell_indicators: Vec<String>,
    pub risk_score: Option<f64>,
    pub cluster_id: Option<String>,
}

/// Attribute record for ADDRESS entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressAttributes {
    pub entity_id: Uuid,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub entrance: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vulnerable_area: bool,
    pub company_count: i64,
    pub person_count: i64,
    pub registration_hub: bool,
}
