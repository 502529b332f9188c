//! Audit event types for the append-only HMAC hash chain

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audit event types written by every mutator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    MentionCreated,
    MentionResolved,
    ResolutionFailed,
    ResolutionTimeout,
    EntityCreated,
    EntitiesMerged,
    EntityAnonymized,
    HumanDecision,
    FactAsserted,
    FactSuperseded,
    DerivationCompleted,
    BatchIngested,
    ChainVerified,
    CryptoFailure,
    Custom(String),
}

impl AuditEventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MentionCreated => "MENTION_CREATED",
            Self::MentionResolved => "MENTION_RESOLVED",
            Self::ResolutionFailed => "RESOLUTION_FAILED",
            Self::ResolutionTimeout => "RESOLUTION_TIMEOUT",
            Self::EntityCreated => "ENTITY_CREATED",
            Self::EntitiesMerged => "ENTITIES_MERGED",
            Self::EntityAnonymized => "ENTITY_ANONYMIZED",
            Self::HumanDecision => "HUMAN_DECISION",
            Self::FactAsserted => "FACT_ASSERTED",
            Self::FactSuperseded => "FACT_SUPERSEDED",
            Self::DerivationCompleted => "DERIVATION_COMPLETED",
            Self::BatchIngested => "BATCH_INGESTED",
            Self::ChainVerified => "CHAIN_VERIFIED",
            Self::CryptoFailure => "CRYPTO_FAILURE",
            Self::Custom(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "MENTION_CREATED" => Self::MentionCreated,
            "MENTION_RESOLVED" => Self::MentionResolved,
            "RESOLUTION_FAILED" => Self::ResolutionFailed,
            "RESOLUTION_TIMEOUT" => Self::ResolutionTimeout,
            "ENTITY_CREATED" => Self::EntityCreated,
            "ENTITIES_MERGED" => Self::EntitiesMerged,
            "ENTITY_ANONYMIZED" => Self::EntityAnonymized,
            "HUMAN_DECISION" => Self::HumanDecision,
            "FACT_ASSERTED" => Self::FactAsserted,
            "FACT_SUPERSEDED" => Self::FactSuperseded,
            "DERIVATION_COMPLETED" => Self::DerivationCompleted,
            "BATCH_INGESTED" => Self::BatchIngested,
            "CHAIN_VERIFIED" => Self::ChainVerified,
            "CRYPTO_FAILURE" => Self::CryptoFailure,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Who performed the action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    #[default]
    System,
    User,
    Api,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Api => "API",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SYSTEM" => Some(Self::System),
            "USER" => Some(Self::User),
            "API" => Some(Self::Api),
            _ => None,
        }
    }
}

/// Input to the audit writer; the writer assigns sequence, hashes, and
/// timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventInput {
    pub event_type: AuditEventType,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub event_data: Value,
    pub request_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEventInput {
    /// System-actor event, the common case for engine-internal mutations
    pub fn system(
        event_type: AuditEventType,
        target_type: &str,
        target_id: impl Into<String>,
        event_data: Value,
    ) -> Self {
        Self {
            event_type,
            actor_type: ActorType::System,
            actor_id: None,
            target_type: Some(target_type.to_string()),
            target_id: Some(target_id.into()),
            event_data,
            request_id: None,
            ip: None,
            user_agent: None,
        }
    }

    /// Human-actor event for review decisions and merges
    pub fn user(
        event_type: AuditEventType,
        actor_id: &str,
        target_type: &str,
        target_id: impl Into<String>,
        event_data: Value,
    ) -> Self {
        Self {
            event_type,
            actor_type: ActorType::User,
            actor_id: Some(actor_id.to_string()),
            target_type: Some(target_type.to_string()),
            target_id: Some(target_id.into()),
            event_data,
            request_id: None,
            ip: None,
            user_agent: None,
        }
    }
}

/// A persisted audit entry
///
/// `previous_hash` is the literal "GENESIS" for sequence 1. Timestamps are
/// kept as the exact stored string so that chain verification recomputes
/// over identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub previous_hash: String,
    pub entry_hash: String,
    pub event_type: AuditEventType,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub event_data: Value,
    pub request_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

/// Keys whose values are redacted from audit payloads before hashing
const SENSITIVE_FIELDS: &[&str] = &[
    "personnummer",
    "samordningsnummer",
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "master_key",
    "private_key",
    "credential",
];

/// Recursively redact sensitive keys from audit data
///
/// Applied before hashing and storage so redaction survives chain
/// verification.
pub fn sanitize_event_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for key in map.keys().cloned().collect::<Vec<_>>() {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    map.insert(key, Value::String("[REDACTED]".to_string()));
                } else if let Some(v) = map.remove(&key) {
                    map.insert(key, sanitize_event_data(v));
                }
            }
            Value::Object(map)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sanitize_event_data).collect()),
        other => other,
    }
}
