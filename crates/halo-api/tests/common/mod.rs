//! Shared fixtures for the end-to-end tests

use chrono::Utc;
use uuid::Uuid;

use halo_api::{HaloService, SourceBatch, SourceFact};
use halo_core::{
    EntityKind, ExtractedAttributes, FactValue, HaloConfig, MentionInput, Predicate,
    ProvenanceInput, SourceKind,
};
use halo_crypto::MasterKey;

pub async fn service() -> HaloService {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    HaloService::in_memory(&MasterKey::from_bytes([7u8; 32]), HaloConfig::default())
        .await
        .expect("in-memory service")
}

pub fn provenance(source_id: &str) -> ProvenanceInput {
    ProvenanceInput {
        source_kind: SourceKind::Bolagsverket,
        source_id: source_id.to_string(),
        url: None,
        document_hash: None,
        extraction_method: "test_fixture".to_string(),
        extracted_at: Utc::now(),
        system_version: "test".to_string(),
        derived_from: Vec::new(),
        derivation_rule: None,
    }
}

pub fn person_mention(name: &str, pnr: Option<&str>, birth_year: Option<i32>) -> MentionInput {
    MentionInput {
        kind: EntityKind::Person,
        surface_form: name.to_string(),
        normalized_form: name.to_uppercase(),
        personnummer: pnr.map(str::to_string),
        orgnummer: None,
        attributes: ExtractedAttributes {
            birth_year,
            ..Default::default()
        },
        document_location: None,
    }
}

pub fn company_mention(
    name: &str,
    orgnr: Option<&str>,
    employees: Option<i64>,
    revenue: Option<i64>,
) -> MentionInput {
    MentionInput {
        kind: EntityKind::Company,
        surface_form: name.to_string(),
        normalized_form: name.to_uppercase(),
        personnummer: None,
        orgnummer: orgnr.map(str::to_string),
        attributes: ExtractedAttributes {
            latest_employees: employees,
            latest_revenue: revenue,
            ..Default::default()
        },
        document_location: None,
    }
}

/// Ingest one mention and resolve it; returns the entity it landed on
pub async fn materialize(service: &HaloService, mention: MentionInput, source: &str) -> Uuid {
    let report = service
        .ingest_batch(SourceBatch {
            provenance: provenance(source),
            mentions: vec![mention],
            facts: Vec::new(),
        })
        .await
        .expect("ingest");
    let result = service
        .resolve_mention(report.mention_ids[0])
        .await
        .expect("resolve");
    match result.outcome {
        halo_resolve::ResolutionOutcome::AutoMatched { entity_id, .. } => entity_id,
        halo_resolve::ResolutionOutcome::NewEntity { entity_id } => entity_id,
        other => panic!("expected a terminal match, got {other:?}"),
    }
}

/// Assert a currently-valid relationship fact through the ingest path
pub async fn relate(service: &HaloService, subject: Uuid, predicate: Predicate, object: Uuid) {
    service
        .ingest_batch(SourceBatch {
            provenance: provenance("relationships"),
            mentions: Vec::new(),
            facts: vec![SourceFact {
                subject_id: subject,
                predicate,
                object_id: Some(object),
                value: None,
                valid_from: Utc::now().date_naive(),
                valid_to: None,
                confidence: 1.0,
            }],
        })
        .await
        .expect("relate");
}

#[allow(dead_code)]
pub fn float_value(fact_value: &FactValue) -> f64 {
    match fact_value {
        FactValue::Float(f) => *f,
        other => panic!("expected float value, got {other:?}"),
    }
}
