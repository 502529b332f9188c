//! Provenance storage; referenced widely, never deleted

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use halo_core::{HaloError, Provenance, ProvenanceInput, SourceKind};

use crate::{db_err, parse_json, parse_uuid, HaloDb, SqliteTx};

#[derive(FromRow)]
struct ProvenanceRow {
    id: String,
    source_kind: String,
    source_id: String,
    url: Option<String>,
    document_hash: Option<String>,
    extraction_method: String,
    extracted_at: DateTime<Utc>,
    system_version: String,
    derived_from: String,
    derivation_rule: Option<String>,
    created_at: DateTime<Utc>,
}

impl ProvenanceRow {
    fn into_provenance(self) -> Result<Provenance, HaloError> {
        let derived_from: Vec<String> = parse_json(&self.derived_from)?;
        Ok(Provenance {
            id: parse_uuid(&self.id)?,
            source_kind: SourceKind::parse(&self.source_kind),
            source_id: self.source_id,
            url: self.url,
            document_hash: self.document_hash,
            extraction_method: self.extraction_method,
            extracted_at: self.extracted_at,
            system_version: self.system_version,
            derived_from: derived_from
                .iter()
                .map(|s| parse_uuid(s))
                .collect::<Result<_, _>>()?,
            derivation_rule: self.derivation_rule,
            created_at: self.created_at,
        })
    }
}

#[derive(Clone)]
pub struct ProvenanceStore {
    db: HaloDb,
}

impl ProvenanceStore {
    pub fn new(db: HaloDb) -> Self {
        Self { db }
    }

    pub async fn insert_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        input: &ProvenanceInput,
    ) -> Result<Provenance, HaloError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let derived_from_json = serde_json::to_string(
            &input
                .derived_from
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO provenance (id, source_kind, source_id, url, document_hash, \
             extraction_method, extracted_at, system_version, derived_from, derivation_rule, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(input.source_kind.as_str())
        .bind(&input.source_id)
        .bind(&input.url)
        .bind(&input.document_hash)
        .bind(&input.extraction_method)
        .bind(input.extracted_at)
        .bind(&input.system_version)
        .bind(derived_from_json)
        .bind(&input.derivation_rule)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(Provenance {
            id,
            source_kind: input.source_kind.clone(),
            source_id: input.source_id.clone(),
            url: input.url.clone(),
            document_hash: input.document_hash.clone(),
            extraction_method: input.extraction_method.clone(),
            extracted_at: input.extracted_at,
            system_version: input.system_version.clone(),
            derived_from: input.derived_from.clone(),
            derivation_rule: input.derivation_rule.clone(),
            created_at,
        })
    }

    pub async fn insert(&self, input: &ProvenanceInput) -> Result<Provenance, HaloError> {
        let mut tx = self.db.begin().await?;
        let provenance = self.insert_tx(&mut tx, input).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(provenance)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Provenance>, HaloError> {
        let row = sqlx::query_as::<_, ProvenanceRow>(
            "SELECT id, source_kind, source_id, url, document_hash, extraction_method, \
             extracted_at, system_version, derived_from, derivation_rule, created_at \
             FROM provenance WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(ProvenanceRow::into_provenance).transpose()
    }
}
