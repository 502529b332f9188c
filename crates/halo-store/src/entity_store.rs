//! Entity, identifier, and attribute storage

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use halo_core::{
    AddressAttributes, CompanyAttributes, Entity, EntityIdentifier, EntityKind, EntityStatus,
    HaloError, IdentifierKind, PersonAttributes,
};

use crate::{db_err, parse_json, parse_uuid, HaloDb, SqliteTx};

#[derive(FromRow)]
struct EntityRow {
    id: String,
    kind: String,
    canonical_name: String,
    phonetic_code: String,
    resolution_confidence: f64,
    status: String,
    merged_into: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity, HaloError> {
        Ok(Entity {
            id: parse_uuid(&self.id)?,
            kind: EntityKind::parse(&self.kind)
                .ok_or_else(|| HaloError::Storage(format!("unknown entity kind {}", self.kind)))?,
            canonical_name: self.canonical_name,
            phonetic_code: self.phonetic_code,
            resolution_confidence: self.resolution_confidence,
            status: EntityStatus::parse(&self.status).ok_or_else(|| {
                HaloError::Storage(format!("unknown entity status {}", self.status))
            })?,
            merged_into: self.merged_into.as_deref().map(parse_uuid).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct IdentifierRow {
    id: String,
    entity_id: String,
    kind: String,
    value_cipher: String,
    blind_index: String,
    provenance_id: String,
    valid_from: Option<NaiveDate>,
    valid_to: Option<NaiveDate>,
    confidence: f64,
    created_at: DateTime<Utc>,
}

impl IdentifierRow {
    fn into_identifier(self) -> Result<EntityIdentifier, HaloError> {
        Ok(EntityIdentifier {
            id: parse_uuid(&self.id)?,
            entity_id: parse_uuid(&self.entity_id)?,
            kind: IdentifierKind::parse(&self.kind).ok_or_else(|| {
                HaloError::Storage(format!("unknown identifier kind {}", self.kind))
            })?,
            value_cipher: self.value_cipher,
            blind_index: self.blind_index,
            provenance_id: parse_uuid(&self.provenance_id)?,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            confidence: self.confidence,
            created_at: self.created_at,
        })
    }
}

const ENTITY_COLUMNS: &str = "id, kind, canonical_name, phonetic_code, resolution_confidence, \
                              status, merged_into, created_at, updated_at";

/// Store for entities and their owned identifier/attribute rows
#[derive(Clone)]
pub struct EntityStore {
    db: HaloDb,
}

impl EntityStore {
    pub fn new(db: HaloDb) -> Self {
        Self { db }
    }

    pub async fn insert_tx(&self, tx: &mut SqliteTx<'_>, entity: &Entity) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO entities (id, kind, canonical_name, phonetic_code, resolution_confidence, \
             status, merged_into, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entity.id.to_string())
        .bind(entity.kind.as_str())
        .bind(&entity.canonical_name)
        .bind(&entity.phonetic_code)
        .bind(entity.resolution_confidence)
        .bind(entity.status.as_str())
        .bind(entity.merged_into.map(|id| id.to_string()))
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        debug!(entity_id = %entity.id, kind = entity.kind.as_str(), "entity inserted");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Entity>, HaloError> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(EntityRow::into_entity).transpose()
    }

    pub async fn require(&self, id: Uuid) -> Result<Entity, HaloError> {
        self.get(id)
            .await?
            .ok_or_else(|| HaloError::NotFound(format!("entity {id}")))
    }

    /// Follow the merged_into chain up to a bounded depth
    pub async fn resolve_alias(&self, id: Uuid) -> Result<Entity, HaloError> {
        const MAX_HOPS: usize = 10;
        let mut current = self.require(id).await?;
        for _ in 0..MAX_HOPS {
            match (current.status, current.merged_into) {
                (EntityStatus::Merged, Some(next)) => current = self.require(next).await?,
                _ => return Ok(current),
            }
        }
        Err(HaloError::Storage(format!(
            "merge chain from {id} exceeds {MAX_HOPS} hops"
        )))
    }

    pub async fn set_status_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        id: Uuid,
        status: EntityStatus,
        merged_into: Option<Uuid>,
    ) -> Result<(), HaloError> {
        let result = sqlx::query(
            "UPDATE entities SET status = ?, merged_into = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(merged_into.map(|id| id.to_string()))
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(HaloError::NotFound(format!("entity {id}")));
        }
        Ok(())
    }

    pub async fn set_canonical_name_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        id: Uuid,
        canonical_name: &str,
        phonetic_code: &str,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "UPDATE entities SET canonical_name = ?, phonetic_code = ?, updated_at = ? WHERE id = ?",
        )
        .bind(canonical_name)
        .bind(phonetic_code)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Exact-identifier lookup: the fastest path in blocking
    ///
    /// A hit on a MERGED entity chases the merge chain to the survivor.
    /// ANONYMIZED entities never match because their identifier rows are
    /// dropped.
    pub async fn find_by_identifier(
        &self,
        kind: IdentifierKind,
        blind_index: &str,
    ) -> Result<Option<Entity>, HaloError> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT e.{} FROM entities e \
             JOIN entity_identifiers i ON i.entity_id = e.id \
             WHERE i.kind = ? AND i.blind_index = ? AND e.status IN ('ACTIVE', 'MERGED') \
             LIMIT 1",
            ENTITY_COLUMNS.replace(", ", ", e.")
        ))
        .bind(kind.as_str())
        .bind(blind_index)
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        match row.map(EntityRow::into_entity).transpose()? {
            Some(entity) if entity.status == EntityStatus::Merged => {
                Ok(Some(self.resolve_alias(entity.id).await?))
            }
            other => Ok(other),
        }
    }

    /// ACTIVE entities of a kind sharing a phonetic code
    pub async fn phonetic_candidates(
        &self,
        kind: EntityKind,
        phonetic_code: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, HaloError> {
        let rows = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE kind = ? AND status = 'ACTIVE' AND phonetic_code = ? LIMIT ?"
        ))
        .bind(kind.as_str())
        .bind(phonetic_code)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// ACTIVE entities of a kind whose canonical name starts with a prefix
    pub async fn name_prefix_candidates(
        &self,
        kind: EntityKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, HaloError> {
        let pattern = format!("{}%", like_escape(prefix));
        let rows = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE kind = ? AND status = 'ACTIVE' AND canonical_name LIKE ? ESCAPE '\\' LIMIT ?"
        ))
        .bind(kind.as_str())
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// Persons matching a name prefix and an exact birth year
    pub async fn prefix_birth_year_candidates(
        &self,
        prefix: &str,
        birth_year: i32,
        limit: usize,
    ) -> Result<Vec<Entity>, HaloError> {
        let pattern = format!("{}%", like_escape(prefix));
        let rows = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT e.{} FROM entities e \
             JOIN person_attributes p ON p.entity_id = e.id \
             WHERE e.kind = 'PERSON' AND e.status = 'ACTIVE' \
             AND e.canonical_name LIKE ? ESCAPE '\\' AND p.birth_year = ? LIMIT ?",
            ENTITY_COLUMNS.replace(", ", ", e.")
        ))
        .bind(pattern)
        .bind(birth_year)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// Address entities whose postal code starts with the given digits
    pub async fn postal_prefix_candidates(
        &self,
        postal_prefix: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, HaloError> {
        let pattern = format!("{}%", like_escape(postal_prefix));
        let rows = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT e.{} FROM entities e \
             JOIN address_attributes a ON a.entity_id = e.id \
             WHERE e.kind = 'ADDRESS' AND e.status = 'ACTIVE' \
             AND a.postal_code LIKE ? ESCAPE '\\' LIMIT ?",
            ENTITY_COLUMNS.replace(", ", ", e.")
        ))
        .bind(pattern)
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    /// ACTIVE entity ids of a kind, for batch derivation scans
    pub async fn active_ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, HaloError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM entities WHERE kind = ? AND status = 'ACTIVE'")
                .bind(kind.as_str())
                .fetch_all(self.db.pool())
                .await
                .map_err(db_err)?;
        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    // --- identifiers ---

    pub async fn insert_identifier_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        identifier: &EntityIdentifier,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO entity_identifiers (id, entity_id, kind, value_cipher, blind_index, \
             provenance_id, valid_from, valid_to, confidence, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(identifier.id.to_string())
        .bind(identifier.entity_id.to_string())
        .bind(identifier.kind.as_str())
        .bind(&identifier.value_cipher)
        .bind(&identifier.blind_index)
        .bind(identifier.provenance_id.to_string())
        .bind(identifier.valid_from)
        .bind(identifier.valid_to)
        .bind(identifier.confidence)
        .bind(identifier.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn identifiers_for(&self, entity_id: Uuid) -> Result<Vec<EntityIdentifier>, HaloError> {
        let rows = sqlx::query_as::<_, IdentifierRow>(
            "SELECT id, entity_id, kind, value_cipher, blind_index, provenance_id, \
             valid_from, valid_to, confidence, created_at \
             FROM entity_identifiers WHERE entity_id = ?",
        )
        .bind(entity_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(IdentifierRow::into_identifier).collect()
    }

    /// Anonymization drops identifier rows outright
    pub async fn delete_identifiers_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        entity_id: Uuid,
    ) -> Result<u64, HaloError> {
        let result = sqlx::query("DELETE FROM entity_identifiers WHERE entity_id = ?")
            .bind(entity_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // --- attributes ---

    pub async fn upsert_person_attributes_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        attrs: &PersonAttributes,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO person_attributes (entity_id, birth_year, birth_date, gender, \
             directorship_count, active_directorship_count, dissolved_company_count, \
             risk_score, risk_factors, cluster_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(entity_id) DO UPDATE SET birth_year = excluded.birth_year, \
             birth_date = excluded.birth_date, gender = excluded.gender, \
             directorship_count = excluded.directorship_count, \
             active_directorship_count = excluded.active_directorship_count, \
             dissolved_company_count = excluded.dissolved_company_count, \
             risk_score = excluded.risk_score, risk_factors = excluded.risk_factors, \
             cluster_id = excluded.cluster_id",
        )
        .bind(attrs.entity_id.to_string())
        .bind(attrs.birth_year)
        .bind(attrs.birth_date)
        .bind(&attrs.gender)
        .bind(attrs.directorship_count)
        .bind(attrs.active_directorship_count)
        .bind(attrs.dissolved_company_count)
        .bind(attrs.risk_score)
        .bind(serde_json::to_string(&attrs.risk_factors).unwrap_or_else(|_| "[]".to_string()))
        .bind(&attrs.cluster_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_person_attributes(&self, attrs: &PersonAttributes) -> Result<(), HaloError> {
        let mut tx = self.db.begin().await?;
        self.upsert_person_attributes_tx(&mut tx, attrs).await?;
        tx.commit().await.map_err(db_err)
    }

    pub async fn person_attributes(
        &self,
        entity_id: Uuid,
    ) -> Result<Option<PersonAttributes>, HaloError> {
        #[derive(FromRow)]
        struct Row {
            entity_id: String,
            birth_year: Option<i32>,
            birth_date: Option<NaiveDate>,
            gender: Option<String>,
            directorship_count: i64,
            active_directorship_count: i64,
            dissolved_company_count: i64,
            risk_score: Option<f64>,
            risk_factors: String,
            cluster_id: Option<String>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT entity_id, birth_year, birth_date, gender, directorship_count, \
             active_directorship_count, dissolved_company_count, risk_score, risk_factors, \
             cluster_id FROM person_attributes WHERE entity_id = ?",
        )
        .bind(entity_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(|r| {
            Ok(PersonAttributes {
                entity_id: parse_uuid(&r.entity_id)?,
                birth_year: r.birth_year,
                birth_date: r.birth_date,
                gender: r.gender,
                directorship_count: r.directorship_count,
                active_directorship_count: r.active_directorship_count,
                dissolved_company_count: r.dissolved_company_count,
                risk_score: r.risk_score,
                risk_factors: parse_json(&r.risk_factors)?,
                cluster_id: r.cluster_id,
            })
        })
        .transpose()
    }

    pub async fn upsert_company_attributes_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        attrs: &CompanyAttributes,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO company_attributes (entity_id, legal_form, status, registration_date, \
             dissolution_date, sni_codes, latest_revenue, latest_employees, director_count, \
             director_change_velocity, shell_indicators, risk_score, cluster_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(entity_id) DO UPDATE SET legal_form = excluded.legal_form, \
             status = excluded.status, registration_date = excluded.registration_date, \
             dissolution_date = excluded.dissolution_date, sni_codes = excluded.sni_codes, \
             latest_revenue = excluded.latest_revenue, latest_employees = excluded.latest_employees, \
             director_count = excluded.director_count, \
             director_change_velocity = excluded.director_change_velocity, \
             shell_indicators = excluded.shell_indicators, risk_score = excluded.risk_score, \
             cluster_id = excluded.cluster_id",
        )
        .bind(attrs.entity_id.to_string())
        .bind(&attrs.legal_form)
        .bind(&attrs.status)
        .bind(attrs.registration_date)
        .bind(attrs.dissolution_date)
        .bind(serde_json::to_string(&attrs.sni_codes).unwrap_or_else(|_| "[]".to_string()))
        .bind(attrs.latest_revenue)
        .bind(attrs.latest_employees)
        .bind(attrs.director_count)
        .bind(attrs.director_change_velocity)
        .bind(serde_json::to_string(&attrs.shell_indicators).unwrap_or_else(|_| "[]".to_string()))
        .bind(attrs.risk_score)
        .bind(&attrs.cluster_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_company_attributes(
        &self,
        attrs: &CompanyAttributes,
    ) -> Result<(), HaloError> {
        let mut tx = self.db.begin().await?;
        self.upsert_company_attributes_tx(&mut tx, attrs).await?;
        tx.commit().await.map_err(db_err)
    }

    pub async fn company_attributes(
        &self,
        entity_id: Uuid,
    ) -> Result<Option<CompanyAttributes>, HaloError> {
        #[derive(FromRow)]
        struct Row {
            entity_id: String,
            legal_form: Option<String>,
            status: Option<String>,
            registration_date: Option<NaiveDate>,
            dissolution_date: Option<NaiveDate>,
            sni_codes: String,
            latest_revenue: Option<i64>,
            latest_employees: Option<i64>,
            director_count: i64,
            director_change_velocity: Option<f64>,
            shell_indicators: String,
            risk_score: Option<f64>,
            cluster_id: Option<String>,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT entity_id, legal_form, status, registration_date, dissolution_date, \
             sni_codes, latest_revenue, latest_employees, director_count, \
             director_change_velocity, shell_indicators, risk_score, cluster_id \
             FROM company_attributes WHERE entity_id = ?",
        )
        .bind(entity_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(|r| {
            Ok(CompanyAttributes {
                entity_id: parse_uuid(&r.entity_id)?,
                legal_form: r.legal_form,
                status: r.status,
                registration_date: r.registration_date,
                dissolution_date: r.dissolution_date,
                sni_codes: parse_json(&r.sni_codes)?,
                latest_revenue: r.latest_revenue,
                latest_employees: r.latest_employees,
                director_count: r.director_count,
                director_change_velocity: r.director_change_velocity,
                shell_indicators: parse_json(&r.shell_indicators)?,
                risk_score: r.risk_score,
                cluster_id: r.cluster_id,
            })
        })
        .transpose()
    }

    pub async fn upsert_address_attributes_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        attrs: &AddressAttributes,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO address_attributes (entity_id, street, street_number, entrance, \
             postal_code, city, latitude, longitude, vulnerable_area, company_count, \
             person_count, registration_hub) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(entity_id) DO UPDATE SET street = excluded.street, \
             street_number = excluded.street_number, entrance = excluded.entrance, \
             postal_code = excluded.postal_code, city = excluded.city, \
             latitude = excluded.latitude, longitude = excluded.longitude, \
             vulnerable_area = excluded.vulnerable_area, company_count = excluded.company_count, \
             person_count = excluded.person_count, registration_hub = excluded.registration_hub",
        )
        .bind(attrs.entity_id.to_string())
        .bind(&attrs.street)
        .bind(&attrs.street_number)
        .bind(&attrs.entrance)
        .bind(&attrs.postal_code)
        .bind(&attrs.city)
        .bind(attrs.latitude)
        .bind(attrs.longitude)
        .bind(attrs.vulnerable_area)
        .bind(attrs.company_count)
        .bind(attrs.person_count)
        .bind(attrs.registration_hub)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_address_attributes(
        &self,
        attrs: &AddressAttributes,
    ) -> Result<(), HaloError> {
        let mut tx = self.db.begin().await?;
        self.upsert_address_attributes_tx(&mut tx, attrs).await?;
        tx.commit().await.map_err(db_err)
    }

    pub async fn address_attributes(
        &self,
        entity_id: Uuid,
    ) -> Result<Option<AddressAttributes>, HaloError> {
        #[derive(FromRow)]
        struct Row {
            entity_id: String,
            street: Option<String>,
            street_number: Option<String>,
            entrance: Option<String>,
            postal_code: Option<String>,
            city: Option<String>,
            latitude: Option<f64>,
            longitude: Option<f64>,
            vulnerable_area: bool,
            company_count: i64,
            person_count: i64,
            registration_hub: bool,
        }
        let row = sqlx::query_as::<_, Row>(
            "SELECT entity_id, street, street_number, entrance, postal_code, city, latitude, \
             longitude, vulnerable_area, company_count, person_count, registration_hub \
             FROM address_attributes WHERE entity_id = ?",
        )
        .bind(entity_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(|r| {
            Ok(AddressAttributes {
                entity_id: parse_uuid(&r.entity_id)?,
                street: r.street,
                street_number: r.street_number,
                entrance: r.entrance,
                postal_code: r.postal_code,
                city: r.city,
                latitude: r.latitude,
                longitude: r.longitude,
                vulnerable_area: r.vulnerable_area,
                company_count: r.company_count,
                person_count: r.person_count,
                registration_hub: r.registration_hub,
            })
        })
        .transpose()
    }

    /// Strip PII-bearing attribute fields on anonymization
    pub async fn strip_person_pii_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        entity_id: Uuid,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "UPDATE person_attributes SET birth_year = NULL, birth_date = NULL, gender = NULL \
             WHERE entity_id = ?",
        )
        .bind(entity_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

/// Escape LIKE wildcards in user-derived prefixes
fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProvenanceStore;
    use halo_core::{ProvenanceInput, SourceKind};

    #[test]
    fn like_escape_neutralizes_wildcards() {
        assert_eq!(like_escape("AB%_C"), "AB\\%\\_C");
    }

    async fn fixture() -> (HaloDb, EntityStore, Uuid) {
        let db = HaloDb::memory().await.unwrap();
        let entities = EntityStore::new(db.clone());
        let provenance = ProvenanceStore::new(db.clone());
        let mut tx = db.begin().await.unwrap();
        let prov = provenance
            .insert_tx(
                &mut tx,
                &ProvenanceInput {
                    source_kind: SourceKind::ManualEntry,
                    source_id: "fixture".to_string(),
                    url: None,
                    document_hash: None,
                    extraction_method: "test".to_string(),
                    extracted_at: Utc::now(),
                    system_version: "test".to_string(),
                    derived_from: Vec::new(),
                    derivation_rule: None,
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (db, entities, prov.id)
    }

    fn identifier(entity_id: Uuid, provenance_id: Uuid, index: &str) -> EntityIdentifier {
        EntityIdentifier {
            id: Uuid::new_v4(),
            entity_id,
            kind: IdentifierKind::Personnummer,
            value_cipher: "enc2:AAAA:BBBB".to_string(),
            blind_index: index.to_string(),
            provenance_id,
            valid_from: None,
            valid_to: None,
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn national_identifiers_denote_exactly_one_entity() {
        let (db, entities, prov) = fixture().await;
        let index = "ab".repeat(16);

        let first = Entity::new(EntityKind::Person, "FÖRSTA PERSONEN", "FRST");
        let second = Entity::new(EntityKind::Person, "ANDRA PERSONEN", "ANTR");
        let mut tx = db.begin().await.unwrap();
        entities.insert_tx(&mut tx, &first).await.unwrap();
        entities.insert_tx(&mut tx, &second).await.unwrap();
        entities
            .insert_identifier_tx(&mut tx, &identifier(first.id, prov, &index))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // a second entity claiming the same personnummer loses the race
        let mut tx = db.begin().await.unwrap();
        let err = entities
            .insert_identifier_tx(&mut tx, &identifier(second.id, prov, &index))
            .await
            .unwrap_err();
        assert!(matches!(err, HaloError::Conflict(_)));
        drop(tx);

        let found = entities
            .find_by_identifier(IdentifierKind::Personnummer, &index)
            .await
            .unwrap()
            .expect("identifier resolves");
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn merged_entity_lookup_chases_the_survivor() {
        let (db, entities, prov) = fixture().await;
        let index = "cd".repeat(16);

        let survivor = Entity::new(EntityKind::Person, "KVAR PERSONEN", "KFRP");
        let merged = Entity::new(EntityKind::Person, "BORTA PERSONEN", "PRTP");
        let mut tx = db.begin().await.unwrap();
        entities.insert_tx(&mut tx, &survivor).await.unwrap();
        entities.insert_tx(&mut tx, &merged).await.unwrap();
        entities
            .insert_identifier_tx(&mut tx, &identifier(merged.id, prov, &index))
            .await
            .unwrap();
        entities
            .set_status_tx(&mut tx, merged.id, EntityStatus::Merged, Some(survivor.id))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let found = entities
            .find_by_identifier(IdentifierKind::Personnummer, &index)
            .await
            .unwrap()
            .expect("merged identifier still resolves");
        assert_eq!(found.id, survivor.id, "lookup lands on the survivor");
    }
}
