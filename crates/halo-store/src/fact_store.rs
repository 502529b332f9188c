//! Fact storage: append-only supersession, live lookups, graph queries

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use halo_core::{Fact, FactInput, FactValue, HaloError, Predicate};

use crate::{db_err, parse_json, parse_uuid, HaloDb, SqliteTx};

#[derive(FromRow)]
struct FactRow {
    id: String,
    subject_id: String,
    predicate: String,
    object_id: Option<String>,
    value_text: Option<String>,
    value_int: Option<i64>,
    value_float: Option<f64>,
    value_date: Option<NaiveDate>,
    value_bool: Option<bool>,
    value_json: Option<String>,
    relationship_attributes: Option<String>,
    valid_from: NaiveDate,
    valid_to: Option<NaiveDate>,
    confidence: f64,
    provenance_id: String,
    superseded_by: Option<String>,
    superseded_at: Option<DateTime<Utc>>,
    is_derived: bool,
    derivation_rule: Option<String>,
    derived_from: String,
    created_at: DateTime<Utc>,
}

impl FactRow {
    fn into_fact(self) -> Result<Fact, HaloError> {
        let value = if let Some(t) = self.value_text {
            Some(FactValue::Text(t))
        } else if let Some(i) = self.value_int {
            Some(FactValue::Int(i))
        } else if let Some(f) = self.value_float {
            Some(FactValue::Float(f))
        } else if let Some(d) = self.value_date {
            Some(FactValue::Date(d))
        } else if let Some(b) = self.value_bool {
            Some(FactValue::Bool(b))
        } else if let Some(j) = self.value_json {
            Some(FactValue::Json(parse_json(&j)?))
        } else {
            None
        };
        let derived_from: Vec<String> = parse_json(&self.derived_from)?;
        Ok(Fact {
            id: parse_uuid(&self.id)?,
            subject_id: parse_uuid(&self.subject_id)?,
            predicate: Predicate::parse(&self.predicate)
                .ok_or_else(|| HaloError::Storage(format!("unknown predicate {}", self.predicate)))?,
            object_id: self.object_id.as_deref().map(parse_uuid).transpose()?,
            value,
            relationship_attributes: self
                .relationship_attributes
                .as_deref()
                .map(parse_json)
                .transpose()?,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            confidence: self.confidence,
            provenance_id: parse_uuid(&self.provenance_id)?,
            superseded_by: self.superseded_by.as_deref().map(parse_uuid).transpose()?,
            superseded_at: self.superseded_at,
            is_derived: self.is_derived,
            derivation_rule: self.derivation_rule,
            derived_from: derived_from
                .iter()
                .map(|s| parse_uuid(s))
                .collect::<Result<_, _>>()?,
            created_at: self.created_at,
        })
    }
}

const FACT_COLUMNS: &str = "id, subject_id, predicate, object_id, value_text, value_int, \
                            value_float, value_date, value_bool, value_json, \
                            relationship_attributes, valid_from, valid_to, confidence, \
                            provenance_id, superseded_by, superseded_at, is_derived, \
                            derivation_rule, derived_from, created_at";

/// A live relationship edge, as the pattern detector sees the graph
#[derive(Debug, Clone)]
pub struct RelationshipEdge {
    pub fact_id: Uuid,
    pub subject_id: Uuid,
    pub object_id: Uuid,
    pub predicate: Predicate,
    pub valid_from: NaiveDate,
}

/// Per-address live registration counts, split by registrant kind
#[derive(Debug, Clone)]
pub struct AddressRegistrationCounts {
    pub address_id: Uuid,
    pub company_count: i64,
    pub person_count: i64,
}

#[derive(Clone)]
pub struct FactStore {
    db: HaloDb,
}

impl FactStore {
    pub fn new(db: HaloDb) -> Self {
        Self { db }
    }

    pub async fn insert_tx(&self, tx: &mut SqliteTx<'_>, input: &FactInput) -> Result<Fact, HaloError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let (value_text, value_int, value_float, value_date, value_bool, value_json) =
            split_value(input.value.as_ref())?;
        let derived_from_json = serde_json::to_string(
            &input
                .derived_from
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());

        sqlx::query(&format!(
            "INSERT INTO facts ({FACT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?, ?)"
        ))
        .bind(id.to_string())
        .bind(input.subject_id.to_string())
        .bind(input.predicate.as_str())
        .bind(input.object_id.map(|id| id.to_string()))
        .bind(value_text)
        .bind(value_int)
        .bind(value_float)
        .bind(value_date)
        .bind(value_bool)
        .bind(value_json)
        .bind(
            input
                .relationship_attributes
                .as_ref()
                .map(|v| v.to_string()),
        )
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(input.confidence)
        .bind(input.provenance_id.to_string())
        .bind(input.is_derived)
        .bind(&input.derivation_rule)
        .bind(derived_from_json)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        self.get_tx(tx, id).await?.ok_or_else(|| {
            HaloError::Storage(format!("fact {id} missing immediately after insert"))
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Fact>, HaloError> {
        let row = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(FactRow::into_fact).transpose()
    }

    async fn get_tx(&self, tx: &mut SqliteTx<'_>, id: Uuid) -> Result<Option<Fact>, HaloError> {
        let row = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
        row.map(FactRow::into_fact).transpose()
    }

    /// The single live fact for (subject, predicate, object)
    pub async fn current_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        subject_id: Uuid,
        predicate: Predicate,
        object_id: Option<Uuid>,
    ) -> Result<Option<Fact>, HaloError> {
        let sql = match object_id {
            Some(_) => format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE subject_id = ? AND predicate = ? \
                 AND object_id = ? AND superseded_by IS NULL AND valid_to IS NULL"
            ),
            None => format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE subject_id = ? AND predicate = ? \
                 AND object_id IS NULL AND superseded_by IS NULL AND valid_to IS NULL"
            ),
        };
        let mut query = sqlx::query_as::<_, FactRow>(&sql)
            .bind(subject_id.to_string())
            .bind(predicate.as_str());
        if let Some(object) = object_id {
            query = query.bind(object.to_string());
        }
        let row = query.fetch_optional(&mut **tx).await.map_err(db_err)?;
        row.map(FactRow::into_fact).transpose()
    }

    pub async fn current(
        &self,
        subject_id: Uuid,
        predicate: Predicate,
        object_id: Option<Uuid>,
    ) -> Result<Option<Fact>, HaloError> {
        let mut tx = self.db.begin().await?;
        let fact = self.current_tx(&mut tx, subject_id, predicate, object_id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(fact)
    }

    /// Mark a fact as replaced; only ever touches the supersession columns
    pub async fn supersede_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        old_id: Uuid,
        new_id: Uuid,
    ) -> Result<(), HaloError> {
        let result = sqlx::query(
            "UPDATE facts SET superseded_by = ?, superseded_at = ? \
             WHERE id = ? AND superseded_by IS NULL",
        )
        .bind(new_id.to_string())
        .bind(Utc::now())
        .bind(old_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(HaloError::Conflict(format!(
                "fact {old_id} already superseded"
            )));
        }
        Ok(())
    }

    /// Assert a fact, superseding any differing live predecessor
    ///
    /// Re-asserting an identical value is a no-op returning the existing
    /// fact, which is what makes re-derivation idempotent.
    pub async fn assert_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        input: &FactInput,
    ) -> Result<(Fact, Option<Uuid>), HaloError> {
        let existing = self
            .current_tx(tx, input.subject_id, input.predicate, input.object_id)
            .await?;

        if let Some(current) = existing {
            if current.value == input.value && current.object_id == input.object_id {
                return Ok((current, None));
            }
            // supersede first; the deferred FK lets the pointer lead the insert
            let new_id = Uuid::new_v4();
            let superseded_id = current.id;
            self.supersede_tx(tx, superseded_id, new_id).await?;
            let fact = self.insert_with_id_tx(tx, new_id, input).await?;
            debug!(old = %superseded_id, new = %fact.id, predicate = input.predicate.as_str(), "fact superseded");
            return Ok((fact, Some(superseded_id)));
        }

        let fact = self.insert_tx(tx, input).await?;
        Ok((fact, None))
    }

    async fn insert_with_id_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        id: Uuid,
        input: &FactInput,
    ) -> Result<Fact, HaloError> {
        let created_at = Utc::now();
        let (value_text, value_int, value_float, value_date, value_bool, value_json) =
            split_value(input.value.as_ref())?;
        let derived_from_json = serde_json::to_string(
            &input
                .derived_from
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());

        sqlx::query(&format!(
            "INSERT INTO facts ({FACT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?, ?)"
        ))
        .bind(id.to_string())
        .bind(input.subject_id.to_string())
        .bind(input.predicate.as_str())
        .bind(input.object_id.map(|id| id.to_string()))
        .bind(value_text)
        .bind(value_int)
        .bind(value_float)
        .bind(value_date)
        .bind(value_bool)
        .bind(value_json)
        .bind(
            input
                .relationship_attributes
                .as_ref()
                .map(|v| v.to_string()),
        )
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(input.confidence)
        .bind(input.provenance_id.to_string())
        .bind(input.is_derived)
        .bind(&input.derivation_rule)
        .bind(derived_from_json)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        self.get_tx(tx, id).await?.ok_or_else(|| {
            HaloError::Storage(format!("fact {id} missing immediately after insert"))
        })
    }

    /// Supersede one fact with a replacement in a single step
    pub async fn replace_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        old_id: Uuid,
        input: &FactInput,
    ) -> Result<Fact, HaloError> {
        let new_id = Uuid::new_v4();
        self.supersede_tx(tx, old_id, new_id).await?;
        self.insert_with_id_tx(tx, new_id, input).await
    }

    /// Close a live fact's validity window without superseding it
    pub async fn close_validity_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        id: Uuid,
        valid_to: NaiveDate,
    ) -> Result<(), HaloError> {
        let result = sqlx::query(
            "UPDATE facts SET valid_to = ? WHERE id = ? AND superseded_by IS NULL AND valid_to IS NULL",
        )
        .bind(valid_to)
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(HaloError::Conflict(format!("fact {id} is not live")));
        }
        Ok(())
    }

    /// Live facts with this entity as subject
    pub async fn live_for_subject(&self, subject_id: Uuid) -> Result<Vec<Fact>, HaloError> {
        let rows = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts \
             WHERE subject_id = ? AND superseded_by IS NULL AND valid_to IS NULL"
        ))
        .bind(subject_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Every fact ever asserted for (subject, predicate), superseded included
    pub async fn history_for_subject(
        &self,
        subject_id: Uuid,
        predicate: Predicate,
    ) -> Result<Vec<Fact>, HaloError> {
        let rows = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE subject_id = ? AND predicate = ? \
             ORDER BY created_at ASC"
        ))
        .bind(subject_id.to_string())
        .bind(predicate.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Live facts with this entity as object
    pub async fn live_for_object(&self, object_id: Uuid) -> Result<Vec<Fact>, HaloError> {
        let rows = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts \
             WHERE object_id = ? AND superseded_by IS NULL AND valid_to IS NULL"
        ))
        .bind(object_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Live facts touching this entity on either side (merge rewriting)
    pub async fn live_touching_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        entity_id: Uuid,
    ) -> Result<Vec<Fact>, HaloError> {
        let rows = sqlx::query_as::<_, FactRow>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts \
             WHERE (subject_id = ? OR object_id = ?) \
             AND superseded_by IS NULL AND valid_to IS NULL"
        ))
        .bind(entity_id.to_string())
        .bind(entity_id.to_string())
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Distinct entities at distance 1 over live relationship edges
    pub async fn neighbor_ids(&self, entity_id: Uuid) -> Result<Vec<Uuid>, HaloError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT CASE WHEN subject_id = ? THEN object_id ELSE subject_id END \
             FROM facts WHERE (subject_id = ? OR object_id = ?) AND object_id IS NOT NULL \
             AND predicate IN ('DIRECTOR_OF', 'SHAREHOLDER_OF') \
             AND superseded_by IS NULL AND valid_to IS NULL",
        )
        .bind(entity_id.to_string())
        .bind(entity_id.to_string())
        .bind(entity_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    /// All live edges of one predicate, for clustering and cycle detection
    pub async fn live_edges(&self, predicate: Predicate) -> Result<Vec<RelationshipEdge>, HaloError> {
        let rows: Vec<(String, String, String, NaiveDate)> = sqlx::query_as(
            "SELECT id, subject_id, object_id, valid_from FROM facts \
             WHERE predicate = ? AND object_id IS NOT NULL \
             AND superseded_by IS NULL AND valid_to IS NULL",
        )
        .bind(predicate.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|(fact_id, subject, object, valid_from)| {
                Ok(RelationshipEdge {
                    fact_id: parse_uuid(fact_id)?,
                    subject_id: parse_uuid(subject)?,
                    object_id: parse_uuid(object)?,
                    predicate,
                    valid_from: *valid_from,
                })
            })
            .collect()
    }

    /// Director changes on a company since a cutoff: new edges plus closed
    /// or superseded ones
    pub async fn director_changes_since(
        &self,
        company_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, HaloError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM facts WHERE predicate = 'DIRECTOR_OF' AND object_id = ? \
             AND (created_at >= ? OR superseded_at >= ?)",
        )
        .bind(company_id.to_string())
        .bind(cutoff)
        .bind(cutoff)
        .fetch_one(self.db.pool())
        .await
        .map_err(db_err)?;
        Ok(row.0)
    }

    /// Live registration counts per address, split by registrant kind
    pub async fn registration_counts_by_address(
        &self,
    ) -> Result<Vec<AddressRegistrationCounts>, HaloError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT f.object_id, \
             SUM(CASE WHEN e.kind = 'COMPANY' THEN 1 ELSE 0 END), \
             SUM(CASE WHEN e.kind = 'PERSON' THEN 1 ELSE 0 END) \
             FROM facts f JOIN entities e ON e.id = f.subject_id \
             WHERE f.predicate = 'REGISTERED_AT' AND f.object_id IS NOT NULL \
             AND f.superseded_by IS NULL AND f.valid_to IS NULL \
             GROUP BY f.object_id",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|(address, companies, persons)| {
                Ok(AddressRegistrationCounts {
                    address_id: parse_uuid(address)?,
                    company_count: *companies,
                    person_count: *persons,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityStore, ProvenanceStore};
    use halo_core::{Entity, EntityKind, ProvenanceInput, SourceKind};

    async fn fixture() -> (HaloDb, FactStore, Uuid, Uuid, Uuid) {
        let db = HaloDb::memory().await.unwrap();
        let entities = EntityStore::new(db.clone());
        let provenance = ProvenanceStore::new(db.clone());

        let person = Entity::new(EntityKind::Person, "ANNA SVENSSON", "ANSF");
        let company = Entity::new(EntityKind::Company, "BOLAGET AB", "PLKT");
        let mut tx = db.begin().await.unwrap();
        entities.insert_tx(&mut tx, &person).await.unwrap();
        entities.insert_tx(&mut tx, &company).await.unwrap();
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

        (db.clone(), FactStore::new(db), person.id, company.id, prov.id)
    }

    #[tokio::test]
    async fn assert_noops_equal_values_and_supersedes_changed_ones() {
        let (db, facts, person, _, prov) = fixture().await;
        let today = Utc::now().date_naive();
        let input = FactInput::derived(
            person,
            Predicate::RiskScore,
            FactValue::Float(0.3),
            today,
            prov,
            "person_risk_v1",
            Vec::new(),
        );

        let mut tx = db.begin().await.unwrap();
        let (first, superseded) = facts.assert_tx(&mut tx, &input).await.unwrap();
        assert!(superseded.is_none());

        let (same, superseded) = facts.assert_tx(&mut tx, &input).await.unwrap();
        assert_eq!(same.id, first.id, "equal value re-assertion is a no-op");
        assert!(superseded.is_none());

        let mut changed = input.clone();
        changed.value = Some(FactValue::Float(0.5));
        let (second, superseded) = facts.assert_tx(&mut tx, &changed).await.unwrap();
        assert_eq!(superseded, Some(first.id));
        tx.commit().await.unwrap();

        // the old row survives, mutated only in its supersession columns
        let old = facts.get(first.id).await.unwrap().unwrap();
        assert_eq!(old.superseded_by, Some(second.id));
        assert!(old.superseded_at.is_some());
        assert_eq!(old.value, Some(FactValue::Float(0.3)));

        let live = facts
            .current(person, Predicate::RiskScore, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.id, second.id);
    }

    #[tokio::test]
    async fn duplicate_live_relationship_is_a_conflict() {
        let (db, facts, person, company, prov) = fixture().await;
        let input = FactInput::relationship(
            person,
            Predicate::DirectorOf,
            company,
            Utc::now().date_naive(),
            1.0,
            prov,
        );

        let mut tx = db.begin().await.unwrap();
        facts.insert_tx(&mut tx, &input).await.unwrap();
        let err = facts.insert_tx(&mut tx, &input).await.unwrap_err();
        assert!(matches!(err, HaloError::Conflict(_)));
    }

    #[tokio::test]
    async fn closing_validity_removes_a_fact_from_the_live_set() {
        let (db, facts, person, company, prov) = fixture().await;
        let input = FactInput::relationship(
            person,
            Predicate::DirectorOf,
            company,
            Utc::now().date_naive(),
            1.0,
            prov,
        );
        let mut tx = db.begin().await.unwrap();
        let fact = facts.insert_tx(&mut tx, &input).await.unwrap();
        facts
            .close_validity_tx(&mut tx, fact.id, Utc::now().date_naive())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(facts.live_for_subject(person).await.unwrap().is_empty());
        assert!(facts
            .current(person, Predicate::DirectorOf, Some(company))
            .await
            .unwrap()
            .is_none());
    }
}

type SplitValue = (
    Option<String>,
    Option<i64>,
    Option<f64>,
    Option<NaiveDate>,
    Option<bool>,
    Option<String>,
);

fn split_value(value: Option<&FactValue>) -> Result<SplitValue, HaloError> {
    Ok(match value {
        None => (None, None, None, None, None, None),
        Some(FactValue::Text(t)) => (Some(t.clone()), None, None, None, None, None),
        Some(FactValue::Int(i)) => (None, Some(*i), None, None, None, None),
        Some(FactValue::Float(f)) => (None, None, Some(*f), None, None, None),
        Some(FactValue::Date(d)) => (None, None, None, Some(*d), None, None),
        Some(FactValue::Bool(b)) => (None, None, None, None, Some(*b), None),
        Some(FactValue::Json(j)) => (None, None, None, None, None, Some(j.to_string())),
    })
}
