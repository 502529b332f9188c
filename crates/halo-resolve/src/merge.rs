//! Entity merge and anonymization
//!
//! A merge keeps both rows: the loser transitions to MERGED pointing at the
//! survivor, every live fact touching the loser is rewritten onto the
//! survivor through supersession, and a SAME_AS fact records the identity
//! assertion. Merge is not transitive at read time; readers chase the
//! `merged_into` chain.

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use halo_core::{
    AuditEventInput, AuditEventType, EntityStatus, FactInput, HaloError, Predicate,
    ProvenanceInput, SourceKind,
};
use halo_store::db_err;

use crate::resolver::Resolver;

/// What a merge did, for the caller and the audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub survivor: Uuid,
    pub merged: Uuid,
    pub facts_rewritten: usize,
    pub facts_closed: usize,
}

impl Resolver {
    /// Merge two live entities that denote the same thing
    ///
    /// The survivor is the older entity (id as final tiebreak).
    pub async fn merge_entities(
        &self,
        first: Uuid,
        second: Uuid,
        reviewer: &str,
        justification: Option<&str>,
    ) -> Result<MergeReport, HaloError> {
        if first == second {
            return Err(HaloError::Validation("cannot merge an entity with itself".into()));
        }
        let a = self.entities.require(first).await?;
        let b = self.entities.require(second).await?;
        for entity in [&a, &b] {
            if entity.status != EntityStatus::Active {
                return Err(HaloError::Validation(format!(
                    "entity {} is {}, not ACTIVE",
                    entity.id,
                    entity.status.as_str()
                )));
            }
        }
        if a.kind != b.kind {
            return Err(HaloError::Validation(format!(
                "cannot merge {} with {}",
                a.kind.as_str(),
                b.kind.as_str()
            )));
        }

        let (survivor, loser) = if (a.created_at, a.id) <= (b.created_at, b.id) {
            (a, b)
        } else {
            (b, a)
        };

        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db().begin().await?;

        let provenance = self
            .provenance
            .insert_tx(
                &mut tx,
                &ProvenanceInput {
                    source_kind: SourceKind::ManualEntry,
                    source_id: format!("merge:{}:{}", loser.id, survivor.id),
                    url: None,
                    document_hash: None,
                    extraction_method: "entity_merge".to_string(),
                    extracted_at: Utc::now(),
                    system_version: env!("CARGO_PKG_VERSION").to_string(),
                    derived_from: Vec::new(),
                    derivation_rule: None,
                },
            )
            .await?;

        let mut rewritten = 0usize;
        let mut closed = 0usize;
        let today = Utc::now().date_naive();

        for fact in self.facts.live_touching_tx(&mut tx, loser.id).await? {
            let new_subject = if fact.subject_id == loser.id {
                survivor.id
            } else {
                fact.subject_id
            };
            let new_object = fact.object_id.map(|object| {
                if object == loser.id {
                    survivor.id
                } else {
                    object
                }
            });

            // a fact between the pair would become a self-loop
            if new_object == Some(new_subject) {
                self.facts.close_validity_tx(&mut tx, fact.id, today).await?;
                closed += 1;
                continue;
            }

            // the survivor may already hold an equivalent live fact
            let duplicate = self
                .facts
                .current_tx(&mut tx, new_subject, fact.predicate, new_object)
                .await?
                .is_some();
            if duplicate {
                self.facts.close_validity_tx(&mut tx, fact.id, today).await?;
                closed += 1;
                continue;
            }

            let input = FactInput {
                subject_id: new_subject,
                predicate: fact.predicate,
                object_id: new_object,
                value: fact.value.clone(),
                relationship_attributes: fact.relationship_attributes.clone(),
                valid_from: fact.valid_from,
                valid_to: None,
                confidence: fact.confidence,
                provenance_id: fact.provenance_id,
                is_derived: fact.is_derived,
                derivation_rule: fact.derivation_rule.clone(),
                derived_from: fact.derived_from.clone(),
            };
            self.facts.replace_tx(&mut tx, fact.id, &input).await?;
            rewritten += 1;
        }

        // the identity assertion itself
        self.facts
            .insert_tx(
                &mut tx,
                &FactInput::relationship(
                    loser.id,
                    Predicate::SameAs,
                    survivor.id,
                    today,
                    1.0,
                    provenance.id,
                ),
            )
            .await?;

        self.entities
            .set_status_tx(&mut tx, loser.id, EntityStatus::Merged, Some(survivor.id))
            .await?;

        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::user(
                    AuditEventType::EntitiesMerged,
                    reviewer,
                    "entity",
                    loser.id.to_string(),
                    json!({
                        "survivor": survivor.id.to_string(),
                        "facts_rewritten": rewritten,
                        "facts_closed": closed,
                        "justification": justification,
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(
            survivor = %survivor.id,
            merged = %loser.id,
            rewritten,
            "entities merged"
        );
        Ok(MergeReport {
            survivor: survivor.id,
            merged: loser.id,
            facts_rewritten: rewritten,
            facts_closed: closed,
        })
    }

    /// Strip an entity's PII while preserving id, kind, and facts
    ///
    /// The entity leaves ACTIVE lookups; its attribute PII fields are
    /// cleared and its identifier rows dropped.
    pub async fn anonymize_entity(&self, entity_id: Uuid, actor: &str) -> Result<(), HaloError> {
        let entity = self.entities.require(entity_id).await?;
        if entity.status == EntityStatus::Anonymized {
            return Ok(());
        }

        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db().begin().await?;

        self.entities
            .set_status_tx(&mut tx, entity.id, EntityStatus::Anonymized, None)
            .await?;
        self.entities.strip_person_pii_tx(&mut tx, entity.id).await?;
        let dropped = self.entities.delete_identifiers_tx(&mut tx, entity.id).await?;

        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::user(
                    AuditEventType::EntityAnonymized,
                    actor,
                    "entity",
                    entity.id.to_string(),
                    json!({ "identifiers_dropped": dropped }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(entity_id = %entity.id, "entity anonymized");
        Ok(())
    }
}
