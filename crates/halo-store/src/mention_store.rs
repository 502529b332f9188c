//! Mention lifecycle storage and per-candidate resolution decisions

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use halo_core::{
    DecisionOutcome, EntityKind, HaloError, Mention, MentionInput, ResolutionDecision,
    ResolutionStatus,
};

use crate::{db_err, parse_json, parse_uuid, HaloDb, PiiCodec, SqliteTx};

#[derive(FromRow)]
struct MentionRow {
    id: String,
    kind: String,
    surface_form: String,
    normalized_form: String,
    personnummer_cipher: Option<String>,
    personnummer_index: Option<String>,
    orgnummer_cipher: Option<String>,
    orgnummer_index: Option<String>,
    attributes: String,
    provenance_id: String,
    document_location: Option<String>,
    resolution_status: String,
    resolved_to: Option<String>,
    resolution_confidence: Option<f64>,
    resolution_method: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl MentionRow {
    fn into_mention(self) -> Result<Mention, HaloError> {
        Ok(Mention {
            id: parse_uuid(&self.id)?,
            kind: EntityKind::parse(&self.kind)
                .ok_or_else(|| HaloError::Storage(format!("unknown mention kind {}", self.kind)))?,
            surface_form: self.surface_form,
            normalized_form: self.normalized_form,
            personnummer_cipher: self.personnummer_cipher,
            personnummer_index: self.personnummer_index,
            orgnummer_cipher: self.orgnummer_cipher,
            orgnummer_index: self.orgnummer_index,
            attributes: parse_json(&self.attributes)?,
            provenance_id: parse_uuid(&self.provenance_id)?,
            document_location: self.document_location,
            resolution_status: ResolutionStatus::parse(&self.resolution_status).ok_or_else(
                || HaloError::Storage(format!("unknown status {}", self.resolution_status)),
            )?,
            resolved_to: self.resolved_to.as_deref().map(parse_uuid).transpose()?,
            resolution_confidence: self.resolution_confidence,
            resolution_method: self.resolution_method,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct DecisionRow {
    id: String,
    mention_id: String,
    candidate_entity_id: Option<String>,
    overall_score: f64,
    feature_scores: String,
    outcome: String,
    reviewer: Option<String>,
    justification: Option<String>,
    created_at: DateTime<Utc>,
}

impl DecisionRow {
    fn into_decision(self) -> Result<ResolutionDecision, HaloError> {
        Ok(ResolutionDecision {
            id: parse_uuid(&self.id)?,
            mention_id: parse_uuid(&self.mention_id)?,
            candidate_entity_id: self
                .candidate_entity_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            overall_score: self.overall_score,
            feature_scores: parse_json(&self.feature_scores)?,
            outcome: DecisionOutcome::parse(&self.outcome)
                .ok_or_else(|| HaloError::Storage(format!("unknown outcome {}", self.outcome)))?,
            reviewer: self.reviewer,
            justification: self.justification,
            created_at: self.created_at,
        })
    }
}

const MENTION_COLUMNS: &str = "id, kind, surface_form, normalized_form, personnummer_cipher, \
                               personnummer_index, orgnummer_cipher, orgnummer_index, attributes, \
                               provenance_id, document_location, resolution_status, resolved_to, \
                               resolution_confidence, resolution_method, resolved_by, resolved_at, \
                               created_at";

#[derive(Clone)]
pub struct MentionStore {
    db: HaloDb,
}

impl MentionStore {
    pub fn new(db: HaloDb) -> Self {
        Self { db }
    }

    /// Insert a PENDING mention, encrypting extracted identifiers
    pub async fn insert_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        input: &MentionInput,
        provenance_id: Uuid,
        codec: &PiiCodec,
    ) -> Result<Mention, HaloError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let (pnr_cipher, pnr_index) = match &input.personnummer {
            Some(pnr) => {
                let (cipher, index) = codec.protect(pnr)?;
                (Some(cipher), Some(index))
            }
            None => (None, None),
        };
        let (orgnr_cipher, orgnr_index) = match &input.orgnummer {
            Some(orgnr) => {
                let (cipher, index) = codec.protect(orgnr)?;
                (Some(cipher), Some(index))
            }
            None => (None, None),
        };

        let attributes_json = serde_json::to_string(&input.attributes)
            .map_err(|e| HaloError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            "INSERT INTO mentions ({MENTION_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', NULL, NULL, NULL, NULL, NULL, ?)"
        ))
        .bind(id.to_string())
        .bind(input.kind.as_str())
        .bind(&input.surface_form)
        .bind(&input.normalized_form)
        .bind(&pnr_cipher)
        .bind(&pnr_index)
        .bind(&orgnr_cipher)
        .bind(&orgnr_index)
        .bind(attributes_json)
        .bind(provenance_id.to_string())
        .bind(&input.document_location)
        .bind(created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(Mention {
            id,
            kind: input.kind,
            surface_form: input.surface_form.clone(),
            normalized_form: input.normalized_form.clone(),
            personnummer_cipher: pnr_cipher,
            personnummer_index: pnr_index,
            orgnummer_cipher: orgnr_cipher,
            orgnummer_index: orgnr_index,
            attributes: input.attributes.clone(),
            provenance_id,
            document_location: input.document_location.clone(),
            resolution_status: ResolutionStatus::Pending,
            resolved_to: None,
            resolution_confidence: None,
            resolution_method: None,
            resolved_by: None,
            resolved_at: None,
            created_at,
        })
    }

    pub async fn insert(
        &self,
        input: &MentionInput,
        provenance_id: Uuid,
        codec: &PiiCodec,
    ) -> Result<Mention, HaloError> {
        let mut tx = self.db.begin().await?;
        let mention = self.insert_tx(&mut tx, input, provenance_id, codec).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(mention)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Mention>, HaloError> {
        let row = sqlx::query_as::<_, MentionRow>(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(db_err)?;
        row.map(MentionRow::into_mention).transpose()
    }

    pub async fn require(&self, id: Uuid) -> Result<Mention, HaloError> {
        self.get(id)
            .await?
            .ok_or_else(|| HaloError::NotFound(format!("mention {id}")))
    }

    /// PENDING mentions, oldest first, optionally filtered by kind
    pub async fn pending(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<Mention>, HaloError> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query_as::<_, MentionRow>(&format!(
                    "SELECT {MENTION_COLUMNS} FROM mentions \
                     WHERE resolution_status = 'PENDING' AND kind = ? \
                     ORDER BY created_at ASC LIMIT ?"
                ))
                .bind(kind.as_str())
                .bind(limit as i64)
                .fetch_all(self.db.pool())
                .await
            }
            None => {
                sqlx::query_as::<_, MentionRow>(&format!(
                    "SELECT {MENTION_COLUMNS} FROM mentions \
                     WHERE resolution_status = 'PENDING' ORDER BY created_at ASC LIMIT ?"
                ))
                .bind(limit as i64)
                .fetch_all(self.db.pool())
                .await
            }
        }
        .map_err(db_err)?;
        rows.into_iter().map(MentionRow::into_mention).collect()
    }

    /// Terminal (or review re-entry) transition of a mention
    pub async fn update_resolution_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        mention_id: Uuid,
        status: ResolutionStatus,
        resolved_to: Option<Uuid>,
        confidence: Option<f64>,
        method: Option<&str>,
        resolved_by: Option<&str>,
    ) -> Result<(), HaloError> {
        let resolved_at = match status {
            ResolutionStatus::Pending => None,
            _ => Some(Utc::now()),
        };
        let result = sqlx::query(
            "UPDATE mentions SET resolution_status = ?, resolved_to = ?, \
             resolution_confidence = ?, resolution_method = ?, resolved_by = ?, resolved_at = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(resolved_to.map(|id| id.to_string()))
        .bind(confidence)
        .bind(method)
        .bind(resolved_by)
        .bind(resolved_at)
        .bind(mention_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(HaloError::NotFound(format!("mention {mention_id}")));
        }
        Ok(())
    }

    pub async fn insert_decision_tx(
        &self,
        tx: &mut SqliteTx<'_>,
        decision: &ResolutionDecision,
    ) -> Result<(), HaloError> {
        sqlx::query(
            "INSERT INTO resolution_decisions (id, mention_id, candidate_entity_id, \
             overall_score, feature_scores, outcome, reviewer, justification, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(decision.id.to_string())
        .bind(decision.mention_id.to_string())
        .bind(decision.candidate_entity_id.map(|id| id.to_string()))
        .bind(decision.overall_score)
        .bind(decision.feature_scores.to_string())
        .bind(decision.outcome.as_str())
        .bind(&decision.reviewer)
        .bind(&decision.justification)
        .bind(decision.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn decisions_for(
        &self,
        mention_id: Uuid,
    ) -> Result<Vec<ResolutionDecision>, HaloError> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            "SELECT id, mention_id, candidate_entity_id, overall_score, feature_scores, \
             outcome, reviewer, justification, created_at \
             FROM resolution_decisions WHERE mention_id = ? ORDER BY overall_score DESC",
        )
        .bind(mention_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DecisionRow::into_decision).collect()
    }

    /// PENDING mentions with their candidate decisions, for human review
    pub async fn review_queue(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<(Mention, Vec<ResolutionDecision>)>, HaloError> {
        let mentions = self.pending(kind, limit).await?;
        let mut queue = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let decisions = self.decisions_for(mention.id).await?;
            queue.push((mention, decisions));
        }
        Ok(queue)
    }

    /// Mention counts by resolution status
    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>, HaloError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT resolution_status, COUNT(*) FROM mentions GROUP BY resolution_status",
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(db_err)
    }
}
