//! Mention resolution: thresholded decisions with transactional side effects

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use halo_core::{
    AuditEventInput, AuditEventType, CompanyAttributes, DecisionOutcome, Entity, EntityIdentifier,
    EntityKind, HaloConfig, HaloError, IdentifierKind, Mention, PersonAttributes, Predicate,
    ResolutionDecision, ResolutionStatus, AddressAttributes,
};
use halo_normalize::{normalize_company_name, phonetic_code};
use halo_store::{
    db_err, AuditStore, EntityStore, FactStore, HaloDb, MentionStore, PiiCodec, ProvenanceStore,
    SqliteTx,
};

use crate::blocking::{BlockSet, BlockingIndex};
use crate::features::{self, CandidateProfile, FeatureScores};

/// How a mention left the resolver
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    AutoMatched {
        entity_id: Uuid,
        confidence: f64,
        method: String,
    },
    PendingReview {
        top_score: f64,
        candidates: usize,
    },
    NewEntity {
        entity_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub mention_id: Uuid,
    pub outcome: ResolutionOutcome,
}

/// A reviewer's verdict on a PENDING mention
#[derive(Debug, Clone)]
pub enum HumanDecision {
    Match { entity_id: Uuid },
    Reject,
    NewEntity,
}

/// Orchestrates blocking, comparison, and the terminal mention transition
pub struct Resolver {
    db: HaloDb,
    pub(crate) entities: EntityStore,
    pub(crate) facts: FactStore,
    pub(crate) mentions: MentionStore,
    pub(crate) provenance: ProvenanceStore,
    pub(crate) audit: Arc<AuditStore>,
    blocking: BlockingIndex,
    codec: Arc<PiiCodec>,
    pub(crate) config: HaloConfig,
}

impl Resolver {
    pub fn new(
        db: HaloDb,
        audit: Arc<AuditStore>,
        codec: Arc<PiiCodec>,
        config: HaloConfig,
    ) -> Self {
        let entities = EntityStore::new(db.clone());
        Self {
            blocking: BlockingIndex::new(entities.clone(), config.blocking.clone()),
            facts: FactStore::new(db.clone()),
            mentions: MentionStore::new(db.clone()),
            provenance: ProvenanceStore::new(db.clone()),
            entities,
            audit,
            codec,
            config,
            db,
        }
    }

    /// Resolve one PENDING mention within the configured time budget
    ///
    /// On timeout the mention stays PENDING and a timeout audit note is
    /// written. A unique-constraint race is retried once after re-blocking.
    pub async fn resolve_mention(&self, mention_id: Uuid) -> Result<ResolutionResult, HaloError> {
        let budget = self.config.resolver.timeout;
        match tokio::time::timeout(budget, self.resolve_with_retry(mention_id)).await {
            Ok(result) => result,
            Err(_) => {
                let error = HaloError::Timeout(format!(
                    "mention {mention_id} exceeded {}ms resolution budget",
                    budget.as_millis()
                ));
                self.audit
                    .record_failure(AuditEventType::ResolutionTimeout, "mention", mention_id, &error)
                    .await;
                Err(error)
            }
        }
    }

    async fn resolve_with_retry(&self, mention_id: Uuid) -> Result<ResolutionResult, HaloError> {
        match self.attempt(mention_id).await {
            Err(e) if e.is_retryable() => {
                warn!(%mention_id, error = %e, "resolution conflict, re-blocking once");
                self.attempt(mention_id).await
            }
            other => other,
        }
    }

    async fn attempt(&self, mention_id: Uuid) -> Result<ResolutionResult, HaloError> {
        let mention = self.mentions.require(mention_id).await?;
        if mention.resolution_status != ResolutionStatus::Pending {
            return Err(HaloError::Validation(format!(
                "mention {mention_id} is {}, not PENDING",
                mention.resolution_status.as_str()
            )));
        }

        let thresholds = self.config.resolver.thresholds(mention.kind);

        // reads (blocking, profiles, scoring) happen before the write
        // transaction and the audit writer lock
        let block = self.blocking.candidates(&mention).await?;

        match block {
            BlockSet::Exact(entity) => self.commit_exact_match(&mention, entity).await,
            BlockSet::Candidates(candidates) if candidates.is_empty() => {
                self.commit_new_entity(&mention, &[]).await
            }
            BlockSet::Candidates(candidates) => {
                let mut scored = Vec::with_capacity(candidates.len());
                for entity in candidates {
                    let profile = self.profile(entity).await?;
                    let feature_scores = features::compare(&mention, &profile);
                    let score = features::score(mention.kind, &feature_scores);
                    scored.push((profile.entity, feature_scores, score));
                }
                // deterministic argmax: score desc, ties to the smaller id
                scored.sort_by(|a, b| {
                    b.2.partial_cmp(&a.2)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.id.cmp(&b.0.id))
                });
                let top_score = scored[0].2;

                if top_score >= thresholds.auto_match {
                    self.commit_auto_match(&mention, &scored).await
                } else if top_score >= thresholds.human_review_min {
                    self.commit_review(&mention, &scored).await
                } else {
                    self.commit_new_entity(&mention, &scored).await
                }
            }
        }
    }

    async fn profile(&self, entity: Entity) -> Result<CandidateProfile, HaloError> {
        let birth_year = match entity.kind {
            EntityKind::Person => self
                .entities
                .person_attributes(entity.id)
                .await?
                .and_then(|attrs| attrs.birth_year),
            _ => None,
        };

        let address = match entity.kind {
            EntityKind::Address => self.entities.address_attributes(entity.id).await?,
            EntityKind::Company => {
                // a company's comparable address is the one it is registered at
                let mut found = None;
                for fact in self.facts.live_for_subject(entity.id).await? {
                    if fact.predicate == Predicate::RegisteredAt {
                        if let Some(address_id) = fact.object_id {
                            found = self.entities.address_attributes(address_id).await?;
                            break;
                        }
                    }
                }
                found
            }
            _ => None,
        };

        let mut identifier_indexes: HashMap<IdentifierKind, Vec<String>> = HashMap::new();
        for identifier in self.entities.identifiers_for(entity.id).await? {
            identifier_indexes
                .entry(identifier.kind)
                .or_default()
                .push(identifier.blind_index);
        }

        let neighbors: HashSet<Uuid> = self.facts.neighbor_ids(entity.id).await?.into_iter().collect();

        Ok(CandidateProfile {
            entity,
            birth_year,
            address,
            identifier_indexes,
            neighbors,
        })
    }

    async fn commit_exact_match(
        &self,
        mention: &Mention,
        entity: Entity,
    ) -> Result<ResolutionResult, HaloError> {
        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        let feature_scores = FeatureScores {
            identifier_match: Some(1.0),
            ..FeatureScores::default()
        };
        self.insert_decision(
            &mut tx,
            mention.id,
            Some(entity.id),
            0.99,
            &feature_scores,
            DecisionOutcome::AutoMatch,
            None,
            None,
        )
        .await?;
        self.mentions
            .update_resolution_tx(
                &mut tx,
                mention.id,
                ResolutionStatus::AutoMatched,
                Some(entity.id),
                Some(0.99),
                Some("exact_identifier"),
                None,
            )
            .await?;
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::MentionResolved,
                    "mention",
                    mention.id.to_string(),
                    json!({
                        "outcome": "auto_match",
                        "method": "exact_identifier",
                        "entity_id": entity.id.to_string(),
                        "confidence": 0.99,
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(mention_id = %mention.id, entity_id = %entity.id, "mention auto-matched on exact identifier");
        Ok(ResolutionResult {
            mention_id: mention.id,
            outcome: ResolutionOutcome::AutoMatched {
                entity_id: entity.id,
                confidence: 0.99,
                method: "exact_identifier".to_string(),
            },
        })
    }

    async fn commit_auto_match(
        &self,
        mention: &Mention,
        scored: &[(Entity, FeatureScores, f64)],
    ) -> Result<ResolutionResult, HaloError> {
        let (entity, feature_scores, score) = &scored[0];
        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        self.insert_decision(
            &mut tx,
            mention.id,
            Some(entity.id),
            *score,
            feature_scores,
            DecisionOutcome::AutoMatch,
            None,
            None,
        )
        .await?;
        self.mentions
            .update_resolution_tx(
                &mut tx,
                mention.id,
                ResolutionStatus::AutoMatched,
                Some(entity.id),
                Some(*score),
                Some("feature_match"),
                None,
            )
            .await?;
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::MentionResolved,
                    "mention",
                    mention.id.to_string(),
                    json!({
                        "outcome": "auto_match",
                        "method": "feature_match",
                        "entity_id": entity.id.to_string(),
                        "confidence": score,
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(mention_id = %mention.id, entity_id = %entity.id, score, "mention auto-matched on features");
        Ok(ResolutionResult {
            mention_id: mention.id,
            outcome: ResolutionOutcome::AutoMatched {
                entity_id: entity.id,
                confidence: *score,
                method: "feature_match".to_string(),
            },
        })
    }

    async fn commit_review(
        &self,
        mention: &Mention,
        scored: &[(Entity, FeatureScores, f64)],
    ) -> Result<ResolutionResult, HaloError> {
        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        for (entity, feature_scores, score) in scored {
            self.insert_decision(
                &mut tx,
                mention.id,
                Some(entity.id),
                *score,
                feature_scores,
                DecisionOutcome::PendingReview,
                None,
                None,
            )
            .await?;
        }
        // the mention stays PENDING and visible to the review queue
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::MentionResolved,
                    "mention",
                    mention.id.to_string(),
                    json!({
                        "outcome": "pending_review",
                        "top_score": scored[0].2,
                        "candidates": scored.len(),
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        debug!(mention_id = %mention.id, top_score = scored[0].2, "mention queued for human review");
        Ok(ResolutionResult {
            mention_id: mention.id,
            outcome: ResolutionOutcome::PendingReview {
                top_score: scored[0].2,
                candidates: scored.len(),
            },
        })
    }

    async fn commit_new_entity(
        &self,
        mention: &Mention,
        rejected: &[(Entity, FeatureScores, f64)],
    ) -> Result<ResolutionResult, HaloError> {
        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        let entity = self.create_entity_from_mention(&mut tx, mention).await?;

        for (candidate, feature_scores, score) in rejected {
            self.insert_decision(
                &mut tx,
                mention.id,
                Some(candidate.id),
                *score,
                feature_scores,
                DecisionOutcome::AutoReject,
                None,
                None,
            )
            .await?;
        }
        self.mentions
            .update_resolution_tx(
                &mut tx,
                mention.id,
                ResolutionStatus::AutoMatched,
                Some(entity.id),
                Some(1.0),
                Some("new_entity"),
                None,
            )
            .await?;
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::EntityCreated,
                    "entity",
                    entity.id.to_string(),
                    json!({
                        "kind": entity.kind.as_str(),
                        "canonical_name": entity.canonical_name,
                        "from_mention": mention.id.to_string(),
                    }),
                ),
            )
            .await?;
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::MentionResolved,
                    "mention",
                    mention.id.to_string(),
                    json!({
                        "outcome": "new_entity",
                        "entity_id": entity.id.to_string(),
                        "confidence": 1.0,
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(mention_id = %mention.id, entity_id = %entity.id, "mention resolved to a new entity");
        Ok(ResolutionResult {
            mention_id: mention.id,
            outcome: ResolutionOutcome::NewEntity { entity_id: entity.id },
        })
    }

    /// Insert an entity with attributes and identifiers taken from a mention
    pub(crate) async fn create_entity_from_mention(
        &self,
        tx: &mut SqliteTx<'_>,
        mention: &Mention,
    ) -> Result<Entity, HaloError> {
        let blocking_name = BlockingIndex::blocking_name(mention);
        let entity = Entity::new(
            mention.kind,
            &mention.normalized_form,
            &phonetic_code(&blocking_name),
        );
        self.entities.insert_tx(tx, &entity).await?;

        let attrs = &mention.attributes;
        match mention.kind {
            EntityKind::Person | EntityKind::Event => {
                let birth_year = attrs
                    .birth_year
                    .or_else(|| self.birth_year_from_mention(mention));
                self.entities
                    .upsert_person_attributes_tx(
                        tx,
                        &PersonAttributes {
                            entity_id: entity.id,
                            birth_year,
                            birth_date: attrs.birth_date,
                            gender: attrs.gender.clone(),
                            ..PersonAttributes::default()
                        },
                    )
                    .await?;
            }
            EntityKind::Company => {
                let detected = normalize_company_name(&mention.normalized_form).legal_form;
                self.entities
                    .upsert_company_attributes_tx(
                        tx,
                        &CompanyAttributes {
                            entity_id: entity.id,
                            legal_form: attrs
                                .legal_form
                                .clone()
                                .or_else(|| detected.map(|f| f.as_str().to_string())),
                            registration_date: attrs.registration_date,
                            sni_codes: attrs.sni_codes.clone(),
                            latest_revenue: attrs.latest_revenue,
                            latest_employees: attrs.latest_employees,
                            ..CompanyAttributes::default()
                        },
                    )
                    .await?;
            }
            EntityKind::Address => {
                self.entities
                    .upsert_address_attributes_tx(
                        tx,
                        &AddressAttributes {
                            entity_id: entity.id,
                            street: attrs.street.clone(),
                            street_number: attrs.street_number.clone(),
                            entrance: attrs.entrance.clone(),
                            postal_code: attrs.postal_code.clone(),
                            city: attrs.city.clone(),
                            ..AddressAttributes::default()
                        },
                    )
                    .await?;
            }
        }

        if let (Some(cipher), Some(index)) =
            (&mention.personnummer_cipher, &mention.personnummer_index)
        {
            let kind = match self.is_samordningsnummer(cipher)? {
                true => IdentifierKind::Samordningsnummer,
                false => IdentifierKind::Personnummer,
            };
            self.insert_identifier(tx, &entity, kind, cipher, index, mention.provenance_id)
                .await?;
        }
        if let (Some(cipher), Some(index)) = (&mention.orgnummer_cipher, &mention.orgnummer_index) {
            self.insert_identifier(
                tx,
                &entity,
                IdentifierKind::Organisationsnummer,
                cipher,
                index,
                mention.provenance_id,
            )
            .await?;
        }

        Ok(entity)
    }

    /// Samordningsnummer encode day + 60; inspect the decrypted digits
    fn is_samordningsnummer(&self, cipher: &str) -> Result<bool, HaloError> {
        let plaintext = self.codec.reveal(cipher)?;
        let digits: Vec<u8> = plaintext
            .chars()
            .filter(char::is_ascii_digit)
            .map(|c| c as u8 - b'0')
            .collect();
        let day = match digits.len() {
            12 => u32::from(digits[6]) * 10 + u32::from(digits[7]),
            10 => u32::from(digits[4]) * 10 + u32::from(digits[5]),
            _ => return Ok(false),
        };
        Ok(day > 60)
    }

    fn birth_year_from_mention(&self, mention: &Mention) -> Option<i32> {
        let cipher = mention.personnummer_cipher.as_ref()?;
        let plaintext = self.codec.reveal(cipher).ok()?;
        let digits: String = plaintext.chars().filter(char::is_ascii_digit).collect();
        if digits.len() == 12 {
            digits[..4].parse().ok()
        } else {
            None
        }
    }

    async fn insert_identifier(
        &self,
        tx: &mut SqliteTx<'_>,
        entity: &Entity,
        kind: IdentifierKind,
        cipher: &str,
        index: &str,
        provenance_id: Uuid,
    ) -> Result<(), HaloError> {
        self.entities
            .insert_identifier_tx(
                tx,
                &EntityIdentifier {
                    id: Uuid::new_v4(),
                    entity_id: entity.id,
                    kind,
                    value_cipher: cipher.to_string(),
                    blind_index: index.to_string(),
                    provenance_id,
                    valid_from: None,
                    valid_to: None,
                    confidence: 1.0,
                    created_at: Utc::now(),
                },
            )
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_decision(
        &self,
        tx: &mut SqliteTx<'_>,
        mention_id: Uuid,
        candidate_entity_id: Option<Uuid>,
        overall_score: f64,
        feature_scores: &FeatureScores,
        outcome: DecisionOutcome,
        reviewer: Option<&str>,
        justification: Option<&str>,
    ) -> Result<(), HaloError> {
        let decision = ResolutionDecision {
            id: Uuid::new_v4(),
            mention_id,
            candidate_entity_id,
            overall_score,
            feature_scores: serde_json::to_value(feature_scores)
                .map_err(|e| HaloError::Storage(e.to_string()))?,
            outcome,
            reviewer: reviewer.map(str::to_string),
            justification: justification.map(str::to_string),
            created_at: Utc::now(),
        };
        self.mentions.insert_decision_tx(tx, &decision).await
    }

    /// Apply a reviewer's verdict to a PENDING mention
    pub async fn apply_human_decision(
        &self,
        mention_id: Uuid,
        decision: HumanDecision,
        reviewer: &str,
        justification: Option<&str>,
    ) -> Result<Mention, HaloError> {
        let mention = self.mentions.require(mention_id).await?;
        if mention.resolution_status != ResolutionStatus::Pending {
            return Err(HaloError::Validation(format!(
                "mention {mention_id} is {}, not PENDING",
                mention.resolution_status.as_str()
            )));
        }

        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        let (status, target, method, outcome) = match &decision {
            HumanDecision::Match { entity_id } => {
                let entity = self.entities.require(*entity_id).await?;
                (
                    ResolutionStatus::HumanMatched,
                    Some(entity.id),
                    "human",
                    DecisionOutcome::HumanMatch,
                )
            }
            HumanDecision::Reject => (
                ResolutionStatus::HumanRejected,
                None,
                "human",
                DecisionOutcome::HumanReject,
            ),
            HumanDecision::NewEntity => {
                let entity = self.create_entity_from_mention(&mut tx, &mention).await?;
                self.audit
                    .append_tx(
                        &mut tx,
                        &AuditEventInput::user(
                            AuditEventType::EntityCreated,
                            reviewer,
                            "entity",
                            entity.id.to_string(),
                            json!({ "from_mention": mention.id.to_string() }),
                        ),
                    )
                    .await?;
                (
                    ResolutionStatus::HumanMatched,
                    Some(entity.id),
                    "human_new_entity",
                    DecisionOutcome::HumanMatch,
                )
            }
        };

        self.insert_decision(
            &mut tx,
            mention.id,
            target,
            1.0,
            &FeatureScores::default(),
            outcome,
            Some(reviewer),
            justification,
        )
        .await?;
        self.mentions
            .update_resolution_tx(
                &mut tx,
                mention.id,
                status,
                target,
                Some(1.0),
                Some(method),
                Some(reviewer),
            )
            .await?;
        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::user(
                    AuditEventType::HumanDecision,
                    reviewer,
                    "mention",
                    mention.id.to_string(),
                    json!({
                        "status": status.as_str(),
                        "target": target.map(|id| id.to_string()),
                        "justification": justification,
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        info!(%mention_id, reviewer, status = status.as_str(), "human decision applied");
        self.mentions.require(mention_id).await
    }

    pub(crate) fn db(&self) -> &HaloDb {
        &self.db
    }
}
