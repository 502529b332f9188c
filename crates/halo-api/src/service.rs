//! The service facade wiring stores, resolver, derivation, and patterns

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use halo_core::{
    AuditEventInput, AuditEventType, Entity, EntityKind, FactInput, HaloConfig, HaloError,
    IdentifierKind, Mention, Predicate, ResolutionDecision,
};
use halo_crypto::{ChainHasher, KeySet, MasterKey};
use halo_derive::{
    DerivationEngine, DerivationReport, PatternDetector, RegistrationMillMatch,
    RegistrationMillParams, ShellNetworkParams, ShellNetworkResult,
};
use halo_derive::CircularDirectorship;
use halo_normalize::{parse_orgnummer, parse_personnummer};
use halo_resolve::{
    resolve_pending, BatchOutcome, HumanDecision, ResolutionResult, Resolver,
};
use halo_store::{
    db_err, AuditStore, ChainVerification, EntityStore, FactStore, HaloDb, MentionStore,
    PiiCodec, ProvenanceStore, SqliteConfig,
};

use crate::ingest::{IngestReport, SourceAdapter, SourceBatch};
use crate::views::{EntityView, GraphEdge, GraphNode, RelationshipGraph, SearchHit};

/// The Halo core behind one handle
///
/// Construction derives the purpose keys from the master key and opens the
/// store; everything downstream receives its configuration explicitly.
pub struct HaloService {
    db: HaloDb,
    config: HaloConfig,
    codec: Arc<PiiCodec>,
    audit: Arc<AuditStore>,
    entities: EntityStore,
    facts: FactStore,
    mentions: MentionStore,
    provenance: ProvenanceStore,
    resolver: Arc<Resolver>,
    derivation: DerivationEngine,
    patterns: PatternDetector,
    /// Latched by a failed chain verification; cleared by a clean full pass
    integrity_flagged: AtomicBool,
}

impl HaloService {
    pub async fn open(
        sqlite: SqliteConfig,
        master: &MasterKey,
        config: HaloConfig,
    ) -> Result<Self, HaloError> {
        let keys = KeySet::derive(master).map_err(|e| HaloError::Crypto(e.to_string()))?;
        let db = HaloDb::connect(sqlite).await?;
        let codec = Arc::new(PiiCodec::new(&keys));
        let audit = Arc::new(AuditStore::new(
            db.clone(),
            ChainHasher::new(keys.audit_chain()),
        ));
        let resolver = Arc::new(Resolver::new(
            db.clone(),
            Arc::clone(&audit),
            Arc::clone(&codec),
            config.clone(),
        ));
        let derivation =
            DerivationEngine::new(db.clone(), Arc::clone(&audit), config.derivation.clone());
        let patterns = PatternDetector::new(db.clone());

        info!("halo core opened");
        Ok(Self {
            entities: EntityStore::new(db.clone()),
            facts: FactStore::new(db.clone()),
            mentions: MentionStore::new(db.clone()),
            provenance: ProvenanceStore::new(db.clone()),
            codec,
            audit,
            resolver,
            derivation,
            patterns,
            config,
            db,
            integrity_flagged: AtomicBool::new(false),
        })
    }

    /// In-memory instance for tests
    pub async fn in_memory(master: &MasterKey, config: HaloConfig) -> Result<Self, HaloError> {
        Self::open(SqliteConfig::memory(), master, config).await
    }

    // --- ingestion ---

    /// Write one adapter batch: provenance, PENDING mentions, and any facts
    /// the adapter could already bind, atomically
    pub async fn ingest_batch(&self, batch: SourceBatch) -> Result<IngestReport, HaloError> {
        let _guard = self.audit.writer_lock().await;
        let mut tx = self.db.begin().await?;

        let provenance = self.provenance.insert_tx(&mut tx, &batch.provenance).await?;

        let mut mention_ids = Vec::with_capacity(batch.mentions.len());
        for input in &batch.mentions {
            let mention = self
                .mentions
                .insert_tx(&mut tx, input, provenance.id, &self.codec)
                .await?;
            mention_ids.push(mention.id);
        }

        let mut fact_ids = Vec::with_capacity(batch.facts.len());
        for fact in &batch.facts {
            let input = FactInput {
                subject_id: fact.subject_id,
                predicate: fact.predicate,
                object_id: fact.object_id,
                value: fact.value.clone(),
                relationship_attributes: None,
                valid_from: fact.valid_from,
                valid_to: fact.valid_to,
                confidence: fact.confidence,
                provenance_id: provenance.id,
                is_derived: false,
                derivation_rule: None,
                derived_from: Vec::new(),
            };
            let (asserted, _) = self.facts.assert_tx(&mut tx, &input).await?;
            fact_ids.push(asserted.id);
        }

        self.audit
            .append_tx(
                &mut tx,
                &AuditEventInput::system(
                    AuditEventType::BatchIngested,
                    "provenance",
                    provenance.id.to_string(),
                    json!({
                        "source": batch.provenance.source_kind.as_str(),
                        "mentions": mention_ids.len(),
                        "facts": fact_ids.len(),
                    }),
                ),
            )
            .await?;
        tx.commit().await.map_err(db_err)?;

        Ok(IngestReport {
            provenance_id: provenance.id,
            mention_ids,
            fact_ids,
        })
    }

    /// Drain an adapter, batch by batch
    pub async fn ingest_from(
        &self,
        adapter: &mut dyn SourceAdapter,
    ) -> Result<Vec<IngestReport>, HaloError> {
        let mut reports = Vec::new();
        while let Some(batch) = adapter.next_batch().await? {
            reports.push(self.ingest_batch(batch).await?);
        }
        info!(adapter = adapter.name(), batches = reports.len(), "adapter drained");
        Ok(reports)
    }

    // --- entity reads ---

    pub async fn get_entity(&self, id: Uuid) -> Result<EntityView, HaloError> {
        let entity = self.entities.require(id).await?;
        self.view_of(entity).await
    }

    async fn view_of(&self, entity: Entity) -> Result<EntityView, HaloError> {
        let identifiers = self.entities.identifiers_for(entity.id).await?;
        let (person, company, address) = match entity.kind {
            EntityKind::Person | EntityKind::Event => {
                (self.entities.person_attributes(entity.id).await?, None, None)
            }
            EntityKind::Company => (
                None,
                self.entities.company_attributes(entity.id).await?,
                None,
            ),
            EntityKind::Address => (
                None,
                None,
                self.entities.address_attributes(entity.id).await?,
            ),
        };

        let mut same_as = Vec::new();
        for fact in self.facts.live_for_subject(entity.id).await? {
            if fact.predicate == Predicate::SameAs {
                if let Some(other) = fact.object_id {
                    same_as.push(other);
                }
            }
        }
        for fact in self.facts.live_for_object(entity.id).await? {
            if fact.predicate == Predicate::SameAs {
                same_as.push(fact.subject_id);
            }
        }

        Ok(EntityView {
            entity,
            identifiers,
            person,
            company,
            address,
            same_as,
        })
    }

    /// Equality lookup through the blind index; plaintext never reaches the
    /// store
    pub async fn lookup_by_identifier(
        &self,
        kind: IdentifierKind,
        value: &str,
    ) -> Result<Option<EntityView>, HaloError> {
        let index = self.codec.lookup_index(value);
        match self.entities.find_by_identifier(kind, &index).await? {
            Some(entity) => Ok(Some(self.view_of(entity).await?)),
            None => Ok(None),
        }
    }

    /// Bounded-depth neighborhood over live relationship edges
    pub async fn relationships(
        &self,
        root: Uuid,
        depth: u8,
        predicates: Option<Vec<Predicate>>,
        max_nodes: usize,
    ) -> Result<RelationshipGraph, HaloError> {
        let depth = depth.clamp(1, 3);
        let filter: Option<HashSet<Predicate>> = predicates.map(|p| p.into_iter().collect());

        let root_entity = self.entities.require(root).await?;
        let mut nodes: HashMap<Uuid, GraphNode> = HashMap::new();
        nodes.insert(
            root_entity.id,
            GraphNode {
                id: root_entity.id,
                kind: root_entity.kind,
                name: root_entity.canonical_name.clone(),
                status: root_entity.status,
            },
        );
        let mut edges: HashMap<Uuid, GraphEdge> = HashMap::new();
        let mut truncated = false;
        let mut frontier = VecDeque::from([(root, 0u8)]);
        let mut visited: HashSet<Uuid> = HashSet::from([root]);

        while let Some((current, level)) = frontier.pop_front() {
            if level >= depth {
                continue;
            }
            let mut touching = self.facts.live_for_subject(current).await?;
            touching.extend(self.facts.live_for_object(current).await?);

            for fact in touching {
                if !fact.predicate.is_relationship() {
                    continue;
                }
                if let Some(filter) = &filter {
                    if !filter.contains(&fact.predicate) {
                        continue;
                    }
                }
                let Some(object_id) = fact.object_id else { continue };

                let other = if fact.subject_id == current {
                    object_id
                } else {
                    fact.subject_id
                };
                if !nodes.contains_key(&other) {
                    if nodes.len() >= max_nodes {
                        truncated = true;
                        continue;
                    }
                    let entity = self.entities.require(other).await?;
                    nodes.insert(
                        other,
                        GraphNode {
                            id: entity.id,
                            kind: entity.kind,
                            name: entity.canonical_name,
                            status: entity.status,
                        },
                    );
                }
                edges.entry(fact.id).or_insert(GraphEdge {
                    fact_id: fact.id,
                    subject_id: fact.subject_id,
                    predicate: fact.predicate,
                    object_id,
                });
                if visited.insert(other) {
                    frontier.push_back((other, level + 1));
                }
            }
        }

        Ok(RelationshipGraph {
            root,
            nodes: nodes.into_values().collect(),
            edges: edges.into_values().collect(),
            truncated,
        })
    }

    /// Ranked name search; a valid national identifier short-circuits to an
    /// exact blind-index lookup
    pub async fn search(
        &self,
        query: &str,
        kind: Option<EntityKind>,
    ) -> Result<Vec<SearchHit>, HaloError> {
        let query = query.trim();

        if parse_personnummer(query).is_ok() {
            for id_kind in [IdentifierKind::Personnummer, IdentifierKind::Samordningsnummer] {
                if let Some(view) = self.lookup_by_identifier(id_kind, query).await? {
                    return Ok(vec![SearchHit {
                        entity: view.entity,
                        score: 1.0,
                    }]);
                }
            }
            return Ok(Vec::new());
        }
        if parse_orgnummer(query).is_ok() {
            return Ok(self
                .lookup_by_identifier(IdentifierKind::Organisationsnummer, query)
                .await?
                .map(|view| SearchHit {
                    entity: view.entity,
                    score: 1.0,
                })
                .into_iter()
                .collect());
        }

        let name = query.to_uppercase();
        let kinds: Vec<EntityKind> = match kind {
            Some(kind) => vec![kind],
            None => vec![EntityKind::Person, EntityKind::Company, EntityKind::Address],
        };

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut hits: Vec<SearchHit> = Vec::new();
        for kind in kinds {
            let code = halo_normalize::phonetic_code(&name);
            let mut pool = self
                .entities
                .phonetic_candidates(kind, &code, self.config.blocking.candidate_pool)
                .await?;
            let prefix: String = name.chars().take(3).collect();
            if !prefix.is_empty() {
                pool.extend(
                    self.entities
                        .name_prefix_candidates(kind, &prefix, self.config.blocking.candidate_pool)
                        .await?,
                );
            }
            for entity in pool {
                if !seen.insert(entity.id) {
                    continue;
                }
                let score = halo_resolve::trigram_similarity(&name, &entity.canonical_name);
                if score > 0.1 {
                    hits.push(SearchHit { entity, score });
                }
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(50);
        Ok(hits)
    }

    // --- resolution ---

    pub async fn resolve_mention(&self, mention_id: Uuid) -> Result<ResolutionResult, HaloError> {
        self.resolver.resolve_mention(mention_id).await
    }

    pub async fn resolve_pending(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<BatchOutcome, HaloError> {
        resolve_pending(Arc::clone(&self.resolver), kind, limit).await
    }

    pub async fn review_queue(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<(Mention, Vec<ResolutionDecision>)>, HaloError> {
        self.mentions.review_queue(kind, limit).await
    }

    pub async fn submit_decision(
        &self,
        mention_id: Uuid,
        reviewer: &str,
        decision: HumanDecision,
        justification: Option<&str>,
    ) -> Result<Mention, HaloError> {
        self.resolver
            .apply_human_decision(mention_id, decision, reviewer, justification)
            .await
    }

    pub async fn merge_entities(
        &self,
        first: Uuid,
        second: Uuid,
        reviewer: &str,
        justification: Option<&str>,
    ) -> Result<halo_resolve::MergeReport, HaloError> {
        self.resolver
            .merge_entities(first, second, reviewer, justification)
            .await
    }

    pub async fn anonymize_entity(&self, entity_id: Uuid, actor: &str) -> Result<(), HaloError> {
        self.resolver.anonymize_entity(entity_id, actor).await
    }

    // --- derivation & patterns ---

    pub async fn run_derivation(&self) -> Result<DerivationReport, HaloError> {
        self.derivation.run_all().await
    }

    pub async fn detect_shell_networks(
        &self,
        params: &ShellNetworkParams,
    ) -> Result<ShellNetworkResult, HaloError> {
        self.with_statement_budget(self.patterns.shell_networks(params))
            .await
    }

    pub async fn detect_registration_mills(
        &self,
        params: &RegistrationMillParams,
    ) -> Result<Vec<RegistrationMillMatch>, HaloError> {
        self.with_statement_budget(self.patterns.registration_mills(params))
            .await
    }

    pub async fn detect_circular_directorships(
        &self,
    ) -> Result<Vec<CircularDirectorship>, HaloError> {
        self.with_statement_budget(self.patterns.circular_directorships())
            .await
    }

    async fn with_statement_budget<T>(
        &self,
        query: impl std::future::Future<Output = Result<T, HaloError>>,
    ) -> Result<T, HaloError> {
        tokio::time::timeout(self.config.resolver.timeout, query)
            .await
            .map_err(|_| HaloError::Timeout("pattern query exceeded statement budget".into()))?
    }

    // --- audit ---

    /// Bulk chain verification; a failure latches the integrity flag, a
    /// clean full pass clears it. Writes continue either way, so a
    /// corrupted chain cannot be used to halt operations.
    pub async fn verify_audit_chain(
        &self,
        from_seq: Option<i64>,
        to_seq: Option<i64>,
    ) -> Result<ChainVerification, HaloError> {
        let result = self.audit.verify_chain(from_seq, to_seq).await?;
        if !result.ok {
            warn!(first_invalid_seq = ?result.first_invalid_seq, "audit chain verification FAILED");
            self.integrity_flagged.store(true, Ordering::SeqCst);
        } else if from_seq.is_none() && to_seq.is_none() {
            self.integrity_flagged.store(false, Ordering::SeqCst);
        }
        self.audit
            .append(&AuditEventInput::system(
                AuditEventType::ChainVerified,
                "audit",
                "chain",
                json!({
                    "ok": result.ok,
                    "first_invalid_seq": result.first_invalid_seq,
                    "entries_checked": result.entries_checked,
                }),
            ))
            .await?;
        Ok(result)
    }

    /// True while a failed verification is unresolved; surface in every
    /// affected response
    pub fn integrity_flagged(&self) -> bool {
        self.integrity_flagged.load(Ordering::SeqCst)
    }

    pub async fn export_audit_jsonl(&self) -> Result<String, HaloError> {
        self.audit.export_jsonl().await
    }

    /// Mention counts by status, for operational dashboards
    pub async fn mention_status_counts(&self) -> Result<Vec<(String, i64)>, HaloError> {
        self.mentions.status_counts().await
    }

    /// Follow a merge chain to the surviving entity
    pub async fn resolve_alias(&self, id: Uuid) -> Result<Entity, HaloError> {
        self.entities.resolve_alias(id).await
    }

    /// The underlying pool, for operational tooling and tests
    pub fn db(&self) -> &HaloDb {
        &self.db
    }
}
