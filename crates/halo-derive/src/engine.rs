//! The derivation engine: versioned rules over the entity graph
//!
//! Every derived fact is written through `assert`, so a re-run over
//! unchanged inputs is a no-op and a changed value supersedes its
//! predecessor. Each entity commits in its own transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use halo_core::{
    AuditEventInput, AuditEventType, DerivationConfig, EntityKind, FactInput, FactValue,
    HaloError, Predicate, ProvenanceInput,
};
use halo_store::{db_err, AuditStore, EntityStore, FactStore, HaloDb, ProvenanceStore};

use crate::cluster::UnionFind;
use crate::rules::{
    factor_weight, RULE_DIRECTOR_VELOCITY, RULE_NETWORK_CLUSTER, RULE_PERSON_RISK,
    RULE_SHELL_INDICATORS, TAG_HIGH_VELOCITY, TAG_LOW_HEADCOUNT, TAG_LOW_REVENUE,
    TAG_REGISTRATION_HUB, TAG_SHELL_PRONE_SNI,
};

/// Tally of one derivation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationReport {
    pub companies_scanned: usize,
    pub addresses_scanned: usize,
    pub persons_scanned: usize,
    pub clustered_entities: usize,
    pub facts_written: usize,
    pub facts_superseded: usize,
}

pub struct DerivationEngine {
    db: HaloDb,
    entities: EntityStore,
    facts: FactStore,
    provenance: ProvenanceStore,
    audit: Arc<AuditStore>,
    config: DerivationConfig,
}

impl DerivationEngine {
    pub fn new(db: HaloDb, audit: Arc<AuditStore>, config: DerivationConfig) -> Self {
        Self {
            entities: EntityStore::new(db.clone()),
            facts: FactStore::new(db.clone()),
            provenance: ProvenanceStore::new(db.clone()),
            audit,
            config,
            db,
        }
    }

    /// Run every rule in dependency order: company signals and address
    /// statistics feed person risk; clusters run last.
    pub async fn run_all(&self) -> Result<DerivationReport, HaloError> {
        let mut report = DerivationReport::default();
        self.derive_company_signals(&mut report).await?;
        self.derive_address_statistics(&mut report).await?;
        self.derive_person_risk(&mut report).await?;
        self.derive_network_clusters(&mut report).await?;

        self.audit
            .append(&AuditEventInput::system(
                AuditEventType::DerivationCompleted,
                "derivation",
                "nightly",
                json!({
                    "companies_scanned": report.companies_scanned,
                    "addresses_scanned": report.addresses_scanned,
                    "persons_scanned": report.persons_scanned,
                    "clustered_entities": report.clustered_entities,
                    "facts_written": report.facts_written,
                    "facts_superseded": report.facts_superseded,
                }),
            ))
            .await?;

        info!(
            companies = report.companies_scanned,
            persons = report.persons_scanned,
            facts = report.facts_written,
            "derivation run complete"
        );
        Ok(report)
    }

    /// company_shell_indicators_v1 + director_velocity_v1
    pub async fn derive_company_signals(
        &self,
        report: &mut DerivationReport,
    ) -> Result<(), HaloError> {
        let window = Duration::days(self.config.velocity_window_days);
        let cutoff = Utc::now() - window;
        let years = self.config.velocity_window_days as f64 / 365.25;

        for company_id in self.entities.active_ids(EntityKind::Company).await? {
            report.companies_scanned += 1;
            let mut attrs = self
                .entities
                .company_attributes(company_id)
                .await?
                .unwrap_or_else(|| halo_core::CompanyAttributes {
                    entity_id: company_id,
                    ..Default::default()
                });

            let director_facts = self.facts.live_for_object(company_id).await?;
            let director_fact_ids: Vec<Uuid> = director_facts
                .iter()
                .filter(|f| f.predicate == Predicate::DirectorOf)
                .map(|f| f.id)
                .collect();
            let director_count = director_fact_ids.len() as i64;

            let changes = self.facts.director_changes_since(company_id, cutoff).await?;
            let velocity = changes as f64 / years;

            let mut indicators: Vec<String> = Vec::new();
            if matches!(attrs.latest_employees, Some(n) if n <= self.config.shell_max_employees) {
                indicators.push(TAG_LOW_HEADCOUNT.to_string());
            }
            if matches!(attrs.latest_revenue, Some(n) if n <= self.config.shell_max_revenue) {
                indicators.push(TAG_LOW_REVENUE.to_string());
            }
            if self.registered_at_hub(company_id).await? {
                indicators.push(TAG_REGISTRATION_HUB.to_string());
            }
            if attrs
                .sni_codes
                .iter()
                .any(|code| self.config.shell_prone_sni.contains(code))
            {
                indicators.push(TAG_SHELL_PRONE_SNI.to_string());
            }
            if velocity > self.config.high_velocity_threshold {
                indicators.push(TAG_HIGH_VELOCITY.to_string());
            }
            indicators.sort();

            let unchanged = attrs.shell_indicators == indicators
                && attrs.director_change_velocity == Some(velocity)
                && attrs.director_count == director_count;
            if unchanged {
                continue;
            }

            attrs.shell_indicators = indicators.clone();
            attrs.director_change_velocity = Some(velocity);
            attrs.director_count = director_count;

            let mut tx = self.db.begin().await?;
            self.entities
                .upsert_company_attributes_tx(&mut tx, &attrs)
                .await?;

            if !indicators.is_empty() {
                let provenance = self
                    .provenance
                    .insert_tx(
                        &mut tx,
                        &ProvenanceInput::derived_computation(
                            RULE_SHELL_INDICATORS,
                            director_fact_ids.clone(),
                        ),
                    )
                    .await?;
                let (_, superseded) = self
                    .facts
                    .assert_tx(
                        &mut tx,
                        &FactInput::derived(
                            company_id,
                            Predicate::ShellIndicator,
                            FactValue::Json(json!(indicators)),
                            Utc::now().date_naive(),
                            provenance.id,
                            RULE_SHELL_INDICATORS,
                            director_fact_ids.clone(),
                        ),
                    )
                    .await?;
                report.facts_written += 1;
                if superseded.is_some() {
                    report.facts_superseded += 1;
                }
            }

            let provenance = self
                .provenance
                .insert_tx(
                    &mut tx,
                    &ProvenanceInput::derived_computation(
                        RULE_DIRECTOR_VELOCITY,
                        director_fact_ids.clone(),
                    ),
                )
                .await?;
            let (_, superseded) = self
                .facts
                .assert_tx(
                    &mut tx,
                    &FactInput::derived(
                        company_id,
                        Predicate::DirectorVelocity,
                        FactValue::Float(velocity),
                        Utc::now().date_naive(),
                        provenance.id,
                        RULE_DIRECTOR_VELOCITY,
                        director_fact_ids,
                    ),
                )
                .await?;
            report.facts_written += 1;
            if superseded.is_some() {
                report.facts_superseded += 1;
            }

            tx.commit().await.map_err(db_err)?;
            debug!(company_id = %company_id, velocity, "company signals derived");
        }
        Ok(())
    }

    async fn registered_at_hub(&self, company_id: Uuid) -> Result<bool, HaloError> {
        for fact in self.facts.live_for_subject(company_id).await? {
            if fact.predicate == Predicate::RegisteredAt {
                if let Some(address_id) = fact.object_id {
                    if let Some(address) = self.entities.address_attributes(address_id).await? {
                        if address.registration_hub {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// address_statistics_v1: registration counts and the hub flag
    pub async fn derive_address_statistics(
        &self,
        report: &mut DerivationReport,
    ) -> Result<(), HaloError> {
        let counts: HashMap<Uuid, (i64, i64)> = self
            .facts
            .registration_counts_by_address()
            .await?
            .into_iter()
            .map(|row| (row.address_id, (row.company_count, row.person_count)))
            .collect();

        for address_id in self.entities.active_ids(EntityKind::Address).await? {
            report.addresses_scanned += 1;
            let Some(mut attrs) = self.entities.address_attributes(address_id).await? else {
                continue;
            };
            let (company_count, person_count) =
                counts.get(&address_id).copied().unwrap_or((0, 0));
            let registration_hub = company_count >= self.config.registration_hub_threshold;

            if attrs.company_count == company_count
                && attrs.person_count == person_count
                && attrs.registration_hub == registration_hub
            {
                continue;
            }
            attrs.company_count = company_count;
            attrs.person_count = person_count;
            attrs.registration_hub = registration_hub;
            self.entities.upsert_address_attributes(&attrs).await?;
            debug!(address_id = %address_id, company_count, "address statistics derived");
        }
        Ok(())
    }

    /// person_risk_v1: weighted factor sum, capped at 1.0
    pub async fn derive_person_risk(
        &self,
        report: &mut DerivationReport,
    ) -> Result<(), HaloError> {
        let current_year = Utc::now().year();

        for person_id in self.entities.active_ids(EntityKind::Person).await? {
            report.persons_scanned += 1;

            let live_directorships = self
                .facts
                .live_for_subject(person_id)
                .await?
                .into_iter()
                .filter(|f| f.predicate == Predicate::DirectorOf)
                .collect::<Vec<_>>();
            let directorship_ids: Vec<Uuid> = live_directorships.iter().map(|f| f.id).collect();
            let history = self
                .facts
                .history_for_subject(person_id, Predicate::DirectorOf)
                .await?;

            let mut factors: Vec<String> = Vec::new();
            let active_count = live_directorships.len() as i64;
            if active_count > 5 {
                factors.push("many_directorships".to_string());
            }

            let mut shell_companies = 0usize;
            let mut velocity_sum = 0.0;
            let mut velocity_known = 0usize;
            let mut vulnerable = false;
            for fact in &live_directorships {
                let Some(company_id) = fact.object_id else { continue };
                if let Some(company) = self.entities.company_attributes(company_id).await? {
                    if !company.shell_indicators.is_empty() {
                        shell_companies += 1;
                    }
                    if let Some(v) = company.director_change_velocity {
                        velocity_sum += v;
                        velocity_known += 1;
                    }
                }
                if self.registered_in_vulnerable_area(company_id).await? {
                    vulnerable = true;
                }
            }
            if shell_companies > 0 {
                factors.push("shell_company_director".to_string());
            }
            if velocity_known > 0 && velocity_sum / velocity_known as f64 > 2.0 {
                factors.push("high_velocity_network".to_string());
            }
            if vulnerable {
                factors.push("vulnerable_area_companies".to_string());
            }

            let mut dissolved = 0i64;
            let mut seen_companies: HashSet<Uuid> = HashSet::new();
            for fact in &history {
                let Some(company_id) = fact.object_id else { continue };
                if !seen_companies.insert(company_id) {
                    continue;
                }
                if let Some(company) = self.entities.company_attributes(company_id).await? {
                    if company.dissolution_date.is_some() {
                        dissolved += 1;
                    }
                }
            }
            if dissolved > 3 {
                factors.push("dissolved_history".to_string());
            }

            let mut attrs = self
                .entities
                .person_attributes(person_id)
                .await?
                .unwrap_or_else(|| halo_core::PersonAttributes {
                    entity_id: person_id,
                    ..Default::default()
                });
            if active_count > 0 {
                if let Some(birth_year) = attrs.birth_year {
                    if current_year - birth_year < 25 {
                        factors.push("young_director".to_string());
                    }
                }
            }

            let risk: f64 = factors
                .iter()
                .map(|tag| factor_weight(tag))
                .sum::<f64>()
                .min(1.0);

            let unchanged = attrs.risk_score == Some(risk)
                && attrs.risk_factors == factors
                && attrs.active_directorship_count == active_count;
            if unchanged {
                continue;
            }

            attrs.risk_score = Some(risk);
            attrs.risk_factors = factors.clone();
            attrs.active_directorship_count = active_count;
            attrs.directorship_count = seen_companies.len() as i64;
            attrs.dissolved_company_count = dissolved;

            let mut tx = self.db.begin().await?;
            self.entities
                .upsert_person_attributes_tx(&mut tx, &attrs)
                .await?;
            let provenance = self
                .provenance
                .insert_tx(
                    &mut tx,
                    &ProvenanceInput::derived_computation(
                        RULE_PERSON_RISK,
                        directorship_ids.clone(),
                    ),
                )
                .await?;
            let (_, superseded) = self
                .facts
                .assert_tx(
                    &mut tx,
                    &FactInput::derived(
                        person_id,
                        Predicate::RiskScore,
                        FactValue::Float(risk),
                        Utc::now().date_naive(),
                        provenance.id,
                        RULE_PERSON_RISK,
                        directorship_ids,
                    ),
                )
                .await?;
            report.facts_written += 1;
            if superseded.is_some() {
                report.facts_superseded += 1;
            }
            tx.commit().await.map_err(db_err)?;
            debug!(person_id = %person_id, risk, "person risk derived");
        }
        Ok(())
    }

    async fn registered_in_vulnerable_area(&self, company_id: Uuid) -> Result<bool, HaloError> {
        for fact in self.facts.live_for_subject(company_id).await? {
            if fact.predicate == Predicate::RegisteredAt {
                if let Some(address_id) = fact.object_id {
                    if let Some(address) = self.entities.address_attributes(address_id).await? {
                        if address.vulnerable_area {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// network_cluster_v1: connected components over director and
    /// shareholder edges; the cluster id is the smallest member id
    pub async fn derive_network_clusters(
        &self,
        report: &mut DerivationReport,
    ) -> Result<(), HaloError> {
        let mut union_find = UnionFind::new();
        let mut edge_ids: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for predicate in [Predicate::DirectorOf, Predicate::ShareholderOf] {
            for edge in self.facts.live_edges(predicate).await? {
                union_find.union(edge.subject_id, edge.object_id);
                edge_ids.entry(edge.subject_id).or_default().push(edge.fact_id);
                edge_ids.entry(edge.object_id).or_default().push(edge.fact_id);
            }
        }

        for (cluster_key, members) in union_find.components() {
            if members.len() < 2 {
                continue;
            }
            let cluster_id = cluster_key.to_string();
            for member in members {
                report.clustered_entities += 1;

                // already assigned with the same id: nothing to write
                let current = self
                    .facts
                    .current(member, Predicate::NetworkCluster, None)
                    .await?;
                if matches!(
                    &current,
                    Some(fact) if fact.value == Some(FactValue::Text(cluster_id.clone()))
                ) {
                    continue;
                }
                let supporting = edge_ids.get(&member).cloned().unwrap_or_default();

                let mut tx = self.db.begin().await?;
                self.store_cluster_id(&mut tx, member, &cluster_id).await?;
                let provenance = self
                    .provenance
                    .insert_tx(
                        &mut tx,
                        &ProvenanceInput::derived_computation(
                            RULE_NETWORK_CLUSTER,
                            supporting.clone(),
                        ),
                    )
                    .await?;
                let (_, superseded) = self
                    .facts
                    .assert_tx(
                        &mut tx,
                        &FactInput::derived(
                            member,
                            Predicate::NetworkCluster,
                            FactValue::Text(cluster_id.clone()),
                            Utc::now().date_naive(),
                            provenance.id,
                            RULE_NETWORK_CLUSTER,
                            supporting,
                        ),
                    )
                    .await?;
                report.facts_written += 1;
                if superseded.is_some() {
                    report.facts_superseded += 1;
                }
                tx.commit().await.map_err(db_err)?;
            }
        }
        Ok(())
    }

    async fn store_cluster_id(
        &self,
        tx: &mut halo_store::SqliteTx<'_>,
        entity_id: Uuid,
        cluster_id: &str,
    ) -> Result<(), HaloError> {
        if let Some(mut attrs) = self.entities.person_attributes(entity_id).await? {
            attrs.cluster_id = Some(cluster_id.to_string());
            return self.entities.upsert_person_attributes_tx(tx, &attrs).await;
        }
        if let Some(mut attrs) = self.entities.company_attributes(entity_id).await? {
            attrs.cluster_id = Some(cluster_id.to_string());
            return self.entities.upsert_company_attributes_tx(tx, &attrs).await;
        }
        Ok(())
    }
}
