//! Read-only pattern queries over the graph

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use halo_core::{HaloError, Predicate};
use halo_store::{EntityStore, FactStore, HaloDb};

/// Shell-network query parameters; defaults match the operational tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellNetworkParams {
    pub min_companies: usize,
    pub max_employees: i64,
    pub max_revenue: i64,
    pub include_dissolved: bool,
    /// Result cap; hitting it sets `truncated`
    pub limit: usize,
}

impl Default for ShellNetworkParams {
    fn default() -> Self {
        Self {
            min_companies: 3,
            max_employees: 2,
            max_revenue: 500_000,
            include_dissolved: false,
            limit: 100,
        }
    }
}

/// One person directing several small companies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellNetworkMatch {
    pub person_id: Uuid,
    pub person_name: String,
    pub risk_score: Option<f64>,
    pub company_ids: Vec<Uuid>,
    /// Deduplicated across the person's companies
    pub shell_indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellNetworkResult {
    pub matches: Vec<ShellNetworkMatch>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationMillParams {
    pub min_companies: i64,
    pub max_median_age_days: i64,
    pub limit: usize,
}

impl Default for RegistrationMillParams {
    fn default() -> Self {
        Self {
            min_companies: 10,
            max_median_age_days: 730,
            limit: 100,
        }
    }
}

/// An address hosting many freshly registered companies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationMillMatch {
    pub address_id: Uuid,
    pub company_count: i64,
    pub median_age_days: i64,
}

/// A directed DIRECTOR_OF cycle of length 2–4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularDirectorship {
    pub members: Vec<Uuid>,
}

/// Read-only graph queries; never writes
pub struct PatternDetector {
    entities: EntityStore,
    facts: FactStore,
}

impl PatternDetector {
    pub fn new(db: HaloDb) -> Self {
        Self {
            entities: EntityStore::new(db.clone()),
            facts: FactStore::new(db),
        }
    }

    /// Persons currently directing at least `min_companies` small companies
    ///
    /// Ordered by company count descending, then risk score descending.
    /// Shell indicators are deduplicated at the person level, so a person
    /// whose companies share indicators is counted once per indicator.
    pub async fn shell_networks(
        &self,
        params: &ShellNetworkParams,
    ) -> Result<ShellNetworkResult, HaloError> {
        let edges = self.facts.live_edges(Predicate::DirectorOf).await?;

        // company_id -> (passes caps, indicators)
        let mut company_cache: HashMap<Uuid, Option<Vec<String>>> = HashMap::new();
        let mut per_person: BTreeMap<Uuid, (BTreeSet<Uuid>, BTreeSet<String>)> = BTreeMap::new();

        for edge in edges {
            let verdict = match company_cache.get(&edge.object_id) {
                Some(cached) => cached.clone(),
                None => {
                    let verdict = self.company_verdict(edge.object_id, params).await?;
                    company_cache.insert(edge.object_id, verdict.clone());
                    verdict
                }
            };
            let Some(indicators) = verdict else { continue };
            let entry = per_person.entry(edge.subject_id).or_default();
            entry.0.insert(edge.object_id);
            entry.1.extend(indicators);
        }

        let mut matches = Vec::new();
        for (person_id, (companies, indicators)) in per_person {
            if companies.len() < params.min_companies {
                continue;
            }
            let entity = self.entities.require(person_id).await?;
            let risk_score = self
                .entities
                .person_attributes(person_id)
                .await?
                .and_then(|attrs| attrs.risk_score);
            matches.push(ShellNetworkMatch {
                person_id,
                person_name: entity.canonical_name,
                risk_score,
                company_ids: companies.into_iter().collect(),
                shell_indicators: indicators.into_iter().collect(),
            });
        }

        matches.sort_by(|a, b| {
            b.company_ids
                .len()
                .cmp(&a.company_ids.len())
                .then_with(|| {
                    b.risk_score
                        .unwrap_or(0.0)
                        .partial_cmp(&a.risk_score.unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let truncated = matches.len() > params.limit;
        matches.truncate(params.limit);
        debug!(matches = matches.len(), truncated, "shell network scan complete");
        Ok(ShellNetworkResult { matches, truncated })
    }

    /// None when the company fails the size caps; otherwise its indicators
    async fn company_verdict(
        &self,
        company_id: Uuid,
        params: &ShellNetworkParams,
    ) -> Result<Option<Vec<String>>, HaloError> {
        let Some(attrs) = self.entities.company_attributes(company_id).await? else {
            return Ok(None);
        };
        if !params.include_dissolved && attrs.dissolution_date.is_some() {
            return Ok(None);
        }
        if attrs.latest_employees.unwrap_or(0) > params.max_employees {
            return Ok(None);
        }
        if attrs.latest_revenue.unwrap_or(0) > params.max_revenue {
            return Ok(None);
        }
        Ok(Some(attrs.shell_indicators))
    }

    /// Addresses with many young company registrations
    pub async fn registration_mills(
        &self,
        params: &RegistrationMillParams,
    ) -> Result<Vec<RegistrationMillMatch>, HaloError> {
        let today = Utc::now().date_naive();
        let edges = self.facts.live_edges(Predicate::RegisteredAt).await?;

        let mut ages_by_address: HashMap<Uuid, Vec<i64>> = HashMap::new();
        for edge in edges {
            let Some(attrs) = self.entities.company_attributes(edge.subject_id).await? else {
                continue;
            };
            let Some(registered) = attrs.registration_date else {
                continue;
            };
            let age_days = (today - registered).num_days();
            ages_by_address.entry(edge.object_id).or_default().push(age_days);
        }

        let mut matches = Vec::new();
        for (address_id, mut ages) in ages_by_address {
            let company_count = ages.len() as i64;
            if company_count < params.min_companies {
                continue;
            }
            ages.sort_unstable();
            let median = ages[ages.len() / 2];
            if median >= params.max_median_age_days {
                continue;
            }
            matches.push(RegistrationMillMatch {
                address_id,
                company_count,
                median_age_days: median,
            });
        }

        matches.sort_by(|a, b| b.company_count.cmp(&a.company_count));
        matches.truncate(params.limit);
        Ok(matches)
    }

    /// Directed DIRECTOR_OF cycles of length 2 through 4
    pub async fn circular_directorships(&self) -> Result<Vec<CircularDirectorship>, HaloError> {
        const MAX_LEN: usize = 4;
        let edges = self.facts.live_edges(Predicate::DirectorOf).await?;

        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in &edges {
            adjacency.entry(edge.subject_id).or_default().push(edge.object_id);
        }

        let mut found: HashSet<Vec<Uuid>> = HashSet::new();
        for &start in adjacency.keys() {
            let mut path = vec![start];
            Self::walk_cycles(&adjacency, start, &mut path, MAX_LEN, &mut found);
        }

        let mut cycles: Vec<CircularDirectorship> = found
            .into_iter()
            .map(|members| CircularDirectorship { members })
            .collect();
        cycles.sort_by_key(|c| (c.members.len(), c.members.first().copied()));
        Ok(cycles)
    }

    fn walk_cycles(
        adjacency: &HashMap<Uuid, Vec<Uuid>>,
        start: Uuid,
        path: &mut Vec<Uuid>,
        max_len: usize,
        found: &mut HashSet<Vec<Uuid>>,
    ) {
        let current = *path.last().expect("path is never empty");
        let Some(next_hops) = adjacency.get(&current) else {
            return;
        };
        for &next in next_hops {
            if next == start {
                if path.len() >= 2 {
                    found.insert(canonical_rotation(path));
                }
                continue;
            }
            if path.len() < max_len && !path.contains(&next) {
                path.push(next);
                Self::walk_cycles(adjacency, start, path, max_len, found);
                path.pop();
            }
        }
    }
}

/// Rotate a cycle so its smallest member comes first; one representation
/// per cycle regardless of discovery order
fn canonical_rotation(cycle: &[Uuid]) -> Vec<Uuid> {
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(pos, _)| pos)
        .unwrap_or(0);
    cycle[min_pos..]
        .iter()
        .chain(cycle[..min_pos].iter())
        .copied()
        .collect()
}
