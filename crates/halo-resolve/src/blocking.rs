//! Candidate generation over mentions
//!
//! Strategies run in order; the first exact-identifier hit short-circuits.
//! The block set is the deduplicated union of the name, prefix, and
//! postal-code strategies, each capped to bound worst-case latency.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use halo_core::{BlockingConfig, Entity, EntityKind, HaloError, IdentifierKind, Mention};
use halo_normalize::{normalize_company_name, phonetic_code};
use halo_store::EntityStore;

use crate::text::trigram_similarity;

/// Result of blocking for one mention
#[derive(Debug)]
pub enum BlockSet {
    /// An identifier row matched: auto-match at 0.99 without comparison
    Exact(Entity),
    /// Candidates for pairwise comparison; may be empty
    Candidates(Vec<Entity>),
}

pub struct BlockingIndex {
    entities: EntityStore,
    config: BlockingConfig,
}

impl BlockingIndex {
    pub fn new(entities: EntityStore, config: BlockingConfig) -> Self {
        Self { entities, config }
    }

    /// The comparison name: legal-form tokens stripped for companies,
    /// normalization always before prefixing
    pub fn blocking_name(mention: &Mention) -> String {
        match mention.kind {
            EntityKind::Company => normalize_company_name(&mention.normalized_form).normalized,
            _ => mention.normalized_form.clone(),
        }
    }

    pub async fn candidates(&self, mention: &Mention) -> Result<BlockSet, HaloError> {
        // 1. exact identifier
        if let Some(entity) = self.exact_identifier(mention).await? {
            debug!(mention_id = %mention.id, entity_id = %entity.id, "blocking: exact identifier hit");
            return Ok(BlockSet::Exact(entity));
        }

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut candidates: Vec<Entity> = Vec::new();

        // 2. phonetic name, ranked by trigram similarity
        let name = Self::blocking_name(mention);
        if !name.is_empty() {
            let code = phonetic_code(&name);
            let pool = self
                .entities
                .phonetic_candidates(mention.kind, &code, self.config.candidate_pool)
                .await?;
            let mut ranked: Vec<(f64, Entity)> = pool
                .into_iter()
                .map(|entity| {
                    let similarity =
                        trigram_similarity(&mention.normalized_form, &entity.canonical_name);
                    (similarity, entity)
                })
                .filter(|(similarity, _)| *similarity > self.config.trigram_threshold)
                .collect();
            ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            for (_, entity) in ranked.into_iter().take(self.config.phonetic_cap) {
                if seen.insert(entity.id) {
                    candidates.push(entity);
                }
            }
        }

        // 3. name prefix + birth year, persons only
        if mention.kind == EntityKind::Person {
            if let Some(birth_year) = mention.attributes.birth_year {
                let prefix: String = name.chars().take(4).collect();
                if !prefix.is_empty() {
                    let pool = self
                        .entities
                        .prefix_birth_year_candidates(&prefix, birth_year, self.config.prefix_cap)
                        .await?;
                    for entity in pool {
                        if seen.insert(entity.id) {
                            candidates.push(entity);
                        }
                    }
                }
            }
        }

        // 4. postal-code prefix, addresses only
        if mention.kind == EntityKind::Address {
            if let Some(postal) = &mention.attributes.postal_code {
                let digits: String = postal.chars().filter(char::is_ascii_digit).collect();
                if digits.len() >= 3 {
                    let pool = self
                        .entities
                        .postal_prefix_candidates(&digits[..3], self.config.postal_cap)
                        .await?;
                    for entity in pool {
                        if seen.insert(entity.id) {
                            candidates.push(entity);
                        }
                    }
                }
            }
        }

        debug!(
            mention_id = %mention.id,
            candidates = candidates.len(),
            "blocking: candidate set assembled"
        );
        Ok(BlockSet::Candidates(candidates))
    }

    async fn exact_identifier(&self, mention: &Mention) -> Result<Option<Entity>, HaloError> {
        match mention.kind {
            EntityKind::Person | EntityKind::Event => {
                if let Some(index) = &mention.personnummer_index {
                    for kind in [IdentifierKind::Personnummer, IdentifierKind::Samordningsnummer] {
                        if let Some(entity) =
                            self.entities.find_by_identifier(kind, index).await?
                        {
                            return Ok(Some(entity));
                        }
                    }
                }
                Ok(None)
            }
            EntityKind::Company => match &mention.orgnummer_index {
                Some(index) => {
                    self.entities
                        .find_by_identifier(IdentifierKind::Organisationsnummer, index)
                        .await
                }
                None => Ok(None),
            },
            EntityKind::Address => Ok(None),
        }
    }
}
