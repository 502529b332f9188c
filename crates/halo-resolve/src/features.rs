//! Pairwise similarity features and weighted scoring

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use halo_core::{AddressAttributes, Entity, EntityKind, IdentifierKind, Mention};

use crate::text::token_jaccard;

/// Everything the comparator needs to know about one candidate
#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub entity: Entity,
    pub birth_year: Option<i32>,
    pub address: Option<AddressAttributes>,
    /// Blind indexes per identifier kind
    pub identifier_indexes: HashMap<IdentifierKind, Vec<String>>,
    /// Entities at distance 1 over live relationship edges
    pub neighbors: HashSet<Uuid>,
}

/// Per-pair feature values; None means not applicable for this pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureScores {
    pub identifier_match: Option<f64>,
    pub name_jaro_winkler: Option<f64>,
    pub name_token_jaccard: Option<f64>,
    pub birth_year_match: Option<f64>,
    pub address_similarity: Option<f64>,
    pub network_overlap: Option<f64>,
}

/// Kind-specific feature weights
///
/// Stable across comparisons within a resolution run; ordering and
/// tie-breaks rely on that. None disables a feature for the kind.
#[derive(Debug, Clone, Copy)]
pub struct FeatureWeights {
    pub identifier_match: f64,
    pub name_jaro_winkler: f64,
    pub name_token_jaccard: Option<f64>,
    pub birth_year_match: Option<f64>,
    pub address_similarity: f64,
    pub network_overlap: Option<f64>,
}

impl FeatureWeights {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Person | EntityKind::Event => Self {
                identifier_match: 10.0,
                name_jaro_winkler: 2.0,
                name_token_jaccard: Some(1.5),
                birth_year_match: Some(1.5),
                address_similarity: 1.0,
                network_overlap: Some(2.5),
            },
            EntityKind::Company => Self {
                identifier_match: 10.0,
                name_jaro_winkler: 3.0,
                name_token_jaccard: None,
                birth_year_match: None,
                address_similarity: 1.5,
                network_overlap: Some(2.0),
            },
            EntityKind::Address => Self {
                identifier_match: 10.0,
                name_jaro_winkler: 2.0,
                name_token_jaccard: None,
                birth_year_match: None,
                address_similarity: 3.0,
                network_overlap: None,
            },
        }
    }
}

/// Compute all applicable features for one (mention, candidate) pair
pub fn compare(mention: &Mention, candidate: &CandidateProfile) -> FeatureScores {
    let mut scores = FeatureScores::default();

    scores.identifier_match = identifier_match(mention, candidate);

    let mention_name = mention.normalized_form.to_lowercase();
    let candidate_name = candidate.entity.canonical_name.to_lowercase();
    scores.name_jaro_winkler = Some(strsim::jaro_winkler(&mention_name, &candidate_name));
    scores.name_token_jaccard = Some(token_jaccard(&mention_name, &candidate_name));

    if let (Some(mention_year), Some(candidate_year)) =
        (mention.attributes.birth_year, candidate.birth_year)
    {
        scores.birth_year_match = Some(if mention_year == candidate_year { 1.0 } else { 0.0 });
    }

    scores.address_similarity = address_similarity(mention, candidate);

    if !mention.attributes.related_entities.is_empty() {
        let mention_set: HashSet<Uuid> = mention.attributes.related_entities.iter().copied().collect();
        let shared = mention_set.intersection(&candidate.neighbors).count();
        let union = mention_set.len() + candidate.neighbors.len() - shared;
        scores.network_overlap = Some(if union == 0 {
            0.0
        } else {
            shared as f64 / union as f64
        });
    }

    scores
}

fn identifier_match(mention: &Mention, candidate: &CandidateProfile) -> Option<f64> {
    let (index, kinds): (&Option<String>, &[IdentifierKind]) = match mention.kind {
        EntityKind::Person | EntityKind::Event => (
            &mention.personnummer_index,
            &[IdentifierKind::Personnummer, IdentifierKind::Samordningsnummer],
        ),
        EntityKind::Company => (
            &mention.orgnummer_index,
            &[IdentifierKind::Organisationsnummer],
        ),
        EntityKind::Address => return None,
    };
    let index = index.as_ref()?;

    let candidate_indexes: Vec<&String> = kinds
        .iter()
        .filter_map(|kind| candidate.identifier_indexes.get(kind))
        .flatten()
        .collect();
    if candidate_indexes.is_empty() {
        return None;
    }
    Some(if candidate_indexes.iter().any(|ci| *ci == index) {
        1.0
    } else {
        0.0
    })
}

/// 0.3 * postal exact + 0.5 * Jaro-Winkler(streets) + 0.2 * number exact
fn address_similarity(mention: &Mention, candidate: &CandidateProfile) -> Option<f64> {
    let candidate_address = candidate.address.as_ref()?;
    let attrs = &mention.attributes;
    if attrs.postal_code.is_none() && attrs.street.is_none() && attrs.street_number.is_none() {
        return None;
    }

    let mut total = 0.0;
    if let (Some(a), Some(b)) = (&attrs.postal_code, &candidate_address.postal_code) {
        if normalize_postal(a) == normalize_postal(b) {
            total += 0.3;
        }
    }
    if let (Some(a), Some(b)) = (&attrs.street, &candidate_address.street) {
        total += 0.5 * strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase());
    }
    if let (Some(a), Some(b)) = (&attrs.street_number, &candidate_address.street_number) {
        if a == b {
            total += 0.2;
        }
    }
    Some(total)
}

fn normalize_postal(code: &str) -> String {
    code.chars().filter(char::is_ascii_digit).collect()
}

/// Weighted average over the applicable feature set
///
/// An exact identifier match short-circuits to 0.99.
pub fn score(kind: EntityKind, features: &FeatureScores) -> f64 {
    if features.identifier_match == Some(1.0) {
        return 0.99;
    }

    let weights = FeatureWeights::for_kind(kind);
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    let mut add = |value: Option<f64>, weight: Option<f64>| {
        if let (Some(value), Some(weight)) = (value, weight) {
            weighted_sum += value * weight;
            weight_total += weight;
        }
    };

    add(features.identifier_match, Some(weights.identifier_match));
    add(features.name_jaro_winkler, Some(weights.name_jaro_winkler));
    add(features.name_token_jaccard, weights.name_token_jaccard);
    add(features.birth_year_match, weights.birth_year_match);
    add(features.address_similarity, Some(weights.address_similarity));
    add(features.network_overlap, weights.network_overlap);

    drop(add);
    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use halo_core::{EntityStatus, ExtractedAttributes, ResolutionStatus};

    fn mention(kind: EntityKind, name: &str) -> Mention {
        Mention {
            id: Uuid::new_v4(),
            kind,
            surface_form: name.to_string(),
            normalized_form: name.to_string(),
            personnummer_cipher: None,
            personnummer_index: None,
            orgnummer_cipher: None,
            orgnummer_index: None,
            attributes: ExtractedAttributes::default(),
            provenance_id: Uuid::new_v4(),
            document_location: None,
            resolution_status: ResolutionStatus::Pending,
            resolved_to: None,
            resolution_confidence: None,
            resolution_method: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    fn candidate(kind: EntityKind, name: &str) -> CandidateProfile {
        CandidateProfile {
            entity: Entity {
                id: Uuid::new_v4(),
                kind,
                canonical_name: name.to_string(),
                phonetic_code: String::new(),
                resolution_confidence: 1.0,
                status: EntityStatus::Active,
                merged_into: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            birth_year: None,
            address: None,
            identifier_indexes: HashMap::new(),
            neighbors: HashSet::new(),
        }
    }

    #[test]
    fn identifier_match_short_circuits_to_099() {
        let mut m = mention(EntityKind::Person, "ANNA SVENSSON");
        m.personnummer_index = Some("aa".repeat(16));
        let mut c = candidate(EntityKind::Person, "A SVENSSON");
        c.identifier_indexes
            .insert(IdentifierKind::Personnummer, vec!["aa".repeat(16)]);

        let features = compare(&m, &c);
        assert_eq!(features.identifier_match, Some(1.0));
        assert_eq!(score(EntityKind::Person, &features), 0.99);
    }

    #[test]
    fn identifier_mismatch_drags_the_score_down() {
        let mut m = mention(EntityKind::Person, "ANNA SVENSSON");
        m.personnummer_index = Some("aa".repeat(16));
        let mut c = candidate(EntityKind::Person, "ANNA SVENSSON");
        c.identifier_indexes
            .insert(IdentifierKind::Personnummer, vec!["bb".repeat(16)]);

        let features = compare(&m, &c);
        assert_eq!(features.identifier_match, Some(0.0));
        // identical names but conflicting identifiers: well below auto-match
        assert!(score(EntityKind::Person, &features) < 0.60);
    }

    #[test]
    fn company_abbreviation_lands_in_the_review_band() {
        let m = mention(EntityKind::Company, "TEST AKTIEBOLAG");
        let c = candidate(EntityKind::Company, "TEST AB");
        let features = compare(&m, &c);
        let s = score(EntityKind::Company, &features);
        assert!(s >= 0.60 && s < 0.95, "score {s}");
    }

    #[test]
    fn exact_name_and_birth_year_clears_auto_match_for_persons() {
        let mut m = mention(EntityKind::Person, "ANNA SVENSSON");
        m.attributes.birth_year = Some(1981);
        let mut c = candidate(EntityKind::Person, "ANNA SVENSSON");
        c.birth_year = Some(1981);

        let features = compare(&m, &c);
        let s = score(EntityKind::Person, &features);
        assert!(s >= 0.95, "score {s}");
    }

    #[test]
    fn network_overlap_requires_mention_context() {
        let m = mention(EntityKind::Person, "ANNA");
        let c = candidate(EntityKind::Person, "ANNA");
        assert!(compare(&m, &c).network_overlap.is_none());
    }
}
