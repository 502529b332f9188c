//! Immutable runtime configuration
//!
//! One `HaloConfig` is built at process start and passed explicitly to every
//! component. No module-level mutables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Decision thresholds for one entity kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    /// Score at or above which the mention auto-matches
    pub auto_match: f64,
    /// Score at or above which candidates enter the human review queue
    pub human_review_min: f64,
}

/// Resolver tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub person: Thresholds,
    pub company: Thresholds,
    pub address: Thresholds,
    /// Per-mention time budget; on expiry the mention stays PENDING
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Concurrency bound for batch resolution
    pub batch_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            person: Thresholds {
                auto_match: 0.95,
                human_review_min: 0.60,
            },
            company: Thresholds {
                auto_match: 0.95,
                human_review_min: 0.60,
            },
            address: Thresholds {
                auto_match: 0.90,
                human_review_min: 0.50,
            },
            timeout: Duration::from_secs(30),
            batch_concurrency: 8,
        }
    }
}

impl ResolverConfig {
    pub fn thresholds(&self, kind: EntityKind) -> Thresholds {
        match kind {
            EntityKind::Person | EntityKind::Event => self.person,
            EntityKind::Company => self.company,
            EntityKind::Address => self.address,
        }
    }
}

/// Candidate-generation caps; bound worst-case latency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Minimum trigram similarity for the phonetic-name strategy
    pub trigram_threshold: f64,
    /// Cap on phonetic-name candidates
    pub phonetic_cap: usize,
    /// Cap on name-prefix + birth-year candidates
    pub prefix_cap: usize,
    /// Cap on postal-code prefix candidates
    pub postal_cap: usize,
    /// Raw pool fetched per strategy before in-process ranking
    pub candidate_pool: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            trigram_threshold: 0.3,
            phonetic_cap: 50,
            prefix_cap: 50,
            postal_cap: 100,
            candidate_pool: 200,
        }
    }
}

/// Derivation-rule tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationConfig {
    /// SNI codes considered shell-prone
    pub shell_prone_sni: Vec<String>,
    /// Company count at which an address becomes a registration hub
    pub registration_hub_threshold: i64,
    /// Window for director-change velocity, in days
    pub velocity_window_days: i64,
    /// Velocity above which a company is tagged high_velocity
    pub high_velocity_threshold: f64,
    /// Employee count at or below which a company is tagged low_headcount
    pub shell_max_employees: i64,
    /// Revenue at or below which a company is tagged low_revenue
    pub shell_max_revenue: i64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            // Holding, head-office, and letterbox-heavy activity codes
            shell_prone_sni: vec![
                "64200".to_string(),
                "64910".to_string(),
                "68100".to_string(),
                "70100".to_string(),
                "82110".to_string(),
            ],
            registration_hub_threshold: 20,
            velocity_window_days: 365,
            high_velocity_threshold: 2.0,
            shell_max_employees: 2,
            shell_max_revenue: 500_000,
        }
    }
}

/// Top-level immutable configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloConfig {
    pub resolver: ResolverConfig,
    pub blocking: BlockingConfig,
    pub derivation: DerivationConfig,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_thresholds() {
        let cfg = ResolverConfig::default();
        assert_eq!(cfg.thresholds(EntityKind::Person).auto_match, 0.95);
        assert_eq!(cfg.thresholds(EntityKind::Company).human_review_min, 0.60);
        assert_eq!(cfg.thresholds(EntityKind::Address).auto_match, 0.90);
        assert_eq!(cfg.thresholds(EntityKind::Address).human_review_min, 0.50);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = HaloConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: HaloConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blocking.phonetic_cap, 50);
        assert_eq!(back.resolver.timeout, cfg.resolver.timeout);
    }
}
