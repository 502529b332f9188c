//! Rule names and the person-risk factor table
//!
//! Rule names are versioned and stored on every derived fact; bumping a
//! rule's semantics means bumping its name.

/// Shell-indicator accumulation on companies
pub const RULE_SHELL_INDICATORS: &str = "company_shell_indicators_v1";
/// Director-change velocity on companies
pub const RULE_DIRECTOR_VELOCITY: &str = "director_velocity_v1";
/// Weighted person risk score
pub const RULE_PERSON_RISK: &str = "person_risk_v1";
/// Registration counts and hub flag on addresses
pub const RULE_ADDRESS_STATISTICS: &str = "address_statistics_v1";
/// Connected-component cluster ids over director/shareholder edges
pub const RULE_NETWORK_CLUSTER: &str = "network_cluster_v1";

/// Shell-indicator tags
pub const TAG_LOW_HEADCOUNT: &str = "low_headcount";
pub const TAG_LOW_REVENUE: &str = "low_revenue";
pub const TAG_REGISTRATION_HUB: &str = "registration_hub_address";
pub const TAG_SHELL_PRONE_SNI: &str = "shell_prone_sni";
pub const TAG_HIGH_VELOCITY: &str = "high_velocity";

/// One contributing person-risk factor: (tag, weight)
pub const PERSON_RISK_FACTORS: &[(&str, f64)] = &[
    ("many_directorships", 0.2),
    ("shell_company_director", 0.3),
    ("high_velocity_network", 0.2),
    ("vulnerable_area_companies", 0.15),
    ("dissolved_history", 0.1),
    ("young_director", 0.05),
];

/// Look up a factor weight by tag
pub fn factor_weight(tag: &str) -> f64 {
    PERSON_RISK_FACTORS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, weight)| *weight)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_factors_cap_at_one() {
        let total: f64 = PERSON_RISK_FACTORS.iter().map(|(_, w)| w).sum();
        assert!(total <= 1.0 + f64::EPSILON);
    }

    #[test]
    fn unknown_factor_weighs_nothing() {
        assert_eq!(factor_weight("no_such_factor"), 0.0);
        assert_eq!(factor_weight("shell_company_director"), 0.3);
    }
}
