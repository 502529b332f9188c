//! # Halo Derive
//!
//! Batch computation of derived intelligence over the entity graph:
//!
//! - [`DerivationEngine`] — versioned rules producing derived facts (with
//!   supersession and DERIVED_COMPUTATION provenance) and denormalized
//!   attribute updates. Rules run in a fixed dependency order: company
//!   signals and address statistics before person risk, network clusters
//!   last. Each entity commits in its own transaction, so a cancelled batch
//!   keeps its per-entity progress.
//! - [`PatternDetector`] — read-only queries over the graph: shell
//!   networks, registration mills, circular directorships.

pub mod cluster;
pub mod engine;
pub mod patterns;
pub mod rules;

pub use engine::{DerivationEngine, DerivationReport};
pub use patterns::{
    CircularDirectorship, PatternDetector, RegistrationMillMatch, RegistrationMillParams,
    ShellNetworkMatch, ShellNetworkParams, ShellNetworkResult,
};
pub use rules::{
    RULE_ADDRESS_STATISTICS, RULE_DIRECTOR_VELOCITY, RULE_NETWORK_CLUSTER, RULE_PERSON_RISK,
    RULE_SHELL_INDICATORS,
};
