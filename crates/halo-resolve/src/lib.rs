//! # Halo Resolve
//!
//! The resolution pipeline: candidate blocking, pairwise feature comparison,
//! thresholded decisions, human review, merge/anonymize, and bounded-
//! concurrency batch resolution.
//!
//! The flow for one mention:
//!
//! 1. [`BlockingIndex`] produces a small candidate superset (exact
//!    identifier short-circuits).
//! 2. [`features`] scores each candidate pair with kind-specific weights.
//! 3. [`Resolver`] applies the thresholds: auto-match, review queue, or
//!    new-entity creation, all committed in one transaction together with
//!    decision rows and an audit entry.

pub mod batch;
pub mod blocking;
pub mod features;
pub mod merge;
pub mod resolver;
pub mod text;

pub use batch::{resolve_pending, BatchOutcome};
pub use blocking::{BlockSet, BlockingIndex};
pub use features::{CandidateProfile, FeatureScores, FeatureWeights};
pub use merge::MergeReport;
pub use resolver::{HumanDecision, ResolutionOutcome, ResolutionResult, Resolver};
pub use text::trigram_similarity;
