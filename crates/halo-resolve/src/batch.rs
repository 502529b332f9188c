//! Bounded-concurrency batch resolution
//!
//! Resolution is embarrassingly parallel across mentions. Each mention runs
//! in its own task under a semaphore; a failing mention stays PENDING with a
//! failure audit entry and never rolls back its siblings.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use halo_core::{AuditEventType, EntityKind, HaloError};

use crate::resolver::{ResolutionOutcome, Resolver};

/// Tally of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub auto_matched: usize,
    pub new_entities: usize,
    pub queued_for_review: usize,
    pub failed: usize,
}

/// Resolve up to `limit` PENDING mentions of the given kind
pub async fn resolve_pending(
    resolver: Arc<Resolver>,
    kind: Option<EntityKind>,
    limit: usize,
) -> Result<BatchOutcome, HaloError> {
    let pending = resolver.mentions.pending(kind, limit).await?;
    if pending.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let concurrency = resolver.config.resolver.batch_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(pending.len());

    for mention in pending {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("batch semaphore closed unexpectedly");
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            let result = resolver.resolve_mention(mention.id).await;
            drop(permit);
            (mention.id, result)
        }));
    }

    let mut outcome = BatchOutcome::default();
    for handle in handles {
        match handle.await {
            Ok((_, Ok(result))) => {
                outcome.processed += 1;
                match result.outcome {
                    ResolutionOutcome::AutoMatched { .. } => outcome.auto_matched += 1,
                    ResolutionOutcome::NewEntity { .. } => outcome.new_entities += 1,
                    ResolutionOutcome::PendingReview { .. } => outcome.queued_for_review += 1,
                }
            }
            Ok((mention_id, Err(error))) => {
                outcome.processed += 1;
                outcome.failed += 1;
                warn!(%mention_id, %error, "mention resolution failed; mention stays PENDING");
                // timeouts already wrote their audit note inside the resolver
                if !matches!(error, HaloError::Timeout(_)) {
                    resolver
                        .audit
                        .record_failure(
                            AuditEventType::ResolutionFailed,
                            "mention",
                            mention_id,
                            &error,
                        )
                        .await;
                }
            }
            Err(join_error) => {
                outcome.failed += 1;
                warn!(%join_error, "resolution task aborted");
            }
        }
    }

    info!(
        processed = outcome.processed,
        auto_matched = outcome.auto_matched,
        new_entities = outcome.new_entities,
        queued = outcome.queued_for_review,
        failed = outcome.failed,
        "batch resolution finished"
    );
    Ok(outcome)
}
