//! End-to-end resolution scenarios against an in-memory store

mod common;

use common::{company_mention, materialize, person_mention, provenance, service};
use halo_api::SourceBatch;
use halo_core::{DecisionOutcome, EntityKind, EntityStatus, IdentifierKind, ResolutionStatus};
use halo_resolve::{HumanDecision, ResolutionOutcome};

#[tokio::test]
async fn exact_identifier_auto_match() {
    let service = service().await;

    // an entity with PERSONNUMMER 198112189876 already exists
    let anna = materialize(
        &service,
        person_mention("Anna Svensson", Some("198112189876"), Some(1981)),
        "seed",
    )
    .await;

    let entries_before = service.export_audit_jsonl().await.unwrap().lines().count();

    // a new mention carrying the same personnummer
    let report = service
        .ingest_batch(SourceBatch {
            provenance: provenance("second-sighting"),
            mentions: vec![person_mention("ANNA SVENSSON", Some("198112189876"), None)],
            facts: Vec::new(),
        })
        .await
        .unwrap();
    let mention_id = report.mention_ids[0];

    let result = service.resolve_mention(mention_id).await.unwrap();
    match result.outcome {
        ResolutionOutcome::AutoMatched {
            entity_id,
            confidence,
            ref method,
        } => {
            assert_eq!(entity_id, anna);
            assert_eq!(confidence, 0.99);
            assert_eq!(method, "exact_identifier");
        }
        other => panic!("expected auto-match, got {other:?}"),
    }

    let decisions = service.review_queue(None, 10).await.unwrap();
    assert!(decisions.is_empty(), "nothing left for review");

    // exactly one AUTO_MATCH decision was logged for the mention
    let stored = halo_store::MentionStore::new(service.db().clone());
    let mention = stored.require(mention_id).await.unwrap();
    assert_eq!(mention.resolution_status, ResolutionStatus::AutoMatched);
    assert_eq!(mention.resolved_to, Some(anna));
    assert_eq!(mention.resolution_confidence, Some(0.99));
    let decisions = stored.decisions_for(mention_id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].outcome, DecisionOutcome::AutoMatch);

    // the resolution itself wrote exactly one audit entry (ingest wrote its
    // own before it)
    let entries_after = service.export_audit_jsonl().await.unwrap().lines().count();
    assert_eq!(entries_after - entries_before, 2); // BATCH_INGESTED + MENTION_RESOLVED
}

#[tokio::test]
async fn new_entity_creation_from_empty_store() {
    let service = service().await;

    let report = service
        .ingest_batch(SourceBatch {
            provenance: provenance("first-batch"),
            mentions: vec![person_mention(
                "Johan Andersson",
                Some("198501011234"),
                Some(1985),
            )],
            facts: Vec::new(),
        })
        .await
        .unwrap();

    let result = service.resolve_mention(report.mention_ids[0]).await.unwrap();
    let entity_id = match result.outcome {
        ResolutionOutcome::NewEntity { entity_id } => entity_id,
        other => panic!("expected new entity, got {other:?}"),
    };

    let view = service.get_entity(entity_id).await.unwrap();
    assert_eq!(view.entity.canonical_name, "JOHAN ANDERSSON");
    assert_eq!(view.entity.kind, EntityKind::Person);
    assert_eq!(view.entity.status, EntityStatus::Active);
    let person = view.person.expect("person attributes row");
    assert_eq!(person.birth_year, Some(1985));
    assert_eq!(view.identifiers.len(), 1);
    assert_eq!(view.identifiers[0].kind, IdentifierKind::Personnummer);
    assert!(view.identifiers[0].value_cipher.starts_with("enc2:"));

    let mentions = halo_store::MentionStore::new(service.db().clone());
    let mention = mentions.require(report.mention_ids[0]).await.unwrap();
    assert_eq!(mention.resolution_status, ResolutionStatus::AutoMatched);
    assert_eq!(mention.resolution_method.as_deref(), Some("new_entity"));
    assert_eq!(mention.resolution_confidence, Some(1.0));
}

#[tokio::test]
async fn abbreviated_company_name_lands_in_review_queue() {
    let service = service().await;

    materialize(
        &service,
        company_mention("Test AB", Some("5566778899"), None, None),
        "seed",
    )
    .await;

    let report = service
        .ingest_batch(SourceBatch {
            provenance: provenance("allabolag-scrape"),
            mentions: vec![company_mention("Test Aktiebolag", None, None, None)],
            facts: Vec::new(),
        })
        .await
        .unwrap();
    let mention_id = report.mention_ids[0];

    let result = service.resolve_mention(mention_id).await.unwrap();
    let top_score = match result.outcome {
        ResolutionOutcome::PendingReview { top_score, .. } => top_score,
        other => panic!("expected review, got {other:?}"),
    };
    assert!(
        (0.60..0.95).contains(&top_score),
        "score {top_score} outside the review band"
    );

    let queue = service.review_queue(Some(EntityKind::Company), 10).await.unwrap();
    assert_eq!(queue.len(), 1);
    let (mention, decisions) = &queue[0];
    assert_eq!(mention.id, mention_id);
    assert_eq!(mention.resolution_status, ResolutionStatus::Pending);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].outcome, DecisionOutcome::PendingReview);
}

#[tokio::test]
async fn human_decision_resolves_a_queued_mention() {
    let service = service().await;

    let test_ab = materialize(
        &service,
        company_mention("Test AB", Some("5566778899"), None, None),
        "seed",
    )
    .await;

    let report = service
        .ingest_batch(SourceBatch {
            provenance: provenance("scrape"),
            mentions: vec![company_mention("Test Aktiebolag", None, None, None)],
            facts: Vec::new(),
        })
        .await
        .unwrap();
    let mention_id = report.mention_ids[0];
    service.resolve_mention(mention_id).await.unwrap();

    let mention = service
        .submit_decision(
            mention_id,
            "analyst.k",
            HumanDecision::Match { entity_id: test_ab },
            Some("same orgnr on the scanned filing"),
        )
        .await
        .unwrap();

    assert_eq!(mention.resolution_status, ResolutionStatus::HumanMatched);
    assert_eq!(mention.resolved_to, Some(test_ab));
    assert_eq!(mention.resolved_by.as_deref(), Some("analyst.k"));
    assert!(service.review_queue(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_duplicate_creation_serializes_on_the_identifier() {
    let service = std::sync::Arc::new(service().await);

    // two mentions of the same unseen person arrive at once
    let mut mention_ids = Vec::new();
    for n in 0..2 {
        let report = service
            .ingest_batch(SourceBatch {
                provenance: provenance(&format!("feed-{n}")),
                mentions: vec![person_mention("Karin Lindqvist", Some("198112189876"), None)],
                facts: Vec::new(),
            })
            .await
            .unwrap();
        mention_ids.push(report.mention_ids[0]);
    }

    let (a, b) = tokio::join!(
        service.resolve_mention(mention_ids[0]),
        service.resolve_mention(mention_ids[1]),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let entity_of = |outcome: &ResolutionOutcome| match outcome {
        ResolutionOutcome::AutoMatched { entity_id, .. } => *entity_id,
        ResolutionOutcome::NewEntity { entity_id } => *entity_id,
        other => panic!("unexpected outcome {other:?}"),
    };
    // one created, the other observed the winner: same entity either way
    assert_eq!(entity_of(&a.outcome), entity_of(&b.outcome));

    // and the identifier denotes exactly one entity
    let view = service
        .lookup_by_identifier(IdentifierKind::Personnummer, "198112189876")
        .await
        .unwrap()
        .expect("identifier resolves");
    assert_eq!(view.entity.id, entity_of(&a.outcome));
    assert_eq!(view.identifiers.len(), 1);
}

#[tokio::test]
async fn merge_rewrites_facts_and_leaves_a_same_as_trail() {
    let service = service().await;

    let first = materialize(
        &service,
        person_mention("Lars Eriksson", Some("198112189876"), Some(1981)),
        "a",
    )
    .await;
    // phonetically distinct, so no blocking collision with the first entity
    let second = materialize(&service, person_mention("Lasse Nordin", None, None), "b").await;
    assert_ne!(first, second, "distinct entities before the merge");

    let company = materialize(
        &service,
        company_mention("Eriksson Bygg AB", Some("5566778899"), Some(1), Some(100_000)),
        "c",
    )
    .await;
    common::relate(&service, second, halo_core::Predicate::DirectorOf, company).await;

    let report = service
        .merge_entities(first, second, "analyst.k", Some("same person, double-entered"))
        .await
        .unwrap();
    assert_eq!(report.survivor, first);
    assert_eq!(report.merged, second);
    assert_eq!(report.facts_rewritten, 1);

    // the loser is preserved, pointing at the survivor
    let merged = service.resolve_alias(second).await.unwrap();
    assert_eq!(merged.id, first);

    let facts = halo_store::FactStore::new(service.db().clone());
    let rewritten = facts.live_for_subject(first).await.unwrap();
    assert!(rewritten
        .iter()
        .any(|f| f.predicate == halo_core::Predicate::DirectorOf && f.object_id == Some(company)));

    let survivor_view = service.get_entity(first).await.unwrap();
    assert!(survivor_view.same_as.contains(&second));
}

#[tokio::test]
async fn anonymization_strips_identifiers_but_keeps_facts() {
    let service = service().await;

    let person = materialize(
        &service,
        person_mention("Maria Nilsson", Some("198112189876"), Some(1981)),
        "seed",
    )
    .await;
    let company = materialize(
        &service,
        company_mention("Nilsson Konsult AB", Some("5566778899"), None, None),
        "seed",
    )
    .await;
    common::relate(&service, person, halo_core::Predicate::DirectorOf, company).await;

    service.anonymize_entity(person, "dpo").await.unwrap();

    let view = service.get_entity(person).await.unwrap();
    assert_eq!(view.entity.status, EntityStatus::Anonymized);
    assert!(view.identifiers.is_empty());
    let attrs = view.person.expect("attribute row survives anonymization");
    assert_eq!(attrs.birth_year, None);
    assert_eq!(attrs.birth_date, None);
    assert_eq!(attrs.gender, None);

    // facts survive anonymization
    let facts = halo_store::FactStore::new(service.db().clone());
    assert_eq!(facts.live_for_subject(person).await.unwrap().len(), 1);

    // and the entity no longer answers ACTIVE lookups
    assert!(service
        .lookup_by_identifier(IdentifierKind::Personnummer, "198112189876")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn batch_resolution_processes_pending_mentions() {
    let service = service().await;

    let mut expected = 0;
    for (name, pnr) in [
        ("Anna Bergström", Some("198112189876")),
        ("Oskar Dahlgren", None),
        ("Elin Forsberg", None),
    ] {
        service
            .ingest_batch(SourceBatch {
                provenance: provenance("bulk"),
                mentions: vec![person_mention(name, pnr, None)],
                facts: Vec::new(),
            })
            .await
            .unwrap();
        expected += 1;
    }

    let outcome = service.resolve_pending(None, 50).await.unwrap();
    assert_eq!(outcome.processed, expected);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.new_entities, expected);

    let leftover = service.review_queue(None, 50).await.unwrap();
    assert!(leftover.is_empty());
}
