//! Neighborhood subgraphs and ranked search

mod common;

use common::{company_mention, materialize, person_mention, relate, service};
use halo_core::{EntityKind, IdentifierKind, Predicate};

#[tokio::test]
async fn relationships_expand_to_depth_and_truncate_on_cap() {
    let service = service().await;

    let person = materialize(
        &service,
        person_mention("Gunnar Wallin", Some("198112189876"), None),
        "seed",
    )
    .await;
    let orgs = ["5566778899", "5560360793", "5565594230"];
    let mut companies = Vec::new();
    for (n, orgnr) in orgs.iter().enumerate() {
        let company = materialize(
            &service,
            company_mention(&format!("Wallin Invest {n} AB"), Some(orgnr), None, None),
            "seed",
        )
        .await;
        relate(&service, person, Predicate::DirectorOf, company).await;
        companies.push(company);
    }
    // a second-degree neighbor behind the first company
    let partner = materialize(&service, person_mention("Hedvig Lund", None, None), "seed").await;
    relate(&service, partner, Predicate::ShareholderOf, companies[0]).await;

    let depth_one = service
        .relationships(person, 1, None, 100)
        .await
        .unwrap();
    assert_eq!(depth_one.nodes.len(), 4, "person plus three companies");
    assert_eq!(depth_one.edges.len(), 3);
    assert!(!depth_one.truncated);

    let depth_two = service
        .relationships(person, 2, None, 100)
        .await
        .unwrap();
    assert_eq!(depth_two.nodes.len(), 5, "partner appears at depth 2");
    assert_eq!(depth_two.edges.len(), 4);

    let capped = service.relationships(person, 2, None, 2).await.unwrap();
    assert!(capped.truncated);
    assert!(capped.nodes.len() <= 2);

    let filtered = service
        .relationships(person, 2, Some(vec![Predicate::DirectorOf]), 100)
        .await
        .unwrap();
    assert_eq!(filtered.edges.len(), 3, "shareholder edge filtered out");
}

#[tokio::test]
async fn search_ranks_names_and_short_circuits_on_identifiers() {
    let service = service().await;

    let anna = materialize(
        &service,
        person_mention("Anna Svensson", Some("198112189876"), Some(1981)),
        "seed",
    )
    .await;
    materialize(
        &service,
        company_mention("Svensson Måleri AB", Some("5566778899"), None, None),
        "seed",
    )
    .await;

    // a valid personnummer is an exact blind-index lookup
    let hits = service.search("19811218-9876", None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entity.id, anna);
    assert_eq!(hits[0].score, 1.0);

    // name search ranks by trigram similarity
    let hits = service
        .search("Anna Svenson", Some(EntityKind::Person))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].entity.id, anna);

    // a valid but unknown identifier finds nothing rather than falling
    // back to fuzzy names
    let hits = service.search("198501016763", None).await.unwrap();
    assert!(hits.is_empty());

    // lookups by kind respect the identifier kind
    assert!(service
        .lookup_by_identifier(IdentifierKind::Organisationsnummer, "5566778899")
        .await
        .unwrap()
        .is_some());
}
