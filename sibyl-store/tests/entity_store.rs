use std::sync::Arc;

use chrono::{Duration, Utc};

use sibyl_core::{GraphWeights, ScoringWeights, StoreSettings};
use sibyl_store::{
    Entity, EntityCategory, EntityStore, MemoryConnector, NewEntity, StoreError,
};

fn store_with_connector() -> (EntityStore, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::new());
    let store = EntityStore::new(
        StoreSettings::default(),
        ScoringWeights::default(),
        GraphWeights::default(),
        connector.clone(),
    );
    (store, connector)
}

fn new_entity(name: &str, category: EntityCategory, description: &str) -> NewEntity {
    NewEntity {
        name: name.to_string(),
        category,
        source_query: format!("about {name}"),
        description: description.to_string(),
    }
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let (store, connector) = store_with_connector();
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.connect("general").await }));
    }
    for handle in handles {
        handle.await.expect("join").expect("connect");
    }

    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn concurrent_first_connects_warm_the_index_once() {
    let (store, connector) = store_with_connector();
    let backend = connector.backend("general").await;
    backend
        .seed(vec![Entity::new(new_entity(
            "Ada Lovelace",
            EntityCategory::Person,
            "pioneer",
        ))])
        .await;

    let store = Arc::new(store);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.get_all_entities("general").await
        }));
    }
    for handle in handles {
        // Every caller awaiting the first connect sees the warmed index.
        let entities = handle.await.expect("join").expect("read");
        assert_eq!(entities.len(), 1);
    }

    assert_eq!(connector.attempts(), 1);
    assert_eq!(backend.fetches(), 1, "the initial warm must run once, inside the shared connect");
}

#[tokio::test]
async fn backing_growth_triggers_background_rewarm() {
    let connector = Arc::new(MemoryConnector::new());
    let settings = StoreSettings {
        // Growth checks allowed on every read; staleness out of the picture.
        request_cache_seconds: 0,
        warm_refresh_seconds: 3600,
        ..StoreSettings::default()
    };
    let store = EntityStore::new(
        settings,
        ScoringWeights::default(),
        GraphWeights::default(),
        connector.clone(),
    );

    let backend = connector.backend("general").await;
    backend
        .seed(vec![
            Entity::new(new_entity("node 0", EntityCategory::Concept, "")),
            Entity::new(new_entity("node 1", EntityCategory::Concept, "")),
        ])
        .await;
    store.connect("general").await.unwrap();
    assert_eq!(store.get_all_entities("general").await.unwrap().len(), 2);

    // Another writer grows the backing store well past the 10% ratio.
    let late: Vec<Entity> = (2..12)
        .map(|i| Entity::new(new_entity(&format!("node {i}"), EntityCategory::Concept, "")))
        .collect();
    backend.seed(late).await;

    let mut seen = 0;
    for _ in 0..100 {
        seen = store.get_all_entities("general").await.unwrap().len();
        if seen == 12 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(seen, 12, "growth check must pick up records written by other processes");
}

#[tokio::test]
async fn connect_failure_names_namespace_and_allows_retry() {
    let (store, connector) = store_with_connector();
    connector.refuse("broken").await;

    let err = store.connect("broken").await.unwrap_err();
    match err {
        StoreError::Connection { namespace, .. } => assert_eq!(namespace, "broken"),
        other => panic!("expected connection error, got {other:?}"),
    }

    // A failed attempt does not poison the namespace: the next caller
    // triggers a fresh connection attempt.
    let _ = store.connect("broken").await.unwrap_err();
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn dedup_exact_name_returns_existing_entity() {
    let (store, _connector) = store_with_connector();

    let first = store
        .create_entity("general", new_entity("Ada Lovelace", EntityCategory::Person, "pioneer"))
        .await
        .unwrap();
    let second = store
        .create_entity("general", new_entity("  ada  LOVELACE ", EntityCategory::Person, "dup"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.get_all_entities("general").await.unwrap().len(), 1);
}

#[tokio::test]
async fn dedup_fuzzy_same_category_returns_existing_entity() {
    let (store, _connector) = store_with_connector();

    let first = store
        .create_entity("general", new_entity("Ada Lovelace", EntityCategory::Person, "pioneer"))
        .await
        .unwrap();
    // One-character typo is well above the 0.8 similarity threshold.
    let second = store
        .create_entity("general", new_entity("Ada Lovelase", EntityCategory::Person, "dup"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn same_name_different_category_is_not_a_duplicate() {
    let (store, _connector) = store_with_connector();

    let person = store
        .create_entity("general", new_entity("Mercury", EntityCategory::Person, "singer"))
        .await
        .unwrap();
    let place = store
        .create_entity("general", new_entity("Mercury", EntityCategory::Place, "planet"))
        .await
        .unwrap();

    assert_ne!(person.id, place.id);
    assert_eq!(store.get_all_entities("general").await.unwrap().len(), 2);
}

#[tokio::test]
async fn create_is_visible_to_immediate_read() {
    let (store, _connector) = store_with_connector();

    let created = store
        .create_entity("general", new_entity("Ada Lovelace", EntityCategory::Person, "pioneer"))
        .await
        .unwrap();

    let fetched = store
        .get_entity_by_id("general", &created.id)
        .await
        .unwrap();
    assert_eq!(fetched.map(|entity| entity.id), Some(created.id.clone()));

    let outcome = store.search("general", "Ada Lovelace", 5).await.unwrap();
    assert!(outcome.entities.iter().any(|entity| entity.id == created.id));
}

#[tokio::test]
async fn exact_hits_short_circuit_ranked_scan() {
    let (store, connector) = store_with_connector();

    // Two records sharing a normalized name but different categories.
    let backend = connector.backend("general").await;
    backend
        .seed(vec![
            Entity::new(new_entity("Mercury", EntityCategory::Person, "singer")),
            Entity::new(new_entity("Mercury", EntityCategory::Place, "planet")),
        ])
        .await;

    store.reset_stats();
    let outcome = store.search("general", "Mercury", 2).await.unwrap();
    assert_eq!(outcome.entities.len(), 2);
    assert_eq!(outcome.total, 2);

    let stats = store.stats();
    assert_eq!(stats.exact_hits, 1);
    assert_eq!(stats.ranked_scans, 0, "ranking must be skipped when exact hits satisfy the limit");
}

#[tokio::test]
async fn template_query_finds_entity_without_exact_match() {
    let (store, _connector) = store_with_connector();

    store
        .create_entity(
            "general",
            new_entity("Ada Lovelace", EntityCategory::Person, "wrote the first program"),
        )
        .await
        .unwrap();

    let outcome = store
        .search("general", "Who is Ada Lovelace?", 3)
        .await
        .unwrap();
    assert_eq!(outcome.entities[0].name, "Ada Lovelace");
}

#[tokio::test]
async fn ranked_scan_runs_when_cheap_stages_miss() {
    let (store, _connector) = store_with_connector();

    store
        .create_entity(
            "general",
            new_entity(
                "Analytical Engine",
                EntityCategory::Concept,
                "a mechanical general purpose computer design",
            ),
        )
        .await
        .unwrap();

    store.reset_stats();
    let outcome = store
        .search("general", "mechanical computer design", 3)
        .await
        .unwrap();

    assert_eq!(outcome.entities.len(), 1);
    assert_eq!(store.stats().ranked_scans, 1);
}

#[tokio::test]
async fn find_similar_ranks_by_description_overlap() {
    let (store, _connector) = store_with_connector();

    let base = store
        .create_entity(
            "general",
            new_entity(
                "Ada Lovelace",
                EntityCategory::Person,
                "mathematician who wrote programs for the analytical engine",
            ),
        )
        .await
        .unwrap();
    store
        .create_entity(
            "general",
            new_entity(
                "Charles Babbage",
                EntityCategory::Person,
                "designed the analytical engine",
            ),
        )
        .await
        .unwrap();
    store
        .create_entity(
            "general",
            new_entity("Mount Fuji", EntityCategory::Place, "volcano in japan"),
        )
        .await
        .unwrap();

    let similar = store
        .find_similar_entities("general", &base.id, 5)
        .await
        .unwrap();
    assert_eq!(similar[0].name, "Charles Babbage");
    assert!(!similar.iter().any(|entity| entity.id == base.id));
}

#[tokio::test]
async fn find_similar_unknown_entity_errors() {
    let (store, _connector) = store_with_connector();
    store.connect("general").await.unwrap();

    let err = store
        .find_similar_entities("general", "missing", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownEntity(_)));
}

#[tokio::test]
async fn cleanup_keeps_oldest_of_each_duplicate_group() {
    let (store, connector) = store_with_connector();

    let oldest = Entity {
        created_at: Utc::now() - Duration::hours(2),
        ..Entity::new(new_entity("Ada Lovelace", EntityCategory::Person, "original"))
    };
    let newer = Entity::new(new_entity("ada lovelace", EntityCategory::Person, "dup"));
    let unrelated = Entity::new(new_entity("Alan Turing", EntityCategory::Person, "unrelated"));

    let backend = connector.backend("general").await;
    backend
        .seed(vec![oldest.clone(), newer.clone(), unrelated])
        .await;

    let report = store.cleanup_duplicates("general").await.unwrap();
    assert_eq!(report.duplicate_groups, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.deleted, 1);

    let remaining = store.get_all_entities("general").await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|entity| entity.id == oldest.id));
    assert!(!remaining.iter().any(|entity| entity.id == newer.id));
}

#[tokio::test]
async fn graph_traversal_bounds_entities_and_depth() {
    let (store, connector) = store_with_connector();

    let backend = connector.backend("general").await;
    let entities: Vec<Entity> = (0..12)
        .map(|i| {
            Entity::new(NewEntity {
                name: format!("node {i}"),
                category: EntityCategory::Concept,
                source_query: "shared origin".to_string(),
                description: String::new(),
            })
        })
        .collect();
    backend.seed(entities).await;

    let view = store
        .traverse_graph("general", "node 0", 2, 5)
        .await
        .unwrap();
    assert!(view.entities.len() <= 5);
    assert_eq!(view.total, view.entities.len());

    let missing = store
        .traverse_graph("general", "nothing like this", 2, 5)
        .await
        .unwrap();
    assert!(missing.entities.is_empty());
    assert!(missing.relationships.is_empty());
}
