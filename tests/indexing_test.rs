mod helpers;

use std::sync::Arc;

use helpers::{seed_session, test_provider, test_store};
use mnemo::config::IndexConfig;
use mnemo::embedding::EmbeddingProvider;
use mnemo::error::EmbedError;
use mnemo::index::{IndexManager, IndexOutcome};
use mnemo::store::types::Role;
use mnemo::store::StorageBackend;

fn manager(store: &Arc<mnemo::store::sqlite::SqliteStore>) -> IndexManager {
    IndexManager::new(
        Arc::clone(store) as Arc<dyn StorageBackend>,
        Some(test_provider()),
        IndexConfig::default(),
        vec![],
    )
}

#[test]
fn double_indexing_unchanged_content_is_observably_identical() {
    let store = test_store();
    seed_session(
        &store,
        "s1",
        "Prometheus scrape intervals",
        &["metrics arrive late", "scrape config confusing"],
    );
    let mgr = manager(&store);

    assert_eq!(mgr.maybe_index("s1", true).unwrap(), IndexOutcome::Indexed);
    let first_session = store.get_session("s1").unwrap().unwrap();
    let first_vector = store.get_embedding("s1").unwrap().unwrap();

    assert_eq!(mgr.maybe_index("s1", true).unwrap(), IndexOutcome::Indexed);
    let second_session = store.get_session("s1").unwrap().unwrap();
    let second_vector = store.get_embedding("s1").unwrap().unwrap();

    assert_eq!(first_session.keywords, second_session.keywords);
    assert_eq!(first_session.summary, second_session.summary);
    assert_eq!(first_vector, second_vector);
    // Exactly one lexical row and one vector row survive
    assert_eq!(store.stats().unwrap().indexed_vectors, 1);
    assert_eq!(store.search_keywords("prometheus", 10).unwrap().len(), 1);
}

#[test]
fn message_threshold_triggers_reindex() {
    let store = test_store();
    seed_session(&store, "s1", "Threshold check", &["one"]);
    let mgr = manager(&store);

    mgr.maybe_index("s1", true).unwrap();
    let indexed_at_first = store.get_session("s1").unwrap().unwrap().indexed_message_count;
    assert_eq!(indexed_at_first, 1);

    // Below threshold: nothing happens
    for i in 0..3 {
        store
            .add_message("s1", Role::User, &format!("extra {i}"), 1)
            .unwrap();
    }
    assert_eq!(mgr.maybe_index("s1", false).unwrap(), IndexOutcome::Skipped);

    // Crossing the default threshold of 5 new messages fires the pipeline
    for i in 3..5 {
        store
            .add_message("s1", Role::User, &format!("extra {i}"), 1)
            .unwrap();
    }
    assert_eq!(mgr.maybe_index("s1", false).unwrap(), IndexOutcome::Indexed);
    assert_eq!(
        store.get_session("s1").unwrap().unwrap().indexed_message_count,
        6
    );
}

#[test]
fn never_indexed_session_fires_on_first_message() {
    let store = test_store();
    seed_session(&store, "s1", "Fresh", &["only one message"]);
    let mgr = manager(&store);

    assert_eq!(mgr.maybe_index("s1", false).unwrap(), IndexOutcome::Indexed);
}

#[test]
fn empty_session_is_never_indexed() {
    let store = test_store();
    seed_session(&store, "s1", "Nothing here", &[]);
    let mgr = manager(&store);

    assert_eq!(mgr.maybe_index("s1", false).unwrap(), IndexOutcome::Skipped);
    assert_eq!(mgr.maybe_index("s1", true).unwrap(), IndexOutcome::Skipped);
}

#[test]
fn failing_provider_leaves_lexical_projection_and_clean_session() {
    struct AlwaysDown;
    impl EmbeddingProvider for AlwaysDown {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::ProviderUnavailable("socket closed".into()))
        }
        fn dimensions(&self) -> usize {
            helpers::DIM
        }
        fn model_id(&self) -> &str {
            "always-down"
        }
    }

    let store = test_store();
    seed_session(&store, "s1", "Degraded indexing", &["important content"]);
    let mgr = IndexManager::new(
        Arc::clone(&store) as Arc<dyn StorageBackend>,
        Some(Arc::new(AlwaysDown)),
        IndexConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..Default::default()
        },
        vec![],
    );

    assert_eq!(
        mgr.maybe_index("s1", true).unwrap(),
        IndexOutcome::LexicalOnly
    );

    let session = store.get_session("s1").unwrap().unwrap();
    assert!(session.summary.is_some());
    assert!(!session.keywords.is_empty());
    assert_eq!(session.token_count, 4, "non-vector fields stay untouched");
    assert!(store.get_embedding("s1").unwrap().is_none());
    // Lexical search already works in the degraded state
    assert!(!store.search_keywords("degraded", 10).unwrap().is_empty());
}

#[test]
fn sensitive_keywords_are_excluded_from_the_index() {
    let store = test_store();
    seed_session(
        &store,
        "s1",
        "Credential rotation",
        &["the db_secret value leaked into logs"],
    );
    let mgr = IndexManager::new(
        Arc::clone(&store) as Arc<dyn StorageBackend>,
        Some(test_provider()),
        IndexConfig::default(),
        vec!["db_secret".to_string()],
    );

    mgr.maybe_index("s1", true).unwrap();

    let session = store.get_session("s1").unwrap().unwrap();
    assert!(!session.keywords.iter().any(|k| k == "db_secret"));
    assert!(store.search_keywords("db_secret", 10).unwrap().is_empty());
    // Non-sensitive terms still indexed
    assert!(!store.search_keywords("leaked", 10).unwrap().is_empty());
}
