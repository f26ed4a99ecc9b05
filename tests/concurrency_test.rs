mod helpers;

use std::sync::Arc;
use std::thread;

use helpers::{seed_session, test_provider, test_store};
use mnemo::config::{IndexConfig, RecallConfig};
use mnemo::index::IndexManager;
use mnemo::recall::{RecallEngine, RecallQuery};
use mnemo::store::types::Role;
use mnemo::store::StorageBackend;

#[test]
fn cross_session_writes_proceed_concurrently() {
    let store = test_store();
    for i in 0..4 {
        seed_session(&store, &format!("s{i}"), &format!("Session {i}"), &[]);
    }

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let id = format!("s{i}");
            for turn in 0..25 {
                store
                    .add_message(&id, Role::User, &format!("turn {turn}"), 1)
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        assert_eq!(store.message_count(&format!("s{i}")).unwrap(), 25);
        assert_eq!(
            store.get_session(&format!("s{i}")).unwrap().unwrap().token_count,
            25
        );
    }
}

#[test]
fn recall_runs_while_other_sessions_are_being_indexed() {
    let store = test_store();
    seed_session(&store, "indexed", "Stable indexed session", &["already searchable"]);

    let manager = Arc::new(IndexManager::new(
        Arc::clone(&store) as Arc<dyn StorageBackend>,
        Some(test_provider()),
        IndexConfig::default(),
        vec![],
    ));
    manager.maybe_index("indexed", true).unwrap();

    // Indexing churns on other sessions while recall queries run.
    for i in 0..8 {
        seed_session(&store, &format!("churn{i}"), "Churning session", &["busy busy"]);
    }

    let index_store = Arc::clone(&manager);
    let indexer = thread::spawn(move || {
        index_store.batch_index(100).unwrap();
    });

    let engine = RecallEngine::new(
        Arc::clone(&store) as Arc<dyn StorageBackend>,
        Some(test_provider()),
        RecallConfig {
            min_score: 0.0,
            ..Default::default()
        },
    );
    for _ in 0..20 {
        let results = engine
            .recall(&RecallQuery {
                text: Some("stable indexed".into()),
                ..Default::default()
            })
            .unwrap();
        // The fully committed session is always observable.
        assert!(results.iter().any(|r| r.session.id == "indexed"));
    }

    indexer.join().unwrap();
}

#[test]
fn duplicate_index_runs_on_one_session_do_not_double_write() {
    let store = test_store();
    seed_session(
        &store,
        "s1",
        "Contended session",
        &["one", "two", "three", "four", "five"],
    );

    let manager = Arc::new(IndexManager::new(
        Arc::clone(&store) as Arc<dyn StorageBackend>,
        Some(test_provider()),
        IndexConfig::default(),
        vec![],
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        handles.push(thread::spawn(move || manager.maybe_index("s1", true).unwrap()));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // However the races resolved, the projections hold exactly one row each.
    assert_eq!(store.stats().unwrap().indexed_vectors, 1);
    assert_eq!(store.search_keywords("contended", 10).unwrap().len(), 1);
}
