mod helpers;

use helpers::{seed_session, spike_embedding, test_store};
use mnemo::error::MemoryError;
use mnemo::store::types::{Role, Session, SyncStatus};
use mnemo::store::StorageBackend;

#[test]
fn session_ids_are_never_reused_while_live() {
    let store = test_store();
    seed_session(&store, "s1", "Original", &[]);

    let err = store
        .create_session(&Session::new("s1", "Impostor", None))
        .unwrap_err();
    assert!(matches!(err, MemoryError::DuplicateId(_)));
}

#[test]
fn messages_require_an_existing_session() {
    let store = test_store();
    let err = store
        .add_message("nope", Role::User, "hello?", 2)
        .unwrap_err();
    assert!(matches!(err, MemoryError::UnknownSession(_)));
}

#[test]
fn ingestion_updates_owner_atomically() {
    let store = test_store();
    let before = seed_session(&store, "s1", "Counter check", &[]);

    store.add_message("s1", Role::User, "first turn", 11).unwrap();
    store.add_message("s1", Role::Assistant, "second turn", 22).unwrap();

    let after = store.get_session("s1").unwrap().unwrap();
    assert_eq!(after.token_count, 33);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(store.message_count("s1").unwrap(), 2);
}

#[test]
fn delete_cascades_messages_lexical_and_vector_entries() {
    let store = test_store();
    seed_session(&store, "s1", "Kafka rebalancing woes", &["partitions keep moving"]);
    store.update_embedding("s1", &spike_embedding(1)).unwrap();

    // Sanity: projections exist before the delete
    assert!(store.get_embedding("s1").unwrap().is_some());
    assert!(!store.search_keywords("kafka", 10).unwrap().is_empty());

    store.delete_session("s1").unwrap();

    assert!(store.get_session("s1").unwrap().is_none());
    assert_eq!(store.message_count("s1").unwrap(), 0);
    assert!(store.get_embedding("s1").unwrap().is_none());
    assert!(store.search_keywords("kafka", 10).unwrap().is_empty());
    assert!(store.search_vector(&spike_embedding(1), 10).unwrap().is_empty());
}

#[test]
fn delete_unknown_session_is_an_error() {
    let store = test_store();
    let err = store.delete_session("ghost").unwrap_err();
    assert!(matches!(err, MemoryError::UnknownSession(_)));
}

#[test]
fn archive_flag_round_trips_and_filters_listing() {
    let store = test_store();
    seed_session(&store, "s1", "Active work", &[]);
    seed_session(&store, "s2", "Finished work", &[]);

    store.archive_session("s2", true).unwrap();

    let active = store.list_sessions(10, 0, Some(false)).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "s1");

    let archived = store.list_sessions(10, 0, Some(true)).unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, "s2");

    store.archive_session("s2", false).unwrap();
    assert_eq!(store.list_sessions(10, 0, Some(false)).unwrap().len(), 2);
}

#[test]
fn messages_are_immutable_history_in_order() {
    let store = test_store();
    seed_session(&store, "s1", "Ordering", &[]);

    for i in 0..6 {
        store
            .add_message("s1", Role::User, &format!("turn {i}"), 1)
            .unwrap();
    }

    let all = store.get_messages("s1", 100, 0).unwrap();
    assert_eq!(all.len(), 6);
    let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4", "turn 5"]);

    let recent = store.recent_messages("s1", 2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].content, "turn 4");
    assert_eq!(recent[1].content, "turn 5");
}

#[test]
fn local_write_resets_synced_status() {
    let store = test_store();
    seed_session(&store, "s1", "Sync state machine", &[]);

    store.set_sync_status("s1", SyncStatus::Synced).unwrap();
    store.add_message("s1", Role::User, "post-sync edit", 3).unwrap();

    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.sync_status, SyncStatus::Local);
}
