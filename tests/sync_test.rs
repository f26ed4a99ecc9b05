mod helpers;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use helpers::{seed_session, test_store};
use mnemo::config::SyncConfig;
use mnemo::error::SyncError;
use mnemo::store::types::{Role, SyncStatus, SyncType};
use mnemo::store::{RemoteSessionRecord, StorageBackend};
use mnemo::sync::local_dir::LocalDirBackend;
use mnemo::sync::{
    LastWriteWins, Resolution, SessionSync, SyncBackend, SyncManager, UploadOutcome,
};

fn sync_config() -> SyncConfig {
    SyncConfig {
        mode: "local".into(),
        max_retries: 2,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

fn manager_over(
    store: &Arc<mnemo::store::sqlite::SqliteStore>,
    backend: Arc<dyn SyncBackend>,
    config: SyncConfig,
) -> SyncManager {
    SyncManager::new(
        Arc::clone(store) as Arc<dyn StorageBackend>,
        backend,
        Box::new(LastWriteWins),
        config,
    )
}

fn replica_backend(dir: &tempfile::TempDir) -> Arc<LocalDirBackend> {
    Arc::new(LocalDirBackend::new(dir.path()).unwrap())
}

#[test]
fn upload_walks_the_state_machine_to_synced() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store();
    seed_session(&store, "s1", "First sync", &["hello from device A"]);

    let manager = manager_over(&store, replica_backend(&dir), sync_config());
    let outcome = manager.sync_session("s1").unwrap();
    assert_eq!(outcome, SessionSync::Uploaded);

    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.sync_status, SyncStatus::Synced);
    assert_eq!(session.sync_version, 2, "accepted write bumps the version");

    let log = store.sync_log(10).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].sync_type, SyncType::Upload);
}

#[test]
fn stale_upload_conflicts_with_exactly_one_conflict_log_entry() {
    let dir = tempfile::tempdir().unwrap();

    // Device B pushes version 5 into the replica first.
    let device_b = test_store();
    let mut remote = seed_session(&device_b, "s1", "From device B", &["newer elsewhere"]);
    remote.sync_version = 5;
    remote.updated_at += 1000; // B is also fresher
    device_b.update_session(&remote).unwrap();
    let backend = replica_backend(&dir);
    backend
        .upload(
            &RemoteSessionRecord {
                session: remote,
                messages: device_b.get_messages("s1", 100, 0).unwrap(),
                embedding: None,
            },
            5,
        )
        .unwrap();

    // Device A still holds version 1 and tries to upload.
    let store = test_store();
    seed_session(&store, "s1", "From device A", &["stale local copy"]);
    let manager = manager_over(&store, backend, sync_config());

    let outcome = manager.sync_session("s1").unwrap();
    assert_eq!(outcome, SessionSync::ConflictResolved(Resolution::KeepRemote));

    let conflicts: Vec<_> = store
        .sync_log(50)
        .unwrap()
        .into_iter()
        .filter(|e| e.sync_type == SyncType::Conflict)
        .collect();
    assert_eq!(conflicts.len(), 1, "exactly one conflict entry per attempt");
    assert_eq!(conflicts[0].session_id.as_deref(), Some("s1"));

    // Last-write-wins applied the remote copy locally.
    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.title, "From device B");
    assert_eq!(session.sync_status, SyncStatus::Synced);
}

#[test]
fn conflict_keeps_local_when_local_is_fresher() {
    let dir = tempfile::tempdir().unwrap();
    let backend = replica_backend(&dir);

    // Replica holds an *older* version-6 copy.
    let mut old_remote = mnemo::store::types::Session::new("s1", "Old remote", None);
    old_remote.sync_version = 6;
    old_remote.updated_at = 1000;
    backend
        .upload(
            &RemoteSessionRecord {
                session: old_remote,
                messages: vec![],
                embedding: None,
            },
            6,
        )
        .unwrap();

    // Local is version 1 (stale version number) but much fresher content.
    let store = test_store();
    seed_session(&store, "s1", "Fresh local work", &["latest thinking"]);

    let manager = manager_over(&store, Arc::clone(&backend) as Arc<dyn SyncBackend>, sync_config());
    let outcome = manager.sync_session("s1").unwrap();
    assert_eq!(outcome, SessionSync::ConflictResolved(Resolution::KeepLocal));

    // The local copy was force-pushed and rebased past the remote version.
    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.sync_status, SyncStatus::Synced);
    assert!(session.sync_version > 6);

    let downloaded = backend.download_since(0).unwrap();
    assert_eq!(downloaded.len(), 1);
    assert_eq!(downloaded[0].session.title, "Fresh local work");
}

#[test]
fn interrupted_download_batch_leaves_local_state_untouched() {
    let store = test_store();
    seed_session(&store, "keep", "Existing local", &["untouched"]);

    // A batch where the third record is poisoned (wrong embedding width)
    // must apply none of its records.
    let mut batch = Vec::new();
    for i in 0..3 {
        let mut session = mnemo::store::types::Session::new(
            format!("r{i}"),
            format!("Remote {i}"),
            None,
        );
        session.sync_version = 2;
        batch.push(RemoteSessionRecord {
            session,
            messages: vec![],
            embedding: if i == 2 {
                Some(vec![0.1; helpers::DIM + 1])
            } else {
                Some(vec![0.1; helpers::DIM])
            },
        });
    }

    let err = store.apply_remote_sessions(&batch).unwrap_err();
    assert!(matches!(err, mnemo::error::MemoryError::DimensionMismatch { .. }));

    for i in 0..3 {
        assert!(
            store.get_session(&format!("r{i}")).unwrap().is_none(),
            "record {i} must not have landed"
        );
    }
    assert!(store.get_session("keep").unwrap().is_some());
}

#[test]
fn download_skips_sessions_we_already_have_at_same_or_newer_version() {
    let dir = tempfile::tempdir().unwrap();
    let backend = replica_backend(&dir);

    let store = test_store();
    seed_session(&store, "s1", "Local copy", &["local messages"]);
    store.set_sync_version("s1", 3).unwrap();

    // Replica holds version 2 — older than ours.
    let mut stale = mnemo::store::types::Session::new("s1", "Stale remote", None);
    stale.sync_version = 2;
    backend
        .upload(
            &RemoteSessionRecord {
                session: stale,
                messages: vec![],
                embedding: None,
            },
            1,
        )
        .unwrap();

    let manager = manager_over(&store, backend, sync_config());
    let applied = manager.download(0).unwrap();
    assert_eq!(applied, 0);

    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.title, "Local copy");
}

#[test]
fn transient_failures_retry_then_mark_error() {
    struct FlakyBackend {
        attempts: AtomicU32,
    }
    impl SyncBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn upload(
            &self,
            _record: &RemoteSessionRecord,
            _base_version: u64,
        ) -> Result<UploadOutcome, SyncError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Transient("replica unreachable".into()))
        }
        fn download_since(&self, _since: i64) -> Result<Vec<RemoteSessionRecord>, SyncError> {
            Err(SyncError::Transient("replica unreachable".into()))
        }
    }

    let store = test_store();
    seed_session(&store, "s1", "Doomed upload", &["will not make it"]);

    let backend = Arc::new(FlakyBackend {
        attempts: AtomicU32::new(0),
    });
    let manager = manager_over(
        &store,
        Arc::clone(&backend) as Arc<dyn SyncBackend>,
        sync_config(),
    );

    let outcome = manager.sync_session("s1").unwrap();
    assert!(matches!(outcome, SessionSync::Failed(_)));
    // Initial attempt plus max_retries = 2 retries
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);

    let session = store.get_session("s1").unwrap().unwrap();
    assert_eq!(session.sync_status, SyncStatus::Error);

    let log = store.sync_log(10).unwrap();
    assert_eq!(log.len(), 1, "exactly one log entry per attempt");
    assert_eq!(log[0].sync_type, SyncType::Upload);
    assert!(log[0].error_message.as_deref().unwrap().contains("unreachable"));
}

#[test]
fn excluded_work_dirs_never_sync() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store();

    let session = mnemo::store::types::Session::new(
        "s1",
        "Secret project",
        Some("/home/dev/secret/project".into()),
    );
    store.create_session(&session).unwrap();
    store.add_message("s1", Role::User, "confidential", 2).unwrap();

    let config = SyncConfig {
        exclude_paths: vec!["/home/dev/secret".into()],
        ..sync_config()
    };
    let backend = replica_backend(&dir);
    let manager = manager_over(&store, Arc::clone(&backend) as Arc<dyn SyncBackend>, config);

    assert_eq!(manager.sync_session("s1").unwrap(), SessionSync::Excluded);
    assert!(backend.download_since(0).unwrap().is_empty());
    // Status untouched — nothing was attempted.
    assert_eq!(
        store.get_session("s1").unwrap().unwrap().sync_status,
        SyncStatus::Local
    );
}

#[test]
fn sync_all_sweeps_only_dirty_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store();
    seed_session(&store, "a", "Dirty one", &["x"]);
    seed_session(&store, "b", "Dirty two", &["y"]);

    let manager = manager_over(&store, replica_backend(&dir), sync_config());

    let report = manager.sync_all(false).unwrap();
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 0);

    // Second sweep: everything already synced
    let report = manager.sync_all(false).unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped, 2);

    // Force re-uploads regardless
    let report = manager.sync_all(true).unwrap();
    assert_eq!(report.uploaded, 2);
}

#[test]
fn round_trip_between_two_devices_through_one_replica() {
    let dir = tempfile::tempdir().unwrap();

    // Device A creates and uploads.
    let device_a = test_store();
    seed_session(&device_a, "s1", "Shared session", &["written on A"]);
    let manager_a = manager_over(&device_a, replica_backend(&dir), sync_config());
    assert_eq!(manager_a.sync_session("s1").unwrap(), SessionSync::Uploaded);

    // Device B downloads.
    let device_b = test_store();
    let manager_b = manager_over(&device_b, replica_backend(&dir), sync_config());
    assert_eq!(manager_b.download(0).unwrap(), 1);

    let session = device_b.get_session("s1").unwrap().unwrap();
    assert_eq!(session.title, "Shared session");
    assert_eq!(session.sync_status, SyncStatus::Synced);
    let messages = device_b.get_messages("s1", 100, 0).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "written on A");
}
