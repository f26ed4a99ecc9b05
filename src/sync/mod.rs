//! Replica synchronization under optimistic versioning.
//!
//! The [`SyncManager`] reconciles local storage with a remote replica through
//! a [`SyncBackend`]. Uploads carry the sender's prior known `sync_version`;
//! the replica accepts iff its stored version is not newer, otherwise the
//! upload comes back as a conflict and a pluggable [`ConflictPolicy`] decides
//! which side wins. Every attempt — success, failure, or conflict — appends
//! exactly one entry to the sync log. Downloads apply as a single transaction
//! so a crash mid-batch cannot leave partially-updated local state.
//!
//! State machine per session: `local → syncing → synced`, `error` from a
//! failed step, and back to `local` when a later local write dirties the row.

pub mod local_dir;
pub mod remote_http;

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::error::{MemoryError, SyncError};
use crate::locks::SessionLocks;
use crate::store::types::{Session, SyncOutcome, SyncStatus, SyncType};
use crate::store::{RemoteSessionRecord, StorageBackend};

/// Create a sync backend from config, or `None` when sync is disabled.
pub fn create_backend(config: &SyncConfig) -> anyhow::Result<Option<Arc<dyn SyncBackend>>> {
    match config.mode.as_str() {
        "disabled" => Ok(None),
        "local" => {
            let dir = config
                .replica_dir
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("local sync mode requires sync.replica_dir"))?;
            let backend = local_dir::LocalDirBackend::new(crate::config::expand_tilde(dir))?;
            Ok(Some(Arc::new(backend)))
        }
        "remote" | "saas" => {
            let backend = remote_http::RemoteHttpBackend::new(config)?;
            Ok(Some(Arc::new(backend)))
        }
        other => anyhow::bail!("unknown sync mode: {other}. Supported: disabled, local, remote, saas"),
    }
}

/// Replica transport contract. Implementations decide where sessions live
/// (a directory in a synced folder, an HTTP service); the manager owns the
/// versioning protocol, retries, and logging.
pub trait SyncBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Push one session. `base_version` is the sender's prior known version;
    /// the replica must reject with [`UploadOutcome::Conflict`] if it stores a
    /// newer version. On acceptance the replica stores `base_version + 1`.
    fn upload(
        &self,
        record: &RemoteSessionRecord,
        base_version: u64,
    ) -> Result<UploadOutcome, SyncError>;

    /// All sessions the replica holds that changed at or after `since`.
    fn download_since(&self, since: i64) -> Result<Vec<RemoteSessionRecord>, SyncError>;
}

/// Result of one upload attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    Accepted { new_version: u64 },
    /// The replica holds a newer version; its copy rides along for resolution.
    Conflict { remote: RemoteSessionRecord },
}

/// Which side a conflict resolution keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
}

/// Pluggable conflict arbitration.
pub trait ConflictPolicy: Send + Sync {
    fn resolve(&self, local: &Session, remote: &Session) -> Resolution;
}

/// Default policy: the session with the later `updated_at` wins; ties keep
/// local. Can silently discard concurrent edits — a documented policy choice,
/// not a correctness guarantee.
pub struct LastWriteWins;

impl ConflictPolicy for LastWriteWins {
    fn resolve(&self, local: &Session, remote: &Session) -> Resolution {
        if remote.updated_at > local.updated_at {
            Resolution::KeepRemote
        } else {
            Resolution::KeepLocal
        }
    }
}

/// Outcome of syncing one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSync {
    Uploaded,
    ConflictResolved(Resolution),
    /// work_dir matched a configured exclusion prefix.
    Excluded,
    /// Another sync task already holds this session.
    InFlight,
    /// Retries exhausted; the session is marked `error`.
    Failed(String),
}

/// Aggregate counters from a sync sweep.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub uploaded: u64,
    pub conflicts: u64,
    pub failed: u64,
    pub skipped: u64,
}

pub struct SyncManager {
    store: Arc<dyn StorageBackend>,
    backend: Arc<dyn SyncBackend>,
    policy: Box<dyn ConflictPolicy>,
    config: SyncConfig,
    locks: Arc<SessionLocks>,
}

impl SyncManager {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        backend: Arc<dyn SyncBackend>,
        policy: Box<dyn ConflictPolicy>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            backend,
            policy,
            config,
            locks: SessionLocks::new(),
        }
    }

    /// Sync one session end to end. Never panics the caller: transport
    /// failures come back as [`SessionSync::Failed`] after the session is
    /// marked `error`.
    pub fn sync_session(&self, session_id: &str) -> Result<SessionSync, MemoryError> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Err(MemoryError::UnknownSession(session_id.to_string()));
        };

        if self.is_excluded(&session) {
            tracing::debug!(session = %session.id, "work_dir excluded from sync");
            return Ok(SessionSync::Excluded);
        }

        // At most one upload per session at a time.
        let Some(_guard) = self.locks.try_acquire(session_id) else {
            return Ok(SessionSync::InFlight);
        };

        self.store.set_sync_status(session_id, SyncStatus::Syncing)?;

        let messages = self.store.get_messages(session_id, 10_000, 0)?;
        let record = RemoteSessionRecord {
            embedding: self.store.get_embedding(session_id)?,
            messages,
            session: session.clone(),
        };

        let base_version = session.sync_version;
        match self.upload_with_retry(&record, base_version) {
            Ok(UploadOutcome::Accepted { new_version }) => {
                self.store.set_sync_version(session_id, new_version)?;
                self.store.set_sync_status(session_id, SyncStatus::Synced)?;
                self.store
                    .append_sync_log(SyncType::Upload, Some(session_id), SyncOutcome::Success, None)?;
                tracing::debug!(session = %session_id, version = new_version, "session uploaded");
                Ok(SessionSync::Uploaded)
            }
            Ok(UploadOutcome::Conflict { remote }) => {
                let resolution = self.resolve_conflict(&session, remote)?;
                Ok(SessionSync::ConflictResolved(resolution))
            }
            Err(e) => {
                self.store.set_sync_status(session_id, SyncStatus::Error)?;
                self.store.append_sync_log(
                    SyncType::Upload,
                    Some(session_id),
                    SyncOutcome::Failed,
                    Some(&e.to_string()),
                )?;
                tracing::warn!(session = %session_id, error = %e, "sync failed after retries");
                Ok(SessionSync::Failed(e.to_string()))
            }
        }
    }

    /// Arbitrate a version conflict. Both versions land in the audit log
    /// before either side is discarded.
    fn resolve_conflict(
        &self,
        local: &Session,
        remote: RemoteSessionRecord,
    ) -> Result<Resolution, MemoryError> {
        let resolution = self.policy.resolve(local, &remote.session);
        let detail = format!(
            "local v{} updated_at {} vs remote v{} updated_at {}: {}",
            local.sync_version,
            local.updated_at,
            remote.session.sync_version,
            remote.session.updated_at,
            match resolution {
                Resolution::KeepLocal => "kept local",
                Resolution::KeepRemote => "kept remote",
            }
        );
        self.store.append_sync_log(
            SyncType::Conflict,
            Some(&local.id),
            SyncOutcome::Failed,
            Some(&detail),
        )?;
        tracing::info!(session = %local.id, %detail, "sync conflict resolved");

        match resolution {
            Resolution::KeepRemote => {
                // The whole record applies transactionally and lands `synced`.
                self.store.apply_remote_sessions(&[remote])?;
            }
            Resolution::KeepLocal => {
                // Force the local copy through by re-basing on the remote's
                // version, so the replica's monotone check accepts it.
                let messages = self.store.get_messages(&local.id, 10_000, 0)?;
                let record = RemoteSessionRecord {
                    embedding: self.store.get_embedding(&local.id)?,
                    messages,
                    session: local.clone(),
                };
                let rebase = remote.session.sync_version;
                match self.upload_with_retry(&record, rebase) {
                    Ok(UploadOutcome::Accepted { new_version }) => {
                        self.store.set_sync_version(&local.id, new_version)?;
                        self.store.set_sync_status(&local.id, SyncStatus::Synced)?;
                    }
                    Ok(UploadOutcome::Conflict { .. }) => {
                        // The replica advanced again mid-resolution; give up
                        // this round, a later sweep will retry.
                        self.store.set_sync_status(&local.id, SyncStatus::Error)?;
                    }
                    Err(e) => {
                        tracing::warn!(session = %local.id, error = %e, "conflict resolution upload failed");
                        self.store.set_sync_status(&local.id, SyncStatus::Error)?;
                    }
                }
            }
        }
        Ok(resolution)
    }

    /// Upload every session that is not already synced; `force` re-uploads
    /// everything.
    pub fn sync_all(&self, force: bool) -> Result<SyncReport, MemoryError> {
        let sessions = self.store.list_sessions(10_000, 0, None)?;
        let mut report = SyncReport::default();
        for session in sessions {
            if !force && session.sync_status == SyncStatus::Synced {
                report.skipped += 1;
                continue;
            }
            match self.sync_session(&session.id)? {
                SessionSync::Uploaded => report.uploaded += 1,
                SessionSync::ConflictResolved(_) => report.conflicts += 1,
                SessionSync::Failed(_) => report.failed += 1,
                SessionSync::Excluded | SessionSync::InFlight => report.skipped += 1,
            }
        }
        Ok(report)
    }

    /// Pull all remote sessions updated since `since` and apply them as one
    /// transaction. Sessions we already hold at the same or newer version are
    /// skipped, as are excluded paths.
    pub fn download(&self, since: i64) -> Result<u64, MemoryError> {
        let records = match self.download_with_retry(since) {
            Ok(records) => records,
            Err(e) => {
                self.store.append_sync_log(
                    SyncType::Download,
                    None,
                    SyncOutcome::Failed,
                    Some(&e.to_string()),
                )?;
                return Err(e.into());
            }
        };

        let mut batch = Vec::new();
        for record in records {
            if self.is_excluded(&record.session) {
                continue;
            }
            if let Some(local) = self.store.get_session(&record.session.id)? {
                if local.sync_version >= record.session.sync_version {
                    continue;
                }
            }
            batch.push(record);
        }

        let applied = batch.len() as u64;
        if let Err(e) = self.store.apply_remote_sessions(&batch) {
            self.store.append_sync_log(
                SyncType::Download,
                None,
                SyncOutcome::Failed,
                Some(&e.to_string()),
            )?;
            return Err(e);
        }
        self.store
            .append_sync_log(SyncType::Download, None, SyncOutcome::Success, None)?;
        tracing::debug!(applied, "download batch applied");
        Ok(applied)
    }

    fn is_excluded(&self, session: &Session) -> bool {
        let Some(work_dir) = session.work_dir.as_deref() else {
            return false;
        };
        self.config
            .exclude_paths
            .iter()
            .any(|prefix| work_dir.starts_with(prefix.as_str()))
    }

    fn upload_with_retry(
        &self,
        record: &RemoteSessionRecord,
        base_version: u64,
    ) -> Result<UploadOutcome, SyncError> {
        self.with_retry(|| self.backend.upload(record, base_version))
    }

    fn download_with_retry(&self, since: i64) -> Result<Vec<RemoteSessionRecord>, SyncError> {
        self.with_retry(|| self.backend.download_since(since))
    }

    fn with_retry<T>(
        &self,
        mut call: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff_ms << attempt;
                    tracing::debug!(attempt, delay_ms = delay, error = %e, "retrying sync call");
                    std::thread::sleep(std::time::Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(updated_at: i64) -> Session {
        let mut s = Session::new("s1", "Chat", None);
        s.updated_at = updated_at;
        s
    }

    #[test]
    fn last_write_wins_prefers_newer_side() {
        let policy = LastWriteWins;
        assert_eq!(
            policy.resolve(&session(100), &session(200)),
            Resolution::KeepRemote
        );
        assert_eq!(
            policy.resolve(&session(200), &session(100)),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn last_write_wins_tie_keeps_local() {
        let policy = LastWriteWins;
        assert_eq!(
            policy.resolve(&session(100), &session(100)),
            Resolution::KeepLocal
        );
    }
}
