//! Directory replica backend.
//!
//! Stores one JSON file per session under `<replica>/sessions/`. Pointing the
//! replica directory at a synced folder (Dropbox, Syncthing, a network mount)
//! gives cross-device sync without any server. Writes are atomic
//! (tmp + rename) so a concurrent reader never observes a torn file.

use std::fs;
use std::path::PathBuf;

use crate::error::SyncError;
use crate::store::types::SyncStatus;
use crate::store::RemoteSessionRecord;
use crate::sync::{SyncBackend, UploadOutcome};

pub struct LocalDirBackend {
    sessions_dir: PathBuf,
}

impl LocalDirBackend {
    pub fn new(replica_dir: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let sessions_dir = replica_dir.into().join("sessions");
        fs::create_dir_all(&sessions_dir)
            .map_err(|e| SyncError::Transient(format!("cannot create replica dir: {e}")))?;
        Ok(Self { sessions_dir })
    }

    fn session_path(&self, id: &str) -> PathBuf {
        // Session ids are UUIDs in practice, but never trust them as paths.
        let safe: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.sessions_dir.join(format!("{safe}.json"))
    }

    fn read_record(&self, path: &PathBuf) -> Result<Option<RemoteSessionRecord>, SyncError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::Transient(format!("replica read failed: {e}"))),
        };
        let record = serde_json::from_str(&contents)
            .map_err(|e| SyncError::Fatal(format!("malformed replica file {path:?}: {e}")))?;
        Ok(Some(record))
    }
}

impl SyncBackend for LocalDirBackend {
    fn name(&self) -> &'static str {
        "local-dir"
    }

    fn upload(
        &self,
        record: &RemoteSessionRecord,
        base_version: u64,
    ) -> Result<UploadOutcome, SyncError> {
        let path = self.session_path(&record.session.id);

        if let Some(existing) = self.read_record(&path)? {
            if existing.session.sync_version > base_version {
                return Ok(UploadOutcome::Conflict { remote: existing });
            }
        }

        let new_version = base_version + 1;
        let mut stored = record.clone();
        stored.session.sync_version = new_version;
        stored.session.sync_status = SyncStatus::Synced;

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| SyncError::Fatal(format!("cannot serialize session: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| SyncError::Transient(format!("replica write failed: {e}")))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| SyncError::Transient(format!("replica rename failed: {e}")))?;

        Ok(UploadOutcome::Accepted { new_version })
    }

    fn download_since(&self, since: i64) -> Result<Vec<RemoteSessionRecord>, SyncError> {
        let entries = fs::read_dir(&self.sessions_dir)
            .map_err(|e| SyncError::Transient(format!("replica list failed: {e}")))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| SyncError::Transient(format!("replica list failed: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = self.read_record(&path)? {
                if record.session.updated_at >= since {
                    records.push(record);
                }
            }
        }
        // Stable order keeps download batches reproducible.
        records.sort_by(|a, b| a.session.id.cmp(&b.session.id));
        Ok(records)
    }
}
