//! Durable storage for sessions, messages, and their search projections.
//!
//! [`StorageBackend`] is the single source of truth contract; [`sqlite`]
//! provides the embedded implementation (rusqlite + FTS5 + sqlite-vec).
//! Concrete backends are selected at configuration time, not via inheritance.

pub mod sqlite;
pub mod types;

use crate::error::MemoryError;
use types::{
    Message, Role, SearchQuery, Session, SessionHit, StoreStats, SyncLogEntry, SyncOutcome,
    SyncType,
};

/// Contract for a durable session store.
///
/// Implementations must keep the lexical and vector projections in lock-step
/// with session rows: no write is acknowledged until both are committed, and a
/// session delete removes its messages and both projections atomically.
pub trait StorageBackend: Send + Sync {
    /// Create a new session. Fails with [`MemoryError::DuplicateId`] if the id
    /// already exists.
    fn create_session(&self, session: &Session) -> Result<(), MemoryError>;

    fn get_session(&self, id: &str) -> Result<Option<Session>, MemoryError>;

    /// Persist a session's mutable fields (title, summary, keywords, counters,
    /// sync state). `updated_at` is written as given by the caller.
    fn update_session(&self, session: &Session) -> Result<(), MemoryError>;

    fn list_sessions(
        &self,
        limit: usize,
        offset: usize,
        archived: Option<bool>,
    ) -> Result<Vec<Session>, MemoryError>;

    fn archive_session(&self, id: &str, archived: bool) -> Result<(), MemoryError>;

    /// Delete a session, its messages, its lexical entry, and its vector entry
    /// as one atomic unit.
    fn delete_session(&self, id: &str) -> Result<(), MemoryError>;

    /// Append a message. Fails with [`MemoryError::UnknownSession`] if the
    /// session is absent; updates the owning session's token_count and
    /// updated_at atomically with the insert. Returns the stored message with
    /// its assigned id and derived code flags.
    fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        token_count: u64,
    ) -> Result<Message, MemoryError>;

    fn get_messages(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, MemoryError>;

    /// Most recent `n` messages in chronological order.
    fn recent_messages(&self, session_id: &str, n: usize) -> Result<Vec<Message>, MemoryError>;

    /// Number of messages stored for a session.
    fn message_count(&self, session_id: &str) -> Result<u64, MemoryError>;

    /// Upsert the session's single vector entry. Fails with
    /// [`MemoryError::DimensionMismatch`] if the vector length disagrees with
    /// the configured model dimension.
    fn update_embedding(&self, session_id: &str, embedding: &[f32]) -> Result<(), MemoryError>;

    /// The session's stored embedding, if it has been indexed.
    fn get_embedding(&self, session_id: &str) -> Result<Option<Vec<f32>>, MemoryError>;

    /// Lexical search over title/summary/keywords. Returns (session_id, score)
    /// with BM25 ranks mapped onto 0–1.
    fn search_keywords(&self, query: &str, top_k: usize) -> Result<Vec<(String, f64)>, MemoryError>;

    /// Vector KNN search. Returns (session_id, score) with cosine distances
    /// mapped onto 0–1.
    fn search_vector(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(String, f64)>, MemoryError>;

    /// Union of both search families with per-session sub-scores. Fails with
    /// [`MemoryError::InvalidQuery`] if the query has neither text nor vector.
    fn search_hybrid(&self, query: &SearchQuery) -> Result<Vec<SessionHit>, MemoryError>;

    /// Record a completed index run: summary/keywords are taken from the
    /// session argument, and the index watermark fields are advanced.
    fn mark_indexed(&self, session: &Session) -> Result<(), MemoryError>;

    fn set_sync_status(&self, id: &str, status: types::SyncStatus) -> Result<(), MemoryError>;

    /// Set the session's optimistic-lock version after an accepted sync write.
    /// The new version must be strictly greater than the stored one.
    fn set_sync_version(&self, id: &str, version: u64) -> Result<(), MemoryError>;

    /// Append one immutable audit record. Returns the stored entry.
    fn append_sync_log(
        &self,
        sync_type: SyncType,
        session_id: Option<&str>,
        status: SyncOutcome,
        error_message: Option<&str>,
    ) -> Result<SyncLogEntry, MemoryError>;

    fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>, MemoryError>;

    /// Apply a downloaded batch of sessions (with messages and optional
    /// embeddings) transactionally: either every record lands or none do.
    fn apply_remote_sessions(&self, batch: &[RemoteSessionRecord]) -> Result<(), MemoryError>;

    fn stats(&self) -> Result<StoreStats, MemoryError>;

    /// Apply the retention policy: archive sessions idle for
    /// `archive_after_days`, delete archived sessions idle for
    /// `delete_after_days`. A zero value disables that half of the policy.
    fn cleanup(&self, archive_after_days: u64, delete_after_days: u64)
        -> Result<CleanupReport, MemoryError>;

    /// Reclaim space and optimize the store.
    fn vacuum(&self) -> Result<(), MemoryError>;
}

/// Counters returned by [`StorageBackend::cleanup`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CleanupReport {
    pub archived: u64,
    pub deleted: u64,
}

/// One record of a download batch: the remote session, its full message list,
/// and its embedding if the remote had one.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteSessionRecord {
    pub session: Session,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert a sqlite-vec blob back into an f32 vector.
pub fn bytes_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
