//! Error taxonomy for the memory engine.
//!
//! [`MemoryError`] is the typed error surface of the core: validation errors
//! are surfaced immediately and never retried, transient provider errors are
//! retried with backoff by the index and sync managers, conflicts are resolved
//! by policy and always logged. The CLI and service layers wrap these in
//! `anyhow` with context.

use thiserror::Error;

/// Errors produced by an embedding provider.
///
/// The distinction matters to callers: [`EmbedError::ProviderUnavailable`] is
/// transient and worth retrying with backoff, [`EmbedError::InvalidInput`] is
/// a caller bug and never retried.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Input cannot be embedded (e.g. empty text). Not retryable.
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    /// The provider is temporarily unreachable (network, model load, timeout).
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl EmbedError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

/// Errors produced by a sync backend.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or storage hiccup — retried with bounded backoff.
    #[error("transient sync failure: {0}")]
    Transient(String),

    /// Permanent failure (bad credentials, malformed replica). Not retried.
    #[error("sync failed: {0}")]
    Fatal(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The error surface of the storage backend, recall engine, and managers.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A session with this id already exists.
    #[error("session already exists: {0}")]
    DuplicateId(String),

    /// The referenced session does not exist.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// An embedding's length disagrees with the configured model dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A hybrid search was issued with neither a query vector nor query text.
    #[error("hybrid search requires a query vector or query text")]
    InvalidQuery,

    /// Neither vector nor lexical retrieval is available for this query.
    #[error("recall unavailable: no search modality configured")]
    RecallUnavailable,

    /// A sync upload was rejected because the remote holds a newer version.
    #[error("sync conflict on session {session_id}: local version {local_version}, remote version {remote_version}")]
    Conflict {
        session_id: String,
        local_version: u64,
        remote_version: u64,
    },

    /// A partial write was detected; the enclosing transaction was rolled back.
    #[error("storage corruption risk: {0}")]
    CorruptionRisk(String),

    #[error(transparent)]
    Provider(#[from] EmbedError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl MemoryError {
    /// Validation errors are never retried and surfaced to the caller as-is.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId(_)
                | Self::UnknownSession(_)
                | Self::DimensionMismatch { .. }
                | Self::InvalidQuery
        )
    }
}
