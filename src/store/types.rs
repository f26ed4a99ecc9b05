//! Core record definitions.
//!
//! Defines [`Session`] (the unit of indexing, recall, and sync), [`Message`]
//! (one immutable conversation turn), [`SyncStatus`]/[`Role`] enums, the
//! [`SyncLogEntry`] audit record, and the [`SearchQuery`]/[`SessionHit`]
//! types exchanged with the hybrid search path.

use serde::{Deserialize, Serialize};

/// Replication state of a session, driven by the sync manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Only on this device, or dirtied by a local write since the last sync.
    Local,
    /// An upload or download involving this session is in flight.
    Syncing,
    /// Local and remote agree as of the last sync.
    Synced,
    /// The last sync attempt exhausted its retries.
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// A conversation unit, matching the `sessions` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable unique identifier, never reused.
    pub id: String,
    pub title: String,
    /// Extractive summary written by the index manager.
    pub summary: Option<String>,
    /// Ordered keyword strings written by the index manager.
    pub keywords: Vec<String>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds; bumped on every message and every accepted sync write.
    pub updated_at: i64,
    /// Cumulative token count across all messages.
    pub token_count: u64,
    /// Working directory the conversation ran in, if known.
    pub work_dir: Option<String>,
    pub is_archived: bool,
    pub sync_status: SyncStatus,
    /// Optimistic lock; strictly increases on every accepted write.
    pub sync_version: u64,
    /// Unix seconds of the last completed index run, `None` if never indexed.
    pub indexed_at: Option<i64>,
    /// Message count at the time of the last index run.
    pub indexed_message_count: u64,
}

impl Session {
    /// New unindexed session with both timestamps set to now.
    pub fn new(id: impl Into<String>, title: impl Into<String>, work_dir: Option<String>) -> Self {
        let now = now_ts();
        Self {
            id: id.into(),
            title: title.into(),
            summary: None,
            keywords: Vec::new(),
            created_at: now,
            updated_at: now,
            token_count: 0,
            work_dir,
            is_archived: false,
            sync_status: SyncStatus::Local,
            sync_version: 1,
            indexed_at: None,
            indexed_message_count: 0,
        }
    }
}

/// One conversation turn, matching the `messages` table schema.
/// Immutable once written; removed only by session cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Auto-assigned sequence id.
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub token_count: u64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Whether the content carries a fenced code block, derived at write time.
    pub has_code: bool,
    /// Language tag of the first fenced block, if any.
    pub code_language: Option<String>,
}

/// Category of a sync log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Upload,
    Download,
    Conflict,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Conflict => "conflict",
        }
    }
}

/// Outcome of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// An immutable audit record of one sync attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub sync_type: SyncType,
    /// `None` for batch-level entries (e.g. a download sweep).
    pub session_id: Option<String>,
    pub status: SyncOutcome,
    pub error_message: Option<String>,
    pub timestamp: i64,
}

/// A hybrid search request against the storage backend.
///
/// At least one of `embedding` and `text` must be present.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// Session excluded from the candidate set (the active one).
    pub exclude_session: Option<String>,
    /// Candidates fetched per search family.
    pub top_k: usize,
    /// Floor on a candidate's best sub-score; callers that rank on a merged
    /// score pass 0 and filter after merging.
    pub min_score: f64,
}

/// One candidate from hybrid search, with per-family sub-scores already
/// normalized to 0–1 (cosine distance d → 1 − d/2, BM25 rank r → 1/(1+|r|)).
/// A session absent from one family carries 0 for that score.
#[derive(Debug, Clone)]
pub struct SessionHit {
    pub session: Session,
    pub vector_score: f64,
    pub keyword_score: f64,
}

/// Storage-level counters reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_sessions: u64,
    pub archived_sessions: u64,
    pub total_messages: u64,
    pub total_tokens: u64,
    pub indexed_vectors: u64,
    pub sync_log_entries: u64,
    pub db_size_bytes: u64,
}

/// Current Unix timestamp in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Detect a fenced code block and its language tag in message content.
///
/// Only the opening fence is inspected; an unterminated fence still counts as
/// code since the author clearly pasted some.
pub fn detect_code(content: &str) -> (bool, Option<String>) {
    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            let lang = rest.trim();
            let lang = if lang.is_empty() {
                None
            } else {
                Some(lang.to_ascii_lowercase())
            };
            return (true, lang);
        }
    }
    (false, None)
}
