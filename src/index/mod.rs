//! Session indexing — keyword extraction, summarization, and vectorization.
//!
//! The [`IndexManager`] decides *when* a session is (re)indexed and runs the
//! pipeline off the ingestion critical path: extract keywords, build an
//! extractive summary, embed `title + summary + keywords`, and upsert both
//! projections through the storage backend. Every write is an upsert keyed by
//! session id, so rerunning on unchanged content changes nothing. Transient
//! embedding failures are retried with bounded backoff; if retries exhaust,
//! the lexical projection still stands (partial success) and the failure is
//! reported without touching the session's other fields.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::IndexConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;
use crate::locks::SessionLocks;
use crate::store::types::{now_ts, Message, Role, Session};
use crate::store::StorageBackend;

/// What a completed pipeline run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Lexical and vector projections both updated.
    Indexed,
    /// Lexical projection updated; embedding failed after bounded retries or
    /// no provider is configured.
    LexicalOnly,
    /// Another indexing task already holds this session, or there was nothing
    /// to index.
    Skipped,
}

pub struct IndexManager {
    store: Arc<dyn StorageBackend>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: IndexConfig,
    sensitive_keywords: Vec<String>,
    locks: Arc<SessionLocks>,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: IndexConfig,
        sensitive_keywords: Vec<String>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            sensitive_keywords,
            locks: SessionLocks::new(),
        }
    }

    /// Whether any trigger condition fires for this session: never indexed,
    /// enough new messages accumulated, or idle past the configured interval
    /// with unindexed messages outstanding.
    pub fn should_index(&self, session: &Session, message_count: u64) -> bool {
        if message_count == 0 {
            return false;
        }
        let Some(indexed_at) = session.indexed_at else {
            return true;
        };
        let new_messages = message_count.saturating_sub(session.indexed_message_count);
        if new_messages >= self.config.message_threshold {
            return true;
        }
        new_messages > 0 && now_ts() - indexed_at > self.config.idle_secs
    }

    /// Check triggers and run the pipeline if one fires. Intended to be called
    /// from a background task after each ingested message, and with
    /// `force = true` on explicit session close or manual reindex.
    pub fn maybe_index(&self, session_id: &str, force: bool) -> Result<IndexOutcome, MemoryError> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Err(MemoryError::UnknownSession(session_id.to_string()));
        };
        let message_count = self.store.message_count(session_id)?;
        if !force && !self.should_index(&session, message_count) {
            return Ok(IndexOutcome::Skipped);
        }
        self.index_session(&session, message_count)
    }

    fn index_session(
        &self,
        session: &Session,
        message_count: u64,
    ) -> Result<IndexOutcome, MemoryError> {
        // At most one indexing task per session; a concurrent run just skips.
        let Some(_guard) = self.locks.try_acquire(&session.id) else {
            tracing::debug!(session = %session.id, "indexing already in flight, skipping");
            return Ok(IndexOutcome::Skipped);
        };

        let messages = self.store.get_messages(&session.id, 1000, 0)?;
        if messages.is_empty() {
            return Ok(IndexOutcome::Skipped);
        }

        let keywords = extract_keywords(
            &messages,
            self.config.max_keywords,
            &self.sensitive_keywords,
        );
        let summary = redact(&generate_summary(&messages, 200), &self.sensitive_keywords);

        // Lexical projection first: it must land even if embedding fails.
        let mut indexed = session.clone();
        indexed.keywords = keywords;
        indexed.summary = Some(summary);
        indexed.indexed_at = Some(now_ts());
        indexed.indexed_message_count = message_count;
        self.store.mark_indexed(&indexed)?;

        let Some(provider) = self.provider.as_deref() else {
            tracing::debug!(session = %session.id, "no embedding provider, lexical-only index");
            return Ok(IndexOutcome::LexicalOnly);
        };

        let text = redact(&embedding_text(&indexed, &messages), &self.sensitive_keywords);
        match self.embed_with_retry(provider, &text) {
            Ok(vector) => {
                self.store.update_embedding(&session.id, &vector)?;
                tracing::debug!(session = %session.id, "session indexed");
                Ok(IndexOutcome::Indexed)
            }
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "embedding failed, keeping lexical projection");
                Ok(IndexOutcome::LexicalOnly)
            }
        }
    }

    /// Index every session that has never been indexed. Returns how many runs
    /// completed with at least a lexical projection.
    pub fn batch_index(&self, limit: usize) -> Result<usize, MemoryError> {
        let sessions = self.store.list_sessions(limit, 0, Some(false))?;
        let mut count = 0;
        for session in sessions {
            if session.indexed_at.is_some() {
                continue;
            }
            let message_count = self.store.message_count(&session.id)?;
            if message_count == 0 {
                continue;
            }
            match self.index_session(&session, message_count)? {
                IndexOutcome::Skipped => {}
                _ => count += 1,
            }
        }
        Ok(count)
    }

    fn embed_with_retry(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
    ) -> Result<Vec<f32>, MemoryError> {
        let mut attempt = 0;
        loop {
            match provider.embed(text) {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff_ms << attempt;
                    tracing::debug!(attempt, delay_ms = delay, error = %e, "retrying embedding");
                    std::thread::sleep(std::time::Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// English stopwords filtered out of keyword candidates.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "this", "that", "these", "those", "to", "of", "in", "for", "on", "with",
    "at", "by", "from", "as", "into", "through", "during", "before", "after", "above", "below",
    "between", "and", "or", "but", "not", "it", "its", "you", "your", "i", "my", "we", "our",
    "they", "their", "he", "she", "his", "her", "what", "which", "who", "how", "when", "where",
    "why", "if", "then", "else", "so", "just", "about", "there", "here", "all", "any", "some",
];

/// Extract the most frequent content words from user messages.
///
/// Tokens are alphanumeric-with-underscore runs of length > 1 (so identifiers
/// like `tokio_rusqlite` survive). Sensitive keywords are dropped before
/// anything reaches the lexical index or the embedding text. Ordered by
/// frequency, then alphabetically for a deterministic projection.
pub fn extract_keywords(
    messages: &[Message],
    max_keywords: usize,
    sensitive: &[String],
) -> Vec<String> {
    let sensitive: HashSet<String> = sensitive.iter().map(|s| s.to_lowercase()).collect();

    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for message in messages.iter().filter(|m| m.role == Role::User) {
        for token in tokenize(&message.content) {
            let lower = token.to_lowercase();
            if lower.len() < 2
                || STOP_WORDS.contains(&lower.as_str())
                || sensitive.contains(&lower)
            {
                continue;
            }
            *counts.entry(lower).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_keywords);
    ranked.into_iter().map(|(word, _)| word).collect()
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
}

/// Extractive summary: the leading user messages, truncated and joined.
/// Always cheap and always available; a configured summarizer could replace
/// this without touching the pipeline shape.
pub fn generate_summary(messages: &[Message], max_length: usize) -> String {
    let previews: Vec<String> = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .take(3)
        .map(|m| truncate(&m.content, 100))
        .collect();

    if previews.is_empty() {
        return "Empty session".to_string();
    }
    truncate(&previews.join(" | "), max_length)
}

/// Text fed to the embedding provider: title, summary, keywords, and leading
/// user-message previews.
fn embedding_text(session: &Session, messages: &[Message]) -> String {
    let mut parts = vec![session.title.clone()];
    if let Some(summary) = &session.summary {
        parts.push(summary.clone());
    }
    parts.extend(session.keywords.iter().cloned());
    parts.extend(
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .take(5)
            .map(|m| truncate(&m.content, 100)),
    );
    parts.join(" ")
}

/// Replace every token matching a sensitive keyword (case-insensitive) so
/// secrets never reach the lexical index, the summary, or the embedding text.
/// Separators are preserved; only whole tokens are replaced.
pub fn redact(text: &str, sensitive: &[String]) -> String {
    if sensitive.is_empty() {
        return text.to_string();
    }
    let sensitive: HashSet<String> = sensitive.iter().map(|s| s.to_lowercase()).collect();

    let mut out = String::with_capacity(text.len());
    let mut token = String::new();
    let flush = |out: &mut String, token: &mut String| {
        if !token.is_empty() {
            if sensitive.contains(&token.to_lowercase()) {
                out.push_str("[redacted]");
            } else {
                out.push_str(token);
            }
            token.clear();
        }
    };

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            token.push(c);
        } else {
            flush(&mut out, &mut token);
            out.push(c);
        }
    }
    flush(&mut out, &mut token);
    out
}

/// Truncate to max_chars on a char boundary, appending "..." if truncated.
fn truncate(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        content.to_string()
    } else {
        let end = content
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_chars);
        format!("{}...", &content[..end])
    }
}
