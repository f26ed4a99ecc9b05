//! Hybrid recall — "what past context is relevant now".
//!
//! The [`RecallEngine`] resolves a query (explicit text or the active
//! session's recent context), runs it through both search families, merges
//! the sub-scores under configurable weights, applies exponential recency
//! decay, filters, and assembles a context window per surviving candidate.
//!
//! Sub-scores arrive from the storage backend already folded onto 0–1 (cosine
//! distance d → 1 − d/2, BM25 rank r → 1/(1+|r|)); the merge is a plain
//! weighted sum with a missing family contributing 0. Ranking is a total
//! order: combined score desc, then `updated_at` desc, then id, so the same
//! query over unchanged data always returns the same list.

use std::sync::Arc;

use crate::config::RecallConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;
use crate::store::types::{now_ts, Message, SearchQuery, Session, SessionHit};
use crate::store::StorageBackend;

/// A recall request.
#[derive(Debug, Clone, Default)]
pub struct RecallQuery {
    /// Explicit query text; when `None`, the active session's recent messages
    /// are used as the query.
    pub text: Option<String>,
    /// The currently active session — always excluded from results.
    pub active_session: Option<String>,
    /// Override for the configured max result count.
    pub limit: Option<usize>,
    /// Attach recent messages to each result.
    pub include_context: bool,
}

/// One recalled session with its scores and context window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecallResult {
    pub session: Session,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub combined_score: f64,
    pub context_messages: Vec<Message>,
}

pub struct RecallEngine {
    store: Arc<dyn StorageBackend>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: RecallConfig,
}

impl RecallEngine {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: RecallConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Execute a recall: resolve → search → merge → decay → filter → assemble.
    pub fn recall(&self, query: &RecallQuery) -> Result<Vec<RecallResult>, MemoryError> {
        let text = self.resolve_query_text(query)?;

        // Vector modality is best-effort: a failing provider degrades to
        // lexical-only instead of failing the recall.
        let embedding = match (self.provider.as_deref(), text.as_deref()) {
            (Some(provider), Some(text)) => match provider.embed(text) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed, lexical-only recall");
                    None
                }
            },
            _ => None,
        };

        if embedding.is_none() && text.is_none() {
            return Err(MemoryError::RecallUnavailable);
        }

        // Sub-score floor stays at 0 here; the threshold below applies to the
        // merged, decayed score instead.
        let hits = self.store.search_hybrid(&SearchQuery {
            text,
            embedding,
            exclude_session: query.active_session.clone(),
            top_k: self.config.candidate_k,
            min_score: 0.0,
        })?;

        let now = now_ts();
        let mut results: Vec<RecallResult> = hits
            .into_iter()
            .map(|hit| self.score_hit(hit, now))
            .filter(|r| r.combined_score >= self.config.min_score)
            .collect();

        // Total order for reproducibility: score desc, recency desc, id asc.
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.session.updated_at.cmp(&a.session.updated_at))
                .then_with(|| a.session.id.cmp(&b.session.id))
        });

        let limit = query.limit.unwrap_or(self.config.max_results);
        results.truncate(limit);

        if query.include_context {
            for result in &mut results {
                result.context_messages = self
                    .store
                    .recent_messages(&result.session.id, self.config.context_messages)?;
            }
        }

        Ok(results)
    }

    /// Explicit text wins; otherwise derive the query from the active
    /// session's recent messages.
    fn resolve_query_text(&self, query: &RecallQuery) -> Result<Option<String>, MemoryError> {
        if let Some(text) = query.text.as_deref() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
        let Some(active) = query.active_session.as_deref() else {
            return Ok(None);
        };
        let recent = self
            .store
            .recent_messages(active, self.config.context_messages)?;
        if recent.is_empty() {
            return Ok(None);
        }
        let mut context = recent
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        // Keep the lexical query focused on the tail of the conversation.
        if context.len() > 200 {
            let cut = context
                .char_indices()
                .take_while(|(i, _)| *i < 200)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(200);
            context.truncate(cut);
        }
        Ok(Some(context))
    }

    fn score_hit(&self, hit: SessionHit, now: i64) -> RecallResult {
        let combined = combine_scores(
            hit.vector_score,
            hit.keyword_score,
            self.config.vector_weight,
            self.config.keyword_weight,
        );
        let age_days = (now - hit.session.updated_at).max(0) as f64 / 86_400.0;
        let combined = combined * (-self.config.time_decay_factor * age_days).exp();
        RecallResult {
            session: hit.session,
            vector_score: hit.vector_score,
            keyword_score: hit.keyword_score,
            combined_score: combined,
            context_messages: Vec::new(),
        }
    }
}

/// Weighted merge of the two sub-scores. Each is clamped to 1.0 first; a
/// session seen by only one family contributes 0 for the other.
pub fn combine_scores(vector: f64, keyword: f64, w_vector: f64, w_keyword: f64) -> f64 {
    vector.min(1.0) * w_vector + keyword.min(1.0) * w_keyword
}
