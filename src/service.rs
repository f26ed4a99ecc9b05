//! Process-scoped composition root.
//!
//! [`MemoryService`] wires storage, embedding, indexing, recall, and sync
//! together with explicit initialization ([`MemoryService::open`]) and
//! teardown ([`MemoryService::close`]) — no ambient global state. Message
//! ingestion is the latency-sensitive path: it performs one storage write and
//! schedules indexing as a background task, so ingestion never waits on the
//! embedding provider or a sync round-trip.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use crate::config::MnemoConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{IndexManager, IndexOutcome};
use crate::recall::{RecallEngine, RecallQuery, RecallResult};
use crate::store::sqlite::SqliteStore;
use crate::store::types::{Message, Role, Session, StoreStats, SyncLogEntry};
use crate::store::StorageBackend;
use crate::sync::{LastWriteWins, SyncManager, SyncReport};

/// Status snapshot for the management surface.
#[derive(Debug, serde::Serialize)]
pub struct ServiceStatus {
    pub stats: StoreStats,
    pub sessions_by_sync_status: HashMap<String, u64>,
    pub embedding_provider: String,
    pub embedding_model: Option<String>,
    pub sync_mode: String,
}

pub struct MemoryService {
    config: MnemoConfig,
    store: Arc<dyn StorageBackend>,
    index: Arc<IndexManager>,
    recall: Arc<RecallEngine>,
    sync: Option<Arc<SyncManager>>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl MemoryService {
    /// Open storage, build the configured providers, and wire the managers.
    pub fn open(config: MnemoConfig) -> Result<Self> {
        config.validate()?;

        let db_path = config.resolved_db_path();
        let store = SqliteStore::open(&db_path, config.embedding.dimensions)
            .with_context(|| format!("failed to open store at {}", db_path.display()))?;

        // Detect an embedding model change across restarts; stored vectors
        // would no longer be comparable with fresh query vectors.
        if let Some(stored_model) = store.embedding_model()? {
            if stored_model != config.embedding.model {
                tracing::warn!(
                    stored = %stored_model,
                    configured = %config.embedding.model,
                    "embedding model changed — run `mnemo index-all` to rebuild vectors"
                );
            }
        }
        store.set_embedding_model(&config.embedding.model)?;

        Self::build(config, Arc::new(store))
    }

    /// In-memory service for tests: same wiring, throwaway storage.
    pub fn open_in_memory(config: MnemoConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::in_memory(config.embedding.dimensions)?;
        Self::build(config, Arc::new(store))
    }

    fn build(config: MnemoConfig, store: Arc<SqliteStore>) -> Result<Self> {
        let store: Arc<dyn StorageBackend> = store;

        let provider: Option<Arc<dyn EmbeddingProvider>> =
            embedding::create_provider(&config.embedding)?.map(Arc::from);
        if provider.is_none() {
            tracing::info!("no embedding provider configured — recall degrades to lexical-only");
        }

        let index = Arc::new(IndexManager::new(
            Arc::clone(&store),
            provider.clone(),
            config.index.clone(),
            config.privacy.sensitive_keywords.clone(),
        ));

        let recall = Arc::new(RecallEngine::new(
            Arc::clone(&store),
            provider.clone(),
            config.recall.clone(),
        ));

        let sync = crate::sync::create_backend(&config.sync)?.map(|backend| {
            Arc::new(SyncManager::new(
                Arc::clone(&store),
                backend,
                Box::new(LastWriteWins),
                config.sync.clone(),
            ))
        });

        // Retention policy applies at startup, before new writes arrive.
        let report = store.cleanup(
            config.storage.archive_after_days,
            config.storage.delete_after_days,
        )?;
        if report.archived > 0 || report.deleted > 0 {
            tracing::info!(
                archived = report.archived,
                deleted = report.deleted,
                "retention cleanup applied"
            );
        }
        let stats = store.stats()?;
        if stats.db_size_bytes > config.storage.max_size_mb * 1024 * 1024 {
            tracing::warn!(
                size_mb = stats.db_size_bytes / (1024 * 1024),
                cap_mb = config.storage.max_size_mb,
                "database exceeds configured size cap — tighten the retention policy"
            );
            store.vacuum()?;
        }

        Ok(Self {
            config,
            store,
            index,
            recall,
            sync,
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    pub fn config(&self) -> &MnemoConfig {
        &self.config
    }

    // ── Session management ───────────────────────────────────────────────────

    /// Create a session with a fresh time-sortable id.
    pub fn create_session(&self, title: &str, work_dir: Option<String>) -> Result<Session> {
        let session = Session::new(uuid::Uuid::now_v7().to_string(), title, work_dir);
        self.store.create_session(&session)?;
        Ok(session)
    }

    pub fn list_sessions(&self, limit: usize, archived: Option<bool>) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(limit, 0, archived)?)
    }

    pub fn archive_session(&self, id: &str, archived: bool) -> Result<()> {
        Ok(self.store.archive_session(id, archived)?)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        Ok(self.store.delete_session(id)?)
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Persist one message and schedule indexing in the background. The write
    /// itself is the only thing the caller waits for.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        token_count: u64,
    ) -> Result<Message> {
        let store = Arc::clone(&self.store);
        let id = session_id.to_string();
        let content = content.to_string();
        let message = tokio::task::spawn_blocking(move || {
            store.add_message(&id, role, &content, token_count)
        })
        .await
        .context("ingestion task panicked")??;

        // Trigger evaluation and the pipeline run off the critical path.
        let index = Arc::clone(&self.index);
        let id = session_id.to_string();
        self.tasks.lock().await.spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || index.maybe_index(&id, false)).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "background indexing failed"),
                Err(e) => tracing::error!(error = %e, "background indexing panicked"),
            }
        });

        Ok(message)
    }

    /// Explicitly close a session: force a final index run and, when sync is
    /// configured, queue an upload.
    pub async fn close_session(&self, session_id: &str) -> Result<IndexOutcome> {
        let outcome = self.index_session(session_id, true).await?;

        if let Some(sync) = self.sync.clone() {
            let id = session_id.to_string();
            self.tasks.lock().await.spawn(async move {
                let result =
                    tokio::task::spawn_blocking(move || sync.sync_session(&id)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "background sync failed"),
                    Err(e) => tracing::error!(error = %e, "background sync panicked"),
                }
            });
        }

        Ok(outcome)
    }

    // ── Indexing ─────────────────────────────────────────────────────────────

    pub async fn index_session(&self, session_id: &str, force: bool) -> Result<IndexOutcome> {
        let index = Arc::clone(&self.index);
        let id = session_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || index.maybe_index(&id, force))
            .await
            .context("indexing task panicked")??;
        Ok(outcome)
    }

    pub async fn index_all(&self, limit: usize) -> Result<usize> {
        let index = Arc::clone(&self.index);
        let count = tokio::task::spawn_blocking(move || index.batch_index(limit))
            .await
            .context("indexing task panicked")??;
        Ok(count)
    }

    // ── Recall ───────────────────────────────────────────────────────────────

    pub async fn recall(&self, query: RecallQuery) -> Result<Vec<RecallResult>> {
        let recall = Arc::clone(&self.recall);
        let results = tokio::task::spawn_blocking(move || recall.recall(&query))
            .await
            .context("recall task panicked")??;
        Ok(results)
    }

    // ── Sync ─────────────────────────────────────────────────────────────────

    /// Upload sweep across all non-synced sessions (`force` re-uploads
    /// everything), then a download of remote changes.
    pub async fn sync_now(&self, force: bool) -> Result<SyncReport> {
        let Some(sync) = self.sync.clone() else {
            anyhow::bail!("sync is disabled — set sync.mode in the config");
        };

        // Bounded by the configured timeout: a hung replica marks the sweep
        // failed instead of wedging the caller.
        let timeout = std::time::Duration::from_secs(
            self.config.sync.timeout_secs * (self.config.sync.max_retries as u64 + 1) + 30,
        );
        let sweep = tokio::task::spawn_blocking(move || {
            let report = sync.sync_all(force)?;
            sync.download(0)?;
            Ok::<_, crate::error::MemoryError>(report)
        });
        let report = tokio::time::timeout(timeout, sweep)
            .await
            .context("sync timed out")?
            .context("sync task panicked")??;
        Ok(report)
    }

    pub fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        Ok(self.store.sync_log(limit)?)
    }

    // ── Status & lifecycle ───────────────────────────────────────────────────

    pub fn status(&self) -> Result<ServiceStatus> {
        let stats = self.store.stats()?;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        for session in self.store.list_sessions(10_000, 0, None)? {
            *by_status
                .entry(session.sync_status.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(ServiceStatus {
            stats,
            sessions_by_sync_status: by_status,
            embedding_provider: self.config.embedding.provider.clone(),
            embedding_model: Some(self.config.embedding.model.clone())
                .filter(|_| self.config.embedding.provider != "disabled"),
            sync_mode: self.config.sync.mode.clone(),
        })
    }

    /// Flush pending background work. Call before process exit so in-flight
    /// indexing and sync finish instead of being torn down mid-write.
    pub async fn close(self) -> Result<()> {
        let mut tasks = self.tasks.into_inner();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::debug!("memory service closed");
        Ok(())
    }
}
