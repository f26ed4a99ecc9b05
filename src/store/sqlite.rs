//! Embedded SQLite storage backend.
//!
//! Sessions and messages live in ordinary tables; the lexical projection is an
//! FTS5 external-content table kept in lock-step by triggers, and the vector
//! projection is a sqlite-vec vec0 table upserted inside the same logical
//! transaction as the write that produced it. All multi-table writes run in a
//! transaction so a failure can never leave the projections out of sync with
//! the session row.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db;
use crate::error::MemoryError;
use crate::store::types::{
    detect_code, now_ts, Message, Role, SearchQuery, Session, SessionHit, StoreStats,
    SyncLogEntry, SyncOutcome, SyncStatus, SyncType,
};
use crate::store::{embedding_to_bytes, CleanupReport, RemoteSessionRecord, StorageBackend};

/// SQLite-backed [`StorageBackend`] with FTS5 + sqlite-vec projections.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> anyhow::Result<Self> {
        let conn = db::open_database(path, dimensions)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    /// In-memory store for tests.
    pub fn in_memory(dimensions: usize) -> anyhow::Result<Self> {
        let conn = db::open_memory_database(dimensions)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embedding model recorded in the store's metadata, if any.
    pub fn embedding_model(&self) -> Result<Option<String>, MemoryError> {
        let conn = self.conn()?;
        Ok(db::migrations::get_embedding_model(&conn)?)
    }

    /// Record the embedding model producing this store's vectors.
    pub fn set_embedding_model(&self, model: &str) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        Ok(db::migrations::set_embedding_model(&conn, model)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::CorruptionRisk("connection mutex poisoned".into()))
    }
}

const SESSION_COLUMNS: &str = "id, title, summary, keywords, created_at, updated_at, \
     token_count, work_dir, is_archived, sync_status, sync_version, \
     indexed_at, indexed_message_count";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let keywords_json: String = row.get(3)?;
    let status_str: String = row.get(9)?;
    Ok(Session {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        token_count: row.get::<_, i64>(6)? as u64,
        work_dir: row.get(7)?,
        is_archived: row.get(8)?,
        sync_status: status_str
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        sync_version: row.get::<_, i64>(10)? as u64,
        indexed_at: row.get(11)?,
        indexed_message_count: row.get::<_, i64>(12)? as u64,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: role_str.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        content: row.get(3)?,
        token_count: row.get::<_, i64>(4)? as u64,
        timestamp: row.get(5)?,
        has_code: row.get(6)?,
        code_language: row.get(7)?,
    })
}

fn session_exists(conn: &Connection, id: &str) -> Result<bool, MemoryError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Insert all messages of a remote record under fresh local sequence ids.
fn insert_remote_messages(tx: &Transaction<'_>, record: &RemoteSessionRecord) -> Result<(), MemoryError> {
    let mut stmt = tx.prepare(
        "INSERT INTO messages (session_id, role, content, token_count, timestamp, has_code, code_language) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for msg in &record.messages {
        stmt.execute(params![
            record.session.id,
            msg.role.as_str(),
            msg.content,
            msg.token_count as i64,
            msg.timestamp,
            msg.has_code,
            msg.code_language,
        ])?;
    }
    Ok(())
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with OR:
/// recall queries are conversational context, not keyword expressions, so a
/// candidate matching any term should surface and BM25 rank the rest. Strips
/// empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" OR ")
}

impl StorageBackend for SqliteStore {
    fn create_session(&self, session: &Session) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        if session_exists(&conn, &session.id)? {
            return Err(MemoryError::DuplicateId(session.id.clone()));
        }
        conn.execute(
            &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
            params![
                session.id,
                session.title,
                session.summary,
                serde_json::to_string(&session.keywords).unwrap_or_else(|_| "[]".into()),
                session.created_at,
                session.updated_at,
                session.token_count as i64,
                session.work_dir,
                session.is_archived,
                session.sync_status.as_str(),
                session.sync_version as i64,
                session.indexed_at,
                session.indexed_message_count as i64,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>, MemoryError> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn update_session(&self, session: &Session) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sessions SET title = ?1, summary = ?2, keywords = ?3, updated_at = ?4, \
             token_count = ?5, work_dir = ?6, is_archived = ?7, sync_status = ?8, \
             sync_version = ?9, indexed_at = ?10, indexed_message_count = ?11 \
             WHERE id = ?12",
            params![
                session.title,
                session.summary,
                serde_json::to_string(&session.keywords).unwrap_or_else(|_| "[]".into()),
                session.updated_at,
                session.token_count as i64,
                session.work_dir,
                session.is_archived,
                session.sync_status.as_str(),
                session.sync_version as i64,
                session.indexed_at,
                session.indexed_message_count as i64,
                session.id,
            ],
        )?;
        if rows == 0 {
            return Err(MemoryError::UnknownSession(session.id.clone()));
        }
        Ok(())
    }

    fn list_sessions(
        &self,
        limit: usize,
        offset: usize,
        archived: Option<bool>,
    ) -> Result<Vec<Session>, MemoryError> {
        let conn = self.conn()?;
        let sql = match archived {
            Some(_) => format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE is_archived = ?1 \
                 ORDER BY updated_at DESC, id LIMIT ?2 OFFSET ?3"
            ),
            None => format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 ORDER BY updated_at DESC, id LIMIT ?1 OFFSET ?2"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let sessions = match archived {
            Some(flag) => stmt
                .query_map(params![flag, limit as i64, offset as i64], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![limit as i64, offset as i64], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(sessions)
    }

    fn archive_session(&self, id: &str, archived: bool) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sessions SET is_archived = ?1 WHERE id = ?2",
            params![archived, id],
        )?;
        if rows == 0 {
            return Err(MemoryError::UnknownSession(id.to_string()));
        }
        Ok(())
    }

    fn delete_session(&self, id: &str) -> Result<(), MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        // Vector entry first: the vec0 table is not FK-linked.
        tx.execute(
            "DELETE FROM session_vectors WHERE session_id = ?1",
            params![id],
        )?;
        // Messages cascade via FK; the FTS trigger fires on the session delete.
        let rows = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(MemoryError::UnknownSession(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        token_count: u64,
    ) -> Result<Message, MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !session_exists(&tx, session_id)? {
            return Err(MemoryError::UnknownSession(session_id.to_string()));
        }

        let now = now_ts();
        let (has_code, code_language) = detect_code(content);

        tx.execute(
            "INSERT INTO messages (session_id, role, content, token_count, timestamp, has_code, code_language) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session_id,
                role.as_str(),
                content,
                token_count as i64,
                now,
                has_code,
                code_language,
            ],
        )?;
        let id = tx.last_insert_rowid();

        // A local write dirties a previously synced session.
        tx.execute(
            "UPDATE sessions SET token_count = token_count + ?1, updated_at = ?2, \
             sync_status = CASE WHEN sync_status = 'synced' THEN 'local' ELSE sync_status END \
             WHERE id = ?3",
            params![token_count as i64, now, session_id],
        )?;

        tx.commit()?;

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            token_count,
            timestamp: now,
            has_code,
            code_language,
        })
    }

    fn get_messages(
        &self,
        session_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, token_count, timestamp, has_code, code_language \
             FROM messages WHERE session_id = ?1 ORDER BY timestamp, id LIMIT ?2 OFFSET ?3",
        )?;
        let messages = stmt
            .query_map(
                params![session_id, limit as i64, offset as i64],
                row_to_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn recent_messages(&self, session_id: &str, n: usize) -> Result<Vec<Message>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, token_count, timestamp, has_code, code_language \
             FROM messages WHERE session_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let mut messages = stmt
            .query_map(params![session_id, n as i64], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        // Back into chronological order.
        messages.reverse();
        Ok(messages)
    }

    fn message_count(&self, session_id: &str) -> Result<u64, MemoryError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    fn update_embedding(&self, session_id: &str, embedding: &[f32]) -> Result<(), MemoryError> {
        if embedding.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !session_exists(&tx, session_id)? {
            return Err(MemoryError::UnknownSession(session_id.to_string()));
        }

        // Upsert: vec0 has no ON CONFLICT, so replace inside the transaction.
        tx.execute(
            "DELETE FROM session_vectors WHERE session_id = ?1",
            params![session_id],
        )?;
        tx.execute(
            "INSERT INTO session_vectors (session_id, embedding) VALUES (?1, ?2)",
            params![session_id, embedding_to_bytes(embedding)],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_embedding(&self, session_id: &str) -> Result<Option<Vec<f32>>, MemoryError> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM session_vectors WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| crate::store::bytes_to_embedding(&b)))
    }

    fn search_keywords(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(String, f64)>, MemoryError> {
        let escaped = escape_fts_query(query);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, rank FROM sessions_fts fts \
             JOIN sessions s ON s.rowid = fts.rowid \
             WHERE sessions_fts MATCH ?1 AND s.is_archived = 0 \
             ORDER BY rank LIMIT ?2",
        )?;
        let results = stmt
            .query_map(params![escaped, top_k as i64], |row| {
                let id: String = row.get(0)?;
                let rank: f64 = row.get(1)?;
                // BM25 rank is negative (more negative = better); fold onto 0–1.
                Ok((id, 1.0 / (1.0 + rank.abs())))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn search_vector(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(String, f64)>, MemoryError> {
        if embedding.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, distance FROM session_vectors \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let results = stmt
            .query_map(params![embedding_to_bytes(embedding), top_k as i64], |row| {
                let id: String = row.get(0)?;
                let distance: f64 = row.get(1)?;
                // Cosine distance is in [0, 2]; fold onto 0–1 similarity.
                Ok((id, (1.0 - distance / 2.0).max(0.0)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn search_hybrid(&self, query: &SearchQuery) -> Result<Vec<SessionHit>, MemoryError> {
        let has_text = query.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if query.embedding.is_none() && !has_text {
            return Err(MemoryError::InvalidQuery);
        }

        // (vector_score, keyword_score) per candidate; a session found by both
        // families keeps the max of each.
        let mut scores: HashMap<String, (f64, f64)> = HashMap::new();

        if let Some(text) = query.text.as_deref() {
            if has_text {
                for (id, score) in self.search_keywords(text, query.top_k)? {
                    let entry = scores.entry(id).or_insert((0.0, 0.0));
                    entry.1 = entry.1.max(score);
                }
            }
        }

        if let Some(embedding) = query.embedding.as_deref() {
            for (id, score) in self.search_vector(embedding, query.top_k)? {
                let entry = scores.entry(id).or_insert((0.0, 0.0));
                entry.0 = entry.0.max(score);
            }
        }

        let mut hits = Vec::with_capacity(scores.len());
        for (id, (vector_score, keyword_score)) in scores {
            if query.exclude_session.as_deref() == Some(id.as_str()) {
                continue;
            }
            if vector_score.max(keyword_score) < query.min_score {
                continue;
            }
            let Some(session) = self.get_session(&id)? else {
                // Vector entry may outlive its session only within a torn
                // external write; skip rather than fail the whole query.
                continue;
            };
            if session.is_archived {
                continue;
            }
            hits.push(SessionHit {
                session,
                vector_score,
                keyword_score,
            });
        }

        // Preliminary order: strongest combined signal first, id as tiebreak
        // so equal scores are stable across runs.
        hits.sort_by(|a, b| {
            let sa = a.vector_score + a.keyword_score;
            let sb = b.vector_score + b.keyword_score;
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.session.id.cmp(&b.session.id))
        });
        Ok(hits)
    }

    fn mark_indexed(&self, session: &Session) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sessions SET summary = ?1, keywords = ?2, indexed_at = ?3, \
             indexed_message_count = ?4 WHERE id = ?5",
            params![
                session.summary,
                serde_json::to_string(&session.keywords).unwrap_or_else(|_| "[]".into()),
                session.indexed_at,
                session.indexed_message_count as i64,
                session.id,
            ],
        )?;
        if rows == 0 {
            return Err(MemoryError::UnknownSession(session.id.clone()));
        }
        Ok(())
    }

    fn set_sync_status(&self, id: &str, status: SyncStatus) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sessions SET sync_status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if rows == 0 {
            return Err(MemoryError::UnknownSession(id.to_string()));
        }
        Ok(())
    }

    fn set_sync_version(&self, id: &str, version: u64) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sessions SET sync_version = ?1 WHERE id = ?2 AND sync_version < ?1",
            params![version as i64, id],
        )?;
        if rows == 0 {
            if !session_exists(&conn, id)? {
                return Err(MemoryError::UnknownSession(id.to_string()));
            }
            return Err(MemoryError::CorruptionRisk(format!(
                "sync_version for {id} must strictly increase"
            )));
        }
        Ok(())
    }

    fn append_sync_log(
        &self,
        sync_type: SyncType,
        session_id: Option<&str>,
        status: SyncOutcome,
        error_message: Option<&str>,
    ) -> Result<SyncLogEntry, MemoryError> {
        let conn = self.conn()?;
        let now = now_ts();
        conn.execute(
            "INSERT INTO sync_log (sync_type, session_id, status, error_message, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sync_type.as_str(),
                session_id,
                status.as_str(),
                error_message,
                now,
            ],
        )?;
        Ok(SyncLogEntry {
            id: conn.last_insert_rowid(),
            sync_type,
            session_id: session_id.map(str::to_string),
            status,
            error_message: error_message.map(str::to_string),
            timestamp: now,
        })
    }

    fn sync_log(&self, limit: usize) -> Result<Vec<SyncLogEntry>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, sync_type, session_id, status, error_message, timestamp \
             FROM sync_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let type_str: String = row.get(1)?;
                let status_str: String = row.get(3)?;
                let sync_type = match type_str.as_str() {
                    "upload" => SyncType::Upload,
                    "download" => SyncType::Download,
                    _ => SyncType::Conflict,
                };
                let status = if status_str == "success" {
                    SyncOutcome::Success
                } else {
                    SyncOutcome::Failed
                };
                Ok(SyncLogEntry {
                    id: row.get(0)?,
                    sync_type,
                    session_id: row.get(2)?,
                    status,
                    error_message: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn apply_remote_sessions(&self, batch: &[RemoteSessionRecord]) -> Result<(), MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for record in batch {
            if let Some(embedding) = record.embedding.as_deref() {
                if embedding.len() != self.dimensions {
                    // Transaction drops unrolled — nothing from the batch lands.
                    return Err(MemoryError::DimensionMismatch {
                        expected: self.dimensions,
                        actual: embedding.len(),
                    });
                }
            }

            let session = &record.session;
            // REPLACE deletes any prior row, cascading its messages and firing
            // the FTS delete trigger, so the projections follow automatically.
            tx.execute(
                &format!("INSERT OR REPLACE INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
                params![
                    session.id,
                    session.title,
                    session.summary,
                    serde_json::to_string(&session.keywords).unwrap_or_else(|_| "[]".into()),
                    session.created_at,
                    session.updated_at,
                    session.token_count as i64,
                    session.work_dir,
                    session.is_archived,
                    SyncStatus::Synced.as_str(),
                    session.sync_version as i64,
                    session.indexed_at,
                    session.indexed_message_count as i64,
                ],
            )?;

            insert_remote_messages(&tx, record)?;

            tx.execute(
                "DELETE FROM session_vectors WHERE session_id = ?1",
                params![session.id],
            )?;
            if let Some(embedding) = record.embedding.as_deref() {
                tx.execute(
                    "INSERT INTO session_vectors (session_id, embedding) VALUES (?1, ?2)",
                    params![session.id, embedding_to_bytes(embedding)],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, MemoryError> {
        let conn = self.conn()?;
        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
        let archived_sessions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE is_archived = 1",
            [],
            |r| r.get(0),
        )?;
        let total_messages: i64 =
            conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        let total_tokens: i64 = conn.query_row(
            "SELECT COALESCE(SUM(token_count), 0) FROM sessions",
            [],
            |r| r.get(0),
        )?;
        let indexed_vectors: i64 =
            conn.query_row("SELECT COUNT(*) FROM session_vectors", [], |r| r.get(0))?;
        let sync_log_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM sync_log", [], |r| r.get(0))?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;

        Ok(StoreStats {
            total_sessions: total_sessions as u64,
            archived_sessions: archived_sessions as u64,
            total_messages: total_messages as u64,
            total_tokens: total_tokens as u64,
            indexed_vectors: indexed_vectors as u64,
            sync_log_entries: sync_log_entries as u64,
            db_size_bytes: (page_count * page_size) as u64,
        })
    }

    fn cleanup(
        &self,
        archive_after_days: u64,
        delete_after_days: u64,
    ) -> Result<CleanupReport, MemoryError> {
        let now = now_ts();
        let mut report = CleanupReport::default();

        if archive_after_days > 0 {
            let cutoff = now - (archive_after_days as i64) * 86_400;
            let conn = self.conn()?;
            let archived = conn.execute(
                "UPDATE sessions SET is_archived = 1 \
                 WHERE is_archived = 0 AND updated_at < ?1",
                params![cutoff],
            )?;
            report.archived = archived as u64;
        }

        if delete_after_days > 0 {
            let cutoff = now - (delete_after_days as i64) * 86_400;
            let doomed: Vec<String> = {
                let conn = self.conn()?;
                let mut stmt = conn.prepare(
                    "SELECT id FROM sessions WHERE is_archived = 1 AND updated_at < ?1",
                )?;
                let rows = stmt
                    .query_map(params![cutoff], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            // Per-session deletes so each cascade stays atomic.
            for id in doomed {
                self.delete_session(&id)?;
                report.deleted += 1;
            }
        }

        Ok(report)
    }

    fn vacuum(&self) -> Result<(), MemoryError> {
        let conn = self.conn()?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}
