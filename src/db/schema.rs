//! SQL DDL for all mnemo tables.
//!
//! Defines the `sessions`, `messages`, `sessions_fts` (FTS5), `session_vectors`
//! (vec0), `sync_log`, and `meta` tables, plus the triggers that keep the
//! lexical index in lock-step with session rows. All DDL uses `IF NOT EXISTS`
//! for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for mnemo's core tables.
const SCHEMA_SQL: &str = r#"
-- Conversation units
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT,
    keywords TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0,
    work_dir TEXT,
    is_archived INTEGER NOT NULL DEFAULT 0,
    sync_status TEXT NOT NULL DEFAULT 'local' CHECK(sync_status IN ('local','syncing','synced','error')),
    sync_version INTEGER NOT NULL DEFAULT 1,
    indexed_at INTEGER,
    indexed_message_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
CREATE INDEX IF NOT EXISTS idx_sessions_archived ON sessions(is_archived);
CREATE INDEX IF NOT EXISTS idx_sessions_sync_status ON sessions(sync_status);

-- Conversation turns, immutable once written
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK(role IN ('user','assistant','system')),
    content TEXT NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    has_code INTEGER NOT NULL DEFAULT 0,
    code_language TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_session_time ON messages(session_id, timestamp);

-- Lexical projection over title/summary/keywords (BM25)
CREATE VIRTUAL TABLE IF NOT EXISTS sessions_fts USING fts5(
    title,
    summary,
    keywords,
    content='sessions',
    content_rowid='rowid'
);

-- Triggers keep sessions_fts in lock-step with sessions: the projection is
-- updated inside the same transaction as the row write.
CREATE TRIGGER IF NOT EXISTS sessions_fts_insert AFTER INSERT ON sessions BEGIN
    INSERT INTO sessions_fts(rowid, title, summary, keywords)
    VALUES (new.rowid, new.title, new.summary, new.keywords);
END;

CREATE TRIGGER IF NOT EXISTS sessions_fts_delete AFTER DELETE ON sessions BEGIN
    INSERT INTO sessions_fts(sessions_fts, rowid, title, summary, keywords)
    VALUES ('delete', old.rowid, old.title, old.summary, old.keywords);
END;

CREATE TRIGGER IF NOT EXISTS sessions_fts_update AFTER UPDATE ON sessions BEGIN
    INSERT INTO sessions_fts(sessions_fts, rowid, title, summary, keywords)
    VALUES ('delete', old.rowid, old.title, old.summary, old.keywords);
    INSERT INTO sessions_fts(rowid, title, summary, keywords)
    VALUES (new.rowid, new.title, new.summary, new.keywords);
END;

-- Append-only replication audit trail
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_type TEXT NOT NULL CHECK(sync_type IN ('upload','download','conflict')),
    session_id TEXT,
    status TEXT NOT NULL CHECK(status IN ('success','failed')),
    error_message TEXT,
    timestamp INTEGER NOT NULL
);

-- Key-value metadata
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax), with the
/// embedding width fixed at creation time from the configured model dimension.
/// Cosine distance keeps KNN distances in [0, 2] so they map linearly onto a
/// 0–1 similarity.
fn vec_table_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS session_vectors USING vec0(
    session_id TEXT PRIMARY KEY,
    embedding FLOAT[{dimensions}] distance_metric=cosine
);
"#
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_table_sql(dimensions))?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 384).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"messages".to_string()));
        assert!(tables.contains(&"sync_log".to_string()));
        assert!(tables.contains(&"meta".to_string()));

        // Verify the vec extension is live
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 384).unwrap();
        init_schema(&conn, 384).unwrap(); // second call should not error
    }

    #[test]
    fn fts_triggers_track_session_writes() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 384).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, title, summary, keywords, created_at, updated_at) \
             VALUES ('s1', 'Debugging tokio deadlock', NULL, '[]', 100, 100)",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions_fts WHERE sessions_fts MATCH 'tokio'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute(
            "UPDATE sessions SET title = 'Profiling allocator churn' WHERE id = 's1'",
            [],
        )
        .unwrap();

        let stale: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions_fts WHERE sessions_fts MATCH 'tokio'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stale, 0, "old title must leave the index on update");

        conn.execute("DELETE FROM sessions WHERE id = 's1'", []).unwrap();
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions_fts WHERE sessions_fts MATCH 'profiling'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0, "deletes must cascade to the lexical index");
    }
}
