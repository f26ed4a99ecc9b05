use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::service::MemoryService;
use crate::store::types::SearchQuery;

/// List sessions, newest first.
pub fn list(service: &MemoryService, limit: usize, archived: Option<bool>) -> Result<()> {
    let sessions = service.list_sessions(limit, archived)?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for session in sessions {
        let updated = format_ts(session.updated_at);
        let archived_tag = if session.is_archived { " [archived]" } else { "" };
        println!(
            "{}  {}  {:>6} tokens  {}  {}{}",
            session.id,
            updated,
            session.token_count,
            session.sync_status,
            session.title,
            archived_tag,
        );
    }
    Ok(())
}

/// Lexical search over session titles, summaries, and keywords.
pub fn search(service: &MemoryService, query: &str, limit: usize) -> Result<()> {
    let hits = service.store().search_hybrid(&SearchQuery {
        text: Some(query.to_string()),
        top_k: limit,
        ..Default::default()
    })?;

    if hits.is_empty() {
        println!("No matches for {query:?}.");
        return Ok(());
    }
    for hit in hits.into_iter().take(limit) {
        println!(
            "{:.3}  {}  {}",
            hit.keyword_score, hit.session.id, hit.session.title
        );
    }
    Ok(())
}

pub fn archive(service: &MemoryService, id: &str, unarchive: bool) -> Result<()> {
    service.archive_session(id, !unarchive)?;
    if unarchive {
        println!("Unarchived {id}");
    } else {
        println!("Archived {id}");
    }
    Ok(())
}

pub fn delete(service: &MemoryService, id: &str) -> Result<()> {
    service.delete_session(id)?;
    println!("Deleted {id} and all its messages.");
    Ok(())
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
