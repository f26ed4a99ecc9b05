use anyhow::Result;
use serde::Serialize;

use crate::service::MemoryService;
use crate::store::types::{Message, Session};

/// Export format — every session paired with its full message history.
#[derive(Debug, Serialize)]
struct ExportData {
    sessions: Vec<SessionExport>,
}

#[derive(Debug, Serialize)]
struct SessionExport {
    #[serde(flatten)]
    session: Session,
    messages: Vec<Message>,
}

/// Export all sessions and messages as JSON to stdout.
pub fn export(service: &MemoryService) -> Result<()> {
    let sessions = service.list_sessions(100_000, None)?;

    let mut exports = Vec::with_capacity(sessions.len());
    for session in sessions {
        let messages = service.store().get_messages(&session.id, 1_000_000, 0)?;
        exports.push(SessionExport { session, messages });
    }

    let data = ExportData { sessions: exports };
    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!("Exported {} sessions.", data.sessions.len());
    Ok(())
}
