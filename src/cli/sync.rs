use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::service::MemoryService;

/// Run an upload sweep plus download, printing the report.
pub async fn sync_now(service: &MemoryService, force: bool) -> Result<()> {
    let report = service.sync_now(force).await?;
    println!(
        "Sync complete: {} uploaded, {} conflicts, {} failed, {} skipped",
        report.uploaded, report.conflicts, report.failed, report.skipped
    );
    Ok(())
}

/// Print the per-session sync state and recent log entries.
pub fn sync_status(service: &MemoryService, log_limit: usize) -> Result<()> {
    let status = service.status()?;
    println!("Sync mode: {}", status.sync_mode);

    let mut by_status: Vec<_> = status.sessions_by_sync_status.iter().collect();
    by_status.sort();
    for (state, count) in by_status {
        println!("  {state}: {count}");
    }

    let log = service.sync_log(log_limit)?;
    if log.is_empty() {
        return Ok(());
    }
    println!("Recent sync log:");
    for entry in log {
        let when = Utc
            .timestamp_opt(entry.timestamp, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        let session = entry.session_id.as_deref().unwrap_or("-");
        let detail = entry.error_message.as_deref().unwrap_or("");
        println!(
            "  {} {:9} {:8} {} {}",
            when,
            entry.sync_type.as_str(),
            entry.status.as_str(),
            session,
            detail,
        );
    }
    Ok(())
}
