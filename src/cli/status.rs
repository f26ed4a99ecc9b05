use anyhow::Result;

use crate::service::MemoryService;

/// Print store counts, sizes, and sync state.
pub fn status(service: &MemoryService) -> Result<()> {
    let status = service.status()?;
    let stats = &status.stats;

    println!("Sessions:   {} ({} archived)", stats.total_sessions, stats.archived_sessions);
    println!("Messages:   {}", stats.total_messages);
    println!("Tokens:     {}", stats.total_tokens);
    println!("Vectors:    {} indexed", stats.indexed_vectors);
    println!(
        "Storage:    {:.1} MB",
        stats.db_size_bytes as f64 / (1024.0 * 1024.0)
    );

    match &status.embedding_model {
        Some(model) => println!(
            "Embedding:  {} ({})",
            status.embedding_provider, model
        ),
        None => println!("Embedding:  disabled (lexical-only recall)"),
    }

    println!("Sync mode:  {}", status.sync_mode);
    if !status.sessions_by_sync_status.is_empty() {
        let mut by_status: Vec<_> = status.sessions_by_sync_status.iter().collect();
        by_status.sort();
        let summary: Vec<String> = by_status
            .iter()
            .map(|(status, count)| format!("{count} {status}"))
            .collect();
        println!("Sync state: {}", summary.join(", "));
    }
    if stats.sync_log_entries > 0 {
        println!("Sync log:   {} entries", stats.sync_log_entries);
    }

    Ok(())
}
