use anyhow::Result;

use crate::recall::RecallQuery;
use crate::service::MemoryService;

/// Run a recall and print the ranked results.
pub async fn recall(
    service: &MemoryService,
    query: Option<String>,
    limit: Option<usize>,
    with_context: bool,
) -> Result<()> {
    let results = service
        .recall(RecallQuery {
            text: query,
            active_session: None,
            limit,
            include_context: with_context,
        })
        .await?;

    if results.is_empty() {
        println!("No relevant sessions found.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "#{} [{:.3}] {} — {}",
            i + 1,
            result.combined_score,
            result.session.id,
            result.session.title,
        );
        println!(
            "    vector {:.3}  keyword {:.3}",
            result.vector_score, result.keyword_score
        );
        if let Some(summary) = &result.session.summary {
            println!("    {summary}");
        }
        if with_context {
            for message in &result.context_messages {
                let content: String = message.content.chars().take(120).collect();
                println!("    {}: {}", message.role, content);
            }
        }
    }
    Ok(())
}
