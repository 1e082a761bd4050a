//! Finalize command implementation.

use super::check_ready;
use crate::cli::preflight::Operation;
use crate::cli::Output;
use crate::config::Settings;
use crate::service::SupportService;
use anyhow::Result;

pub async fn run_finalize(session_id: &str, agent: Option<u32>, settings: Settings) -> Result<()> {
    check_ready(Operation::Chat)?;
    let service = SupportService::from_settings(settings)?;

    let spinner = Output::spinner("Analyzing conversation...");
    let result = service.finalize(session_id, agent).await;
    spinner.finish_and_clear();

    let doc = result?;
    Output::success(&format!("Finalized {}", doc.id));
    Output::kv("Customer", &doc.subject_id);
    if let Some(agent_id) = doc.agent_id {
        Output::kv("Agent", &agent_id.to_string());
    }
    if let Some(analysis) = &doc.analysis {
        Output::kv("Topic", &analysis.topic);
        Output::kv("Product", &analysis.product);
        Output::kv("Sentiment", &analysis.sentiment);
    }

    Ok(())
}
