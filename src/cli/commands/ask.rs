//! Ask command implementation.

use super::check_ready;
use crate::cli::preflight::Operation;
use crate::cli::Output;
use crate::config::Settings;
use crate::service::SupportService;
use anyhow::Result;

/// Answer one question in a fresh session and print the answer.
pub async fn run_ask(customer: &str, question: &str, settings: Settings) -> Result<()> {
    check_ready(Operation::Chat)?;

    let service = SupportService::from_settings(settings)?;
    let session = service.start_session(customer);

    let spinner = Output::spinner("Thinking...");
    let result = service.handle_turn(session, question).await;
    spinner.finish_and_clear();

    match result {
        Ok(reply) => {
            println!("\n{}\n", reply.answer);

            if !reply.tool_observations.is_empty() {
                Output::header("Tools used");
                for observation in &reply.tool_observations {
                    Output::tool_call(observation);
                }
            }

            Output::header("Details");
            Output::kv("Session", &reply.session.session_id);
            Output::kv("Tokens", &reply.usage.total_tokens.to_string());
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
