//! Agent-assist command implementation.

use super::check_ready;
use crate::chat::Role;
use crate::cli::preflight::Operation;
use crate::cli::{AssistAction, Output};
use crate::config::Settings;
use crate::service::SupportService;
use anyhow::{Context, Result};
use console::style;
use std::io::{self, BufRead, Write};

/// Run the assist command.
pub async fn run_assist(action: &AssistAction, settings: Settings) -> Result<()> {
    check_ready(Operation::Chat)?;
    let service = SupportService::from_settings(settings)?;

    match action {
        AssistAction::Summary { customer } => {
            let spinner = Output::spinner("Summarizing previous conversation...");
            let summary = service.summarize_prior(customer).await;
            spinner.finish_and_clear();

            Output::header(&format!("Previous conversation with customer {}", customer));
            println!("{}", summary?);
        }

        AssistAction::Reply { customer, session } => {
            let spinner = Output::spinner("Drafting a reply...");
            let result = service.suggest_reply(customer, session.as_deref()).await;
            spinner.finish_and_clear();

            Output::dialogue("Suggested reply", &result?);
        }

        AssistAction::Simulate { customer, session } => {
            let spinner = Output::spinner("Imagining the customer's next message...");
            let result = service.simulate_reply(customer, session.as_deref()).await;
            spinner.finish_and_clear();

            Output::dialogue("Customer", &result?);
        }

        AssistAction::Live { customer, session } => {
            run_live(&service, customer, session.as_deref()).await?;
        }
    }

    Ok(())
}

/// The agent types, a simulated customer answers, and a fresh suggestion
/// follows every answer.
async fn run_live(service: &SupportService, customer: &str, session_id: Option<&str>) -> Result<()> {
    let mut session = match session_id {
        Some(id) => service
            .resume_agent_session(id)
            .await?
            .with_context(|| format!("No stored agent session with id {}", id))?,
        None => service.start_session(customer),
    };

    let context = service.customer_context(&session.subject_id).await?;
    if let Some(profile) = &context.profile {
        Output::kv("Customer", &profile.full_name());
    }
    if let Some(prior) = &context.prior {
        Output::kv("Prior session", &prior.session_id);
    }

    println!("\n{}", style("Parley Live Assist").bold().cyan());
    println!(
        "{}\n",
        style("Type as the agent, 'suggest' to use the suggested reply, or 'exit' to quit.").dim()
    );
    for message in session.transcript() {
        let speaker = if message.role == Role::User { "Agent" } else { "Customer" };
        Output::dialogue(speaker, &message.content);
    }

    let spinner = Output::spinner("Drafting a reply...");
    let first = service.suggest_reply(&session.subject_id, session_id).await;
    spinner.finish_and_clear();
    let mut suggestion = first.unwrap_or_else(|e| {
        Output::warning(&format!("No suggestion: {}", e));
        String::new()
    });
    if !suggestion.is_empty() {
        Output::dialogue("Suggested reply", &suggestion);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("Agent:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let text = if input.eq_ignore_ascii_case("suggest") {
            if suggestion.is_empty() {
                Output::warning("No suggestion to send.");
                continue;
            }
            Output::dialogue("Agent", &suggestion);
            suggestion.clone()
        } else {
            input.to_string()
        };

        let spinner = Output::spinner("Waiting for the customer...");
        let result = service.agent_turn(session.clone(), &text).await;
        spinner.finish_and_clear();

        match result {
            Ok(reply) => {
                println!();
                Output::dialogue("Customer", &reply.customer_reply);
                println!();
                Output::dialogue("Suggested reply", &reply.suggested_reply);
                println!();
                suggestion = reply.suggested_reply;
                session = reply.session;
            }
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    if !session.is_empty() {
        Output::kv("Session", &session.session_id);
        Output::info(&format!("Run `parley finalize {}` when the call is over.", session.session_id));
    }
    Ok(())
}
