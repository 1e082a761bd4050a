//! Interactive self-service chat.

use super::check_ready;
use crate::cli::preflight::{warnings, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::service::SupportService;
use crate::speech::{strip_citations, OpenAISpeech, TextToSpeech};
use anyhow::{Context, Result};
use console::style;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Run the interactive chat command.
pub async fn run_chat(customer: &str, session_id: Option<&str>, voice: bool, settings: Settings) -> Result<()> {
    check_ready(Operation::Chat)?;
    for warning in warnings(&settings) {
        Output::warning(&warning);
    }

    let speaker = if voice {
        let speech = OpenAISpeech::from_settings(
            &settings.speech,
            settings.llm.api_base.as_deref(),
            settings.llm.request_timeout(),
        )?;
        let dir = settings.data_dir().join("replies");
        std::fs::create_dir_all(&dir)?;
        Some((speech, dir))
    } else {
        None
    };

    let service = SupportService::from_settings(settings)?;

    let mut session = match session_id {
        Some(id) => service
            .resume_session(id)
            .await?
            .with_context(|| format!("No stored conversation with session id {}", id))?,
        None => service.start_session(customer),
    };
    if session.subject_id != customer {
        Output::warning(&format!(
            "Session {} belongs to customer {}; continuing as that customer.",
            session.session_id, session.subject_id
        ));
    }

    println!("\n{}", style("Parley Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your message, or 'exit' to quit. Use 'clear' to start a new conversation.").dim()
    );
    for message in session.transcript() {
        Output::dialogue(message.role.label(), &message.content);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut replies = 0usize;

    loop {
        print!("{} ", style("You:").green().bold());
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
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session = service.start_session(&session.subject_id);
            Output::info(&format!("Started new conversation {}.", session.session_id));
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = service.handle_turn(session.clone(), input).await;
        spinner.finish_and_clear();

        match result {
            Ok(reply) => {
                for observation in &reply.tool_observations {
                    Output::tool_call(observation);
                }
                println!();
                Output::dialogue("Assistant", &reply.answer);
                println!();
                session = reply.session;

                if let Some((speech, dir)) = &speaker {
                    replies += 1;
                    let path = dir.join(format!("{}-{}.mp3", session.session_id, replies));
                    match speak_to_file(speech, &reply.answer, &path).await {
                        Ok(()) => Output::kv("Audio", &path.display().to_string()),
                        Err(e) => Output::warning(&format!("Could not synthesize reply: {}", e)),
                    }
                }
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    if !session.is_empty() {
        Output::kv("Session", &session.session_id);
    }

    Ok(())
}

async fn speak_to_file(speech: &OpenAISpeech, text: &str, path: &Path) -> Result<()> {
    let audio = speech.synthesize(&strip_citations(text)).await?;
    tokio::fs::write(path, audio).await?;
    Ok(())
}
