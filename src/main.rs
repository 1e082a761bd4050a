//! Parley CLI entry point.

use anyhow::Result;
use clap::Parser;
use parley::cli::{commands, Cli, Commands};
use parley::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging; -v flags override the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("parley={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Chat {
            customer,
            session,
            voice,
        } => {
            commands::run_chat(customer, session.as_deref(), *voice, settings).await?;
        }

        Commands::Ask { customer, question } => {
            commands::run_ask(customer, question, settings).await?;
        }

        Commands::Assist { action } => {
            commands::run_assist(action, settings).await?;
        }

        Commands::Finalize { session_id, agent } => {
            commands::run_finalize(session_id, *agent, settings).await?;
        }

        Commands::Kb { action } => {
            commands::run_kb(action, settings).await?;
        }

        Commands::Customers { action } => {
            commands::run_customers(action, settings).await?;
        }

        Commands::Transcribe { file } => {
            commands::run_transcribe(file, settings).await?;
        }

        Commands::Speak { text, output } => {
            commands::run_speak(text, output, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings)?;
        }
    }

    Ok(())
}
