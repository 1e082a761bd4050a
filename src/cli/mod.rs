//! CLI module for Parley.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - customer service chat with tools and agent assist
///
/// Answers customer questions with an LLM that can search the web and a
/// knowledge base, and helps human agents with summaries and suggested replies.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive self-service conversation as a customer
    Chat {
        /// Customer id the conversation belongs to
        #[arg(long)]
        customer: String,

        /// Resume a stored session instead of starting a new one
        #[arg(long)]
        session: Option<String>,

        /// Also speak each answer to an mp3 file in the data directory
        #[arg(long)]
        voice: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        /// Customer id the question is asked for
        #[arg(long)]
        customer: String,

        /// The question
        question: String,
    },

    /// Agent-assist helpers for a human agent
    Assist {
        #[command(subcommand)]
        action: AssistAction,
    },

    /// Assign an agent and attach analysis to a stored conversation
    Finalize {
        /// Session id of the conversation
        session_id: String,

        /// Agent id to assign (picked at random when omitted)
        #[arg(long)]
        agent: Option<u32>,
    },

    /// Manage the knowledge base
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Manage customer profiles and purchases
    Customers {
        #[command(subcommand)]
        action: CustomersAction,
    },

    /// Transcribe an audio file to text
    Transcribe {
        /// Audio file (mp3, wav, m4a, webm)
        file: PathBuf,
    },

    /// Synthesize speech for a piece of text
    Speak {
        /// Text to speak
        text: String,

        /// Output mp3 file
        #[arg(short, long, default_value = "reply.mp3")]
        output: PathBuf,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AssistAction {
    /// Summarize the customer's most recent conversation
    Summary {
        #[arg(long)]
        customer: String,
    },

    /// Suggest the agent's next reply
    Reply {
        #[arg(long)]
        customer: String,

        /// Agent session whose live messages to continue from
        #[arg(long)]
        session: Option<String>,
    },

    /// Generate the customer's next message (for rehearsing agents)
    Simulate {
        #[arg(long)]
        customer: String,

        /// Agent session whose live messages to continue from
        #[arg(long)]
        session: Option<String>,
    },

    /// Chat with a simulated customer as the human agent
    Live {
        #[arg(long)]
        customer: String,

        /// Resume a stored agent session
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KbAction {
    /// Import articles from a JSON file
    Import {
        /// JSON array of {source, title, content, url}
        file: PathBuf,
    },

    /// Search the knowledge base
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value = "0.3")]
        min_score: f32,
    },

    /// Number of indexed articles
    Count,
}

#[derive(Subcommand, Debug)]
pub enum CustomersAction {
    /// Import customers and purchases from a JSON file
    Import {
        /// JSON object with "customers" and "purchases" arrays
        file: PathBuf,
    },

    /// Show a customer's profile and purchases
    Show {
        /// Customer id
        customer: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the default path
    Init,

    /// Show configuration file path
    Path,
}
