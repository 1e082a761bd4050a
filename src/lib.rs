//! Parley - customer service chat with tools and agent assist
//!
//! A customer-service chat backend: a language model answers customer
//! questions, calling web search and a knowledge base when it needs facts,
//! while human agents get summaries, suggested replies and post-conversation
//! analysis.
//!
//! # Overview
//!
//! A customer turn goes through three steps:
//! - the conversation assembler builds the prompt (system prompt, customer
//!   profile and purchases, history, the new message)
//! - the turn orchestrator calls the model with the registered tools, runs
//!   any requested tool calls, and calls the model once more for the answer
//! - the service persists the user message and final answer
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `llm` - Chat model trait, OpenAI implementation and retry policy
//! - `tools` - Tool trait, registry, invoker and the built-in tools
//! - `chat` - Messages, sessions, prompt assembly and the turn orchestrator
//! - `search` - Web search client
//! - `embedding` / `knowledge` - Knowledge base articles and semantic search
//! - `store` - Conversation documents and the customer directory
//! - `assist` - Agent assist: summaries, reply suggestions, analysis
//! - `speech` - Speech-to-text and text-to-speech
//! - `service` - Wires everything into a turn-by-turn API
//!
//! # Example
//!
//! ```rust,no_run
//! use parley::config::Settings;
//! use parley::service::SupportService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = SupportService::from_settings(Settings::load()?)?;
//!
//!     let session = service.start_session("42");
//!     let reply = service.handle_turn(session, "Where is my order?").await?;
//!     println!("{}", reply.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod assist;
pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod openai;
pub mod search;
pub mod service;
pub mod speech;
pub mod store;
pub mod tools;

pub use error::{ParleyError, Result};
