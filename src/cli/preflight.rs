//! Pre-flight checks before commands that call external services.
//!
//! Catches missing credentials up front instead of failing midway through
//! a conversation.

use crate::config::{Settings, WebSearchSettings};
use crate::error::{ParleyError, Result};
use crate::openai::is_api_key_configured;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Conversations and agent assist need the OpenAI key.
    Chat,
    /// Transcription and synthesis need the OpenAI key.
    Speech,
    /// Knowledge base search needs the OpenAI key for query embeddings.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation) -> Result<()> {
    match operation {
        Operation::Chat | Operation::Speech | Operation::Search => check_api_key(),
    }
}

/// Non-fatal problems with the configuration, for display as warnings.
pub fn warnings(settings: &Settings) -> Vec<String> {
    let mut warnings = Vec::new();
    if settings.web_search.enabled && settings.web_search.api_key().is_none() {
        warnings.push(format!(
            "Web search is enabled but {} is not set; search_web calls will fail.",
            WebSearchSettings::API_KEY_ENV
        ));
    }
    if !settings.web_search.enabled && !settings.knowledge.enabled {
        warnings.push("No tools are enabled; answers will rely on the model alone.".to_string());
    }
    warnings
}

fn check_api_key() -> Result<()> {
    if is_api_key_configured() {
        Ok(())
    } else {
        Err(ParleyError::Config(
            "OPENAI_API_KEY is not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        ))
    }
}
