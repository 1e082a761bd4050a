//! Error types for Parley.

use thiserror::Error;

/// Library-level error type for Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Web search failed: {0}")]
    WebSearch(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Agent assist error: {0}")]
    Assist(String),

    #[error("OpenAI API error: {message}")]
    OpenAI {
        message: String,
        /// Whether the failure is worth retrying (transport level).
        transient: bool,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote service answered with 429 or a 5xx status.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ParleyError {
    /// Build an OpenAI error that should not be retried.
    pub fn openai(message: impl Into<String>) -> Self {
        ParleyError::OpenAI {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ParleyError::Timeout(_) | ParleyError::Unavailable(_) => true,
            ParleyError::OpenAI { transient, .. } => *transient,
            ParleyError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Result type alias for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
