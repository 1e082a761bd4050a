//! Configuration settings for Parley.

use crate::llm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub speech: SpeechSettings,
    pub web_search: WebSearchSettings,
    pub knowledge: KnowledgeSettings,
    pub store: StoreSettings,
    pub assist: AssistSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.parley".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Chat completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model (or deployment) name used for customer turns.
    pub model: String,
    /// Override for the API base URL (OpenAI-compatible endpoints).
    pub api_base: Option<String>,
    /// Sampling temperature for customer turns.
    pub temperature: f32,
    /// Token limit for the tool-enabled first call.
    pub max_tokens: u32,
    /// Token limit for the follow-up call that produces the final answer.
    pub final_max_tokens: u32,
    /// Timeout for a single completion request.
    pub request_timeout_secs: u64,
    /// Retries for transient completion failures.
    pub max_retries: u32,
    /// Base delay between retries; doubles on each attempt.
    pub retry_backoff_ms: u64,
    /// Hard limit for a whole turn, tool calls included. Raised when too
    /// short for the completion and tool retry budgets; see
    /// [`Settings::effective_turn_timeout`].
    pub turn_timeout_secs: u64,
    /// Timeout for a single tool invocation. Raised when too short for a
    /// retried web search; see [`Settings::effective_tool_timeout`].
    pub tool_timeout_secs: u64,
    /// Keep at most this many history messages per turn. None keeps everything.
    pub max_history_messages: Option<usize>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_base: None,
            temperature: 0.3,
            max_tokens: 4000,
            final_max_tokens: 800,
            request_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            turn_timeout_secs: 120,
            tool_timeout_secs: 20,
            max_history_messages: None,
        }
    }
}

impl LlmSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Retry policy shared by completions and web searches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff())
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Speech-to-text and text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Model used to transcribe recorded audio.
    pub transcription_model: String,
    /// Model used to synthesize spoken replies.
    pub tts_model: String,
    /// Voice for synthesized replies (alloy, echo, fable, onyx, nova, shimmer).
    pub voice: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            transcription_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            voice: "echo".to_string(),
        }
    }
}

/// Web search tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    /// Register the `search_web` tool.
    pub enabled: bool,
    /// Search endpoint (Bing Custom Search compatible).
    pub endpoint: String,
    /// Custom search configuration id, sent as `customconfig`.
    pub custom_config_id: Option<String>,
    /// Number of results requested per query.
    pub count: u32,
    /// Timeout for a single search request.
    pub timeout_secs: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.bing.microsoft.com/v7.0/custom/search".to_string(),
            custom_config_id: None,
            count: 5,
            timeout_secs: 10,
        }
    }
}

impl WebSearchSettings {
    /// Environment variable holding the search subscription key.
    pub const API_KEY_ENV: &'static str = "PARLEY_WEB_SEARCH_KEY";

    pub fn api_key(&self) -> Option<String> {
        std::env::var(Self::API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Knowledge base search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    /// Register the `search_knowledge_base` tool.
    pub enabled: bool,
    /// Default number of articles returned per search.
    pub max_results: usize,
    /// Minimum cosine similarity for an article to be returned.
    pub min_score: f32,
    /// Path to the SQLite article index.
    pub sqlite_path: String,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 5,
            min_score: 0.3,
            sqlite_path: "~/.parley/knowledge.db".to_string(),
        }
    }
}

/// Conversation and customer store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.parley/conversations.db".to_string(),
        }
    }
}

/// Sampling settings for the agent-assist operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistSettings {
    pub summary_temperature: f32,
    pub summary_max_tokens: u32,
    pub reply_temperature: f32,
    pub reply_max_tokens: u32,
    pub analysis_temperature: f32,
    pub analysis_max_tokens: u32,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            summary_temperature: 0.0,
            summary_max_tokens: 300,
            reply_temperature: 0.5,
            reply_max_tokens: 800,
            analysis_temperature: 0.0,
            analysis_max_tokens: 300,
        }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: HashMap<String, String>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        let mut variables = HashMap::new();
        variables.insert("company".to_string(), "Contoso".to_string());
        Self {
            custom_dir: None,
            variables,
        }
    }
}

impl Settings {
    /// Tool timeout actually applied: at least a web search with all of
    /// its retries, when web search is enabled.
    pub fn effective_tool_timeout(&self) -> Duration {
        let configured = self.llm.tool_timeout();
        if !self.web_search.enabled {
            return configured;
        }
        configured.max(self.llm.retry_policy().budget(self.web_search.timeout()))
    }

    /// Turn timeout actually applied: at least two retried completion calls
    /// and one round of tool calls.
    pub fn effective_turn_timeout(&self) -> Duration {
        let completion = self.llm.retry_policy().budget(self.llm.request_timeout());
        self.llm
            .turn_timeout()
            .max(completion * 2 + self.effective_tool_timeout())
    }

    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded conversation store path.
    pub fn store_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }

    /// Get the expanded knowledge index path.
    pub fn knowledge_path(&self) -> PathBuf {
        Self::expand_path(&self.knowledge.sqlite_path)
    }
}
