//! Configuration module for Parley.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AssistPrompts, ChatPrompts, Prompts};
pub use settings::{
    AssistSettings, EmbeddingSettings, GeneralSettings, KnowledgeSettings, LlmSettings,
    PromptSettings, ServerSettings, Settings, SpeechSettings, StoreSettings, WebSearchSettings,
};
