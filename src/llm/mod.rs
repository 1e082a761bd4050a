//! Chat completion endpoint abstraction.
//!
//! The orchestration loop and the agent-assist operations talk to the model
//! through [`ChatModel`], so the hosted endpoint can be swapped or scripted.

mod openai;
mod retry;

pub use openai::OpenAIChatModel;
pub use retry::RetryPolicy;

use crate::chat::{Message, ToolCallRequest};
use crate::error::Result;
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Tools offered to the model. Empty disables tool calling.
    pub tools: Vec<ToolDescriptor>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the model for a JSON object instead of free text.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: 0.7,
            max_tokens: 800,
            json_response: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The model's answer to a completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: Option<String>,
    /// Tool calls in the order the model emitted them.
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// A plain text response, mostly useful for tests and scripted models.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A response that requests tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }

    pub fn content_or_empty(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

/// Trait for chat completion endpoints.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Issue one completion call.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::default();
        total += Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        };
        total += Usage {
            prompt_tokens: 150,
            completion_tokens: 30,
            total_tokens: 180,
        };
        assert_eq!(total.total_tokens, 300);
        assert_eq!(total.prompt_tokens, 250);
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")])
            .with_temperature(0.0)
            .json();
        assert!(request.tools.is_empty());
        assert!(request.json_response);
        assert_eq!(request.temperature, 0.0);
    }
}
