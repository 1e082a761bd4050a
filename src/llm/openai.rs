//! Chat completions through the OpenAI API.

use super::{ChatModel, CompletionRequest, CompletionResponse, RetryPolicy, Usage};
use crate::chat::{Message, Role, ToolCallRequest};
use crate::error::{ParleyError, Result};
use crate::openai::{create_client_with, map_error};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, FunctionCall, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// [`ChatModel`] backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAIChatModel {
    client: Client<OpenAIConfig>,
    retry: RetryPolicy,
}

impl OpenAIChatModel {
    /// Create a model client with the given base URL and request timeout.
    pub fn new(api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with(api_base, timeout)?,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request(request: &CompletionRequest) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens);

        if !request.tools.is_empty() {
            let tools = request.tools.iter().map(|t| t.to_openai()).collect::<Vec<_>>();
            args.tools(tools)
                .tool_choice(ChatCompletionToolChoiceOption::Auto);
        }

        if request.json_response {
            args.response_format(ResponseFormat::JsonObject);
        }

        args.build().map_err(|e| ParleyError::Chat(e.to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let openai_request = Self::build_request(request)?;

        debug!(
            "Chat completion: model={}, messages={}, tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .retry
            .run("chat completion", || {
                let req = openai_request.clone();
                async move {
                    self.client
                        .chat()
                        .create(req)
                        .await
                        .map_err(|e| map_error("Chat completion failed", e))
                }
            })
            .await?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::Chat("No response from model".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok(CompletionResponse {
            content: choice.message.content,
            tool_calls,
            usage,
        })
    }
}

fn to_request_message(message: &Message) -> Result<ChatCompletionRequestMessage> {
    let build_err = |e: async_openai::error::OpenAIError| ParleyError::Chat(e.to_string());

    let converted = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(build_err)?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(build_err)?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !message.content.is_empty() || !message.has_tool_calls() {
                args.content(message.content.clone());
            }
            if message.has_tool_calls() {
                let calls = message
                    .tool_calls
                    .iter()
                    .map(|call| ChatCompletionMessageToolCall {
                        id: call.id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: call.tool_name.clone(),
                            arguments: call.raw_arguments.clone(),
                        },
                    })
                    .collect::<Vec<_>>();
                args.tool_calls(calls);
            }
            args.build().map_err(build_err)?.into()
        }
        Role::Tool => {
            let id = message.tool_call_id.clone().ok_or_else(|| {
                ParleyError::Chat("tool message without tool_call_id".to_string())
            })?;
            ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(id)
                .content(message.content.clone())
                .build()
                .map_err(build_err)?
                .into()
        }
    };

    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDescriptor;

    #[test]
    fn test_build_request_with_tools() {
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::system("You are a support agent."),
                Message::user("Latest news on the Essenza Mini?"),
                Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCallRequest::new("call_1", "search_web", r#"{"query":"Essenza Mini"}"#)],
                ),
                Message::tool("call_1", "search_web", "[]"),
            ],
        )
        .with_tools(vec![ToolDescriptor::new(
            "search_web",
            "Search the web",
            serde_json::json!({"type": "object", "properties": {}}),
        )])
        .with_max_tokens(4000);

        let built = OpenAIChatModel::build_request(&request).unwrap();
        assert_eq!(built.messages.len(), 4);
        assert_eq!(built.tools.as_ref().map(|t| t.len()), Some(1));
        assert!(built.tool_choice.is_some());
        assert_eq!(built.max_completion_tokens, Some(4000));
    }

    #[test]
    fn test_build_request_without_tools_omits_tool_choice() {
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hello")]);
        let built = OpenAIChatModel::build_request(&request).unwrap();
        assert!(built.tools.is_none());
        assert!(built.tool_choice.is_none());
        assert!(built.response_format.is_none());
    }

    #[test]
    fn test_tool_message_requires_call_id() {
        let mut message = Message::tool("call_1", "search_web", "[]");
        message.tool_call_id = None;
        assert!(to_request_message(&message).is_err());
    }
}
