//! Orchestration loop for one conversation turn.
//!
//! A turn issues one completion call with tools enabled. If the model asks
//! for tools, every requested call is invoked in order, the observations are
//! appended, and a second completion call without tools produces the answer.
//! There is never more than one round of tool calls per turn.

use super::{Message, ToolObservation};
use crate::config::LlmSettings;
use crate::error::{ParleyError, Result};
use crate::llm::{ChatModel, CompletionRequest, Usage};
use crate::tools::ToolInvoker;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// States a turn passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    AwaitingFirstResponse,
    HasToolCalls,
    InvokingTools,
    AwaitingSecondResponse,
    Done,
}

/// Completion parameters for a turn.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: String,
    pub temperature: f32,
    /// Token limit for the tool-enabled first call.
    pub max_tokens: u32,
    /// Token limit for the call that follows tool observations.
    pub final_max_tokens: u32,
    /// Hard limit for the whole turn, tool calls included.
    pub turn_timeout: Duration,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self::from_settings(&LlmSettings::default())
    }
}

impl TurnOptions {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            final_max_tokens: settings.final_max_tokens,
            turn_timeout: settings.turn_timeout(),
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// Request messages plus everything the turn appended, ending with the
    /// final assistant message.
    pub messages: Vec<Message>,
    /// Observations in the order the tools were requested.
    pub tool_observations: Vec<ToolObservation>,
    pub completion_calls: usize,
    pub usage: Usage,
    pub state_trace: Vec<TurnState>,
    /// Tool calls the model requested on the second call; these are dropped.
    pub tool_calls_ignored: usize,
}

/// Runs turns against a chat model with a fixed tool set.
pub struct TurnOrchestrator {
    model: Arc<dyn ChatModel>,
    invoker: ToolInvoker,
    options: TurnOptions,
}

impl TurnOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>, invoker: ToolInvoker, options: TurnOptions) -> Self {
        Self {
            model,
            invoker,
            options,
        }
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    /// Run one turn over the assembled `messages`.
    ///
    /// Completion failures propagate. Tool failures become observations.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn run(&self, messages: Vec<Message>) -> Result<TurnOutcome> {
        let limit = self.options.turn_timeout;
        tokio::time::timeout(limit, self.run_turn(messages))
            .await
            .map_err(|_| ParleyError::Timeout(format!("turn did not finish within {}s", limit.as_secs_f32())))?
    }

    async fn run_turn(&self, mut messages: Vec<Message>) -> Result<TurnOutcome> {
        let mut trace = vec![TurnState::AwaitingFirstResponse];
        let mut usage = Usage::default();

        let request = CompletionRequest::new(&self.options.model, messages.clone())
            .with_tools(self.invoker.registry().list_tools())
            .with_temperature(self.options.temperature)
            .with_max_tokens(self.options.max_tokens);

        let first = self.model.complete(&request).await?;
        usage += first.usage;

        if first.tool_calls.is_empty() {
            let answer = first.content_or_empty();
            messages.push(Message::assistant(answer.clone()));
            trace.push(TurnState::Done);
            debug!("Turn answered without tools");

            return Ok(TurnOutcome {
                answer,
                messages,
                tool_observations: Vec::new(),
                completion_calls: 1,
                usage,
                state_trace: trace,
                tool_calls_ignored: 0,
            });
        }

        trace.push(TurnState::HasToolCalls);
        info!("Model requested {} tool call(s)", first.tool_calls.len());
        messages.push(Message::assistant_with_tool_calls(
            first.content_or_empty(),
            first.tool_calls.clone(),
        ));

        trace.push(TurnState::InvokingTools);
        let mut observations = Vec::with_capacity(first.tool_calls.len());
        for call in &first.tool_calls {
            let observation = self.invoker.invoke(call).await;
            messages.push(observation.clone().into_message());
            observations.push(observation);
        }

        trace.push(TurnState::AwaitingSecondResponse);
        let request = CompletionRequest::new(&self.options.model, messages.clone())
            .with_temperature(self.options.temperature)
            .with_max_tokens(self.options.final_max_tokens);

        let second = self.model.complete(&request).await?;
        usage += second.usage;

        let tool_calls_ignored = second.tool_calls.len();
        if tool_calls_ignored > 0 {
            warn!(
                "Ignoring {} tool call(s) requested after tool results were supplied",
                tool_calls_ignored
            );
        }

        let answer = second.content_or_empty();
        messages.push(Message::assistant(answer.clone()));
        trace.push(TurnState::Done);

        Ok(TurnOutcome {
            answer,
            messages,
            tool_observations: observations,
            completion_calls: 2,
            usage,
            state_trace: trace,
            tool_calls_ignored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Role, ToolCallRequest};
    use crate::llm::testing::ScriptedModel;
    use crate::llm::CompletionResponse;
    use crate::tools::testing::EchoTool;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;

    fn orchestrator(model: Arc<ScriptedModel>, registry: ToolRegistry) -> TurnOrchestrator {
        let invoker = ToolInvoker::new(Arc::new(registry), Duration::from_secs(5));
        TurnOrchestrator::new(model, invoker, TurnOptions::default())
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with(EchoTool::new("search_web")).unwrap()
    }

    fn request_messages() -> Vec<Message> {
        vec![
            Message::system("You are a support agent for Contoso."),
            Message::user("Hi, when will my coffee machine arrive?"),
        ]
    }

    #[tokio::test]
    async fn test_plain_answer_uses_one_call() {
        let model = Arc::new(ScriptedModel::new(vec![CompletionResponse::text(
            "It will arrive on Friday.",
        )]));
        let outcome = orchestrator(model.clone(), registry())
            .run(request_messages())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "It will arrive on Friday.");
        assert_eq!(outcome.completion_calls, 1);
        assert_eq!(model.call_count(), 1);
        assert!(outcome.tool_observations.is_empty());
        assert_eq!(outcome.state_trace, vec![TurnState::AwaitingFirstResponse, TurnState::Done]);
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.messages[2], Message::assistant("It will arrive on Friday."));

        // Tools are offered on the first call.
        assert_eq!(model.requests()[0].tools.len(), 1);
        assert_eq!(model.requests()[0].max_tokens, 4000);
    }

    #[tokio::test]
    async fn test_tool_round_uses_two_calls() {
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "search_web",
                r#"{"query": "Contoso espresso recall", "up_to_date": true}"#,
            )]),
            CompletionResponse::text("There are no recalls for your machine."),
        ]));
        let outcome = orchestrator(model.clone(), registry())
            .run(request_messages())
            .await
            .unwrap();

        assert_eq!(outcome.completion_calls, 2);
        assert_eq!(model.call_count(), 2);
        assert_eq!(outcome.answer, "There are no recalls for your machine.");
        assert_eq!(
            outcome.state_trace,
            vec![
                TurnState::AwaitingFirstResponse,
                TurnState::HasToolCalls,
                TurnState::InvokingTools,
                TurnState::AwaitingSecondResponse,
                TurnState::Done,
            ]
        );

        let second = &model.requests()[1];
        assert!(second.tools.is_empty());
        assert_eq!(second.max_tokens, 800);

        let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(second.messages[2].tool_calls[0].id, "call_1");
        assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(
            second.messages[3].content,
            r#"{"query":"Contoso espresso recall","up_to_date":true}"#
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_back_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::tool_calls(vec![ToolCallRequest::new(
                "call_7",
                "lookup_invoice",
                r#"{"invoice": "INV-1"}"#,
            )]),
            CompletionResponse::text("I can't look up invoices, but I can help otherwise."),
        ]));
        let outcome = orchestrator(model.clone(), registry())
            .run(request_messages())
            .await
            .unwrap();

        assert_eq!(outcome.completion_calls, 2);
        assert_eq!(outcome.tool_observations.len(), 1);
        assert_eq!(outcome.tool_observations[0].tool_call_id, "call_7");
        assert_eq!(
            outcome.tool_observations[0].content,
            "Invalid function name: 'lookup_invoice'"
        );
        assert_eq!(outcome.answer, "I can't look up invoices, but I can help otherwise.");
    }

    #[tokio::test]
    async fn test_observations_follow_request_order() {
        let registry = ToolRegistry::new()
            .with(EchoTool::new("search_web"))
            .unwrap()
            .with(EchoTool::failing("search_knowledge_base", "index offline"))
            .unwrap();
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::tool_calls(vec![
                ToolCallRequest::new("a", "search_knowledge_base", r#"{"query":"warranty"}"#),
                ToolCallRequest::new("b", "search_web", r#"{"query":"warranty"}"#),
                ToolCallRequest::new("c", "nope", "{}"),
            ]),
            CompletionResponse::text("Your machine has a two year warranty."),
        ]));
        let outcome = orchestrator(model.clone(), registry)
            .run(request_messages())
            .await
            .unwrap();

        let ids: Vec<&str> = outcome
            .tool_observations
            .iter()
            .map(|o| o.tool_call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(outcome.tool_observations[0].content.starts_with("Function call `search_knowledge_base` failed"));

        // Every observation sits after the assistant message that requested it.
        let second = &model.requests()[1];
        let tool_ids: Vec<&str> = second
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(tool_ids, vec!["a", "b", "c"]);
        assert_eq!(second.messages[2].tool_calls.len(), 3);
    }

    #[tokio::test]
    async fn test_second_round_tool_calls_are_ignored() {
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::tool_calls(vec![ToolCallRequest::new("c1", "search_web", "{}")]),
            CompletionResponse {
                content: Some("Here is what I found.".to_string()),
                tool_calls: vec![ToolCallRequest::new("c2", "search_web", "{}")],
                ..Default::default()
            },
        ]));
        let outcome = orchestrator(model.clone(), registry())
            .run(request_messages())
            .await
            .unwrap();

        assert_eq!(outcome.completion_calls, 2);
        assert_eq!(model.call_count(), 2);
        assert_eq!(outcome.tool_calls_ignored, 1);
        assert_eq!(outcome.tool_observations.len(), 1);
        assert_eq!(outcome.answer, "Here is what I found.");
        assert!(!outcome.messages.last().unwrap().has_tool_calls());
    }

    #[tokio::test]
    async fn test_usage_summed_across_calls() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse {
                usage,
                ..CompletionResponse::tool_calls(vec![ToolCallRequest::new("c1", "search_web", "{}")])
            },
            CompletionResponse {
                usage,
                ..CompletionResponse::text("done")
            },
        ]));
        let outcome = orchestrator(model, registry()).run(request_messages()).await.unwrap();
        assert_eq!(outcome.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn test_completion_error_propagates() {
        let model = Arc::new(ScriptedModel::new(vec![CompletionResponse::tool_calls(vec![
            ToolCallRequest::new("c1", "search_web", "{}"),
        ])]));
        model.push_error(ParleyError::openai("model overloaded"));

        let result = orchestrator(model, registry()).run(request_messages()).await;
        assert!(matches!(result, Err(ParleyError::OpenAI { .. })));
    }

    struct StalledModel;

    #[async_trait]
    impl ChatModel for StalledModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<crate::llm::CompletionResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(crate::llm::CompletionResponse::text("too late"))
        }
    }

    #[tokio::test]
    async fn test_turn_timeout() {
        let invoker = ToolInvoker::new(Arc::new(registry()), Duration::from_secs(5));
        let options = TurnOptions {
            turn_timeout: Duration::from_millis(20),
            ..TurnOptions::default()
        };
        let orchestrator = TurnOrchestrator::new(Arc::new(StalledModel), invoker, options);

        let result = orchestrator.run(request_messages()).await;
        assert!(matches!(result, Err(ParleyError::Timeout(_))));
    }

    mod web_search {
        use super::*;
        use crate::llm::RetryPolicy;
        use crate::search::testing::{client, spawn, FakeBing};
        use crate::search::SearchRecord;
        use crate::tools::SearchWebTool;
        use serde_json::Value;
        use std::sync::atomic::Ordering;

        fn web_orchestrator(
            model: Arc<ScriptedModel>,
            endpoint: &str,
            retry: RetryPolicy,
            tool_timeout: Duration,
        ) -> TurnOrchestrator {
            let tool = SearchWebTool::new(Arc::new(client(endpoint).with_retry(retry)));
            let registry = ToolRegistry::new().with(Arc::new(tool)).unwrap();
            TurnOrchestrator::new(model, ToolInvoker::new(Arc::new(registry), tool_timeout), TurnOptions::default())
        }

        fn search_then_answer() -> Arc<ScriptedModel> {
            Arc::new(ScriptedModel::new(vec![
                CompletionResponse::tool_calls(vec![ToolCallRequest::new(
                    "call_1",
                    "search_web",
                    r#"{"query": "Essenza Mini reviews"}"#,
                )]),
                CompletionResponse::text("Reviewers call the Essenza Mini compact and quick."),
            ]))
        }

        #[tokio::test]
        async fn test_search_results_reach_second_call() {
            let fake = Arc::new(FakeBing::default());
            let endpoint = spawn(fake.clone()).await;
            let model = search_then_answer();

            let outcome = web_orchestrator(model.clone(), &endpoint, RetryPolicy::none(), Duration::from_secs(5))
                .run(request_messages())
                .await
                .unwrap();

            assert_eq!(outcome.answer, "Reviewers call the Essenza Mini compact and quick.");
            assert_eq!(outcome.completion_calls, 2);
            assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
            assert_eq!(
                fake.last_query.lock().unwrap().get("q").map(String::as_str),
                Some("Essenza Mini reviews")
            );

            assert_eq!(outcome.tool_observations.len(), 1);
            let observation = &outcome.tool_observations[0];
            assert_eq!(observation.tool_call_id, "call_1");
            assert_eq!(observation.tool_name, "search_web");

            let records: Vec<SearchRecord> = serde_json::from_str(&observation.content).unwrap();
            assert_eq!(records.len(), 3);
            assert_eq!(
                records[1],
                SearchRecord {
                    source: "Recall notice".to_string(),
                    content: "No recalls this year.".to_string(),
                    url: "https://example.com/b".to_string(),
                }
            );
            let raw: Vec<serde_json::Map<String, Value>> = serde_json::from_str(&observation.content).unwrap();
            for record in &raw {
                let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
                keys.sort_unstable();
                assert_eq!(keys, vec!["content", "source", "url"]);
            }

            let requests = model.requests();
            assert_eq!(requests.len(), 2);
            assert_eq!(requests[0].tools.len(), 1);
            assert!(requests[1].tools.is_empty());
            let tool_messages: Vec<&Message> = requests[1]
                .messages
                .iter()
                .filter(|m| m.role == Role::Tool)
                .collect();
            assert_eq!(tool_messages.len(), 1);
            assert_eq!(tool_messages[0].content, observation.content);
            assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
        }

        #[tokio::test]
        async fn test_backend_outage_becomes_failure_observation() {
            let fake = Arc::new(FakeBing {
                fail_first: usize::MAX,
                fail_status: 503,
                ..Default::default()
            });
            let endpoint = spawn(fake.clone()).await;
            let model = search_then_answer();

            let outcome = web_orchestrator(
                model.clone(),
                &endpoint,
                RetryPolicy::new(1, Duration::from_millis(5)),
                Duration::from_secs(5),
            )
            .run(request_messages())
            .await
            .unwrap();

            assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
            assert_eq!(outcome.completion_calls, 2);
            let content = &outcome.tool_observations[0].content;
            assert!(
                content.starts_with(r#"Function call `search_web` failed with arguments {"query":"Essenza Mini reviews"}! Error: "#),
                "{}",
                content
            );
            assert!(content.contains("503"));

            let tool_message = model.requests()[1]
                .messages
                .iter()
                .find(|m| m.role == Role::Tool)
                .cloned()
                .unwrap();
            assert_eq!(&tool_message.content, content);
        }

        #[tokio::test]
        async fn test_slow_backend_times_out_into_observation() {
            let fake = Arc::new(FakeBing {
                delay: Duration::from_secs(2),
                ..Default::default()
            });
            let endpoint = spawn(fake).await;
            let model = search_then_answer();

            let outcome = web_orchestrator(model, &endpoint, RetryPolicy::none(), Duration::from_millis(100))
                .run(request_messages())
                .await
                .unwrap();

            let content = &outcome.tool_observations[0].content;
            assert!(content.starts_with("Function call `search_web` failed with arguments"), "{}", content);
            assert!(content.ends_with("Error: timed out after 0.1s"), "{}", content);
            assert_eq!(outcome.answer, "Reviewers call the Essenza Mini compact and quick.");
        }
    }
}
