//! Conversation handling for customers and human agents.
//!
//! [`SupportService`] wires settings, the chat model, the tool set and the
//! stores together. Sessions are passed in and handed back explicitly; the
//! service keeps no per-conversation state of its own.

use crate::assist::{customer_blocks, AgentAssistant, CustomerContext};
use crate::chat::{build, trim_history, ConversationSession, Message, ToolObservation, TurnOptions, TurnOrchestrator};
use crate::config::{Prompts, Settings};
use crate::error::{ParleyError, Result};
use crate::knowledge::KnowledgeBase;
use crate::llm::{ChatModel, OpenAIChatModel, RetryPolicy, Usage};
use crate::search::WebSearchClient;
use crate::store::{open_stores, ConversationDocument, ConversationKind, ConversationStore, CustomerDirectory};
use crate::tools::{KnowledgeSearchTool, SearchWebTool, ToolInvoker, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a customer turn produced.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// The session including this turn's user and assistant messages.
    pub session: ConversationSession,
    pub answer: String,
    pub tool_observations: Vec<ToolObservation>,
    pub usage: Usage,
}

/// What an agent turn produced.
#[derive(Debug, Clone)]
pub struct AgentTurnReply {
    /// The agent-seat session: agent lines are `user`, customer lines `assistant`.
    pub session: ConversationSession,
    pub customer_reply: String,
    /// Recommended next agent reply, given the updated session.
    pub suggested_reply: String,
}

pub struct SupportService {
    settings: Settings,
    prompts: Prompts,
    orchestrator: TurnOrchestrator,
    assistant: AgentAssistant,
    conversations: Arc<dyn ConversationStore>,
    customers: Arc<dyn CustomerDirectory>,
}

impl SupportService {
    pub fn new(
        settings: Settings,
        prompts: Prompts,
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        conversations: Arc<dyn ConversationStore>,
        customers: Arc<dyn CustomerDirectory>,
    ) -> Self {
        let tool_timeout = settings.effective_tool_timeout();
        let options = TurnOptions {
            turn_timeout: settings.effective_turn_timeout(),
            ..TurnOptions::from_settings(&settings.llm)
        };
        debug!("Timeouts: tool {:?}, turn {:?}", tool_timeout, options.turn_timeout);

        let invoker = ToolInvoker::new(Arc::new(registry), tool_timeout);
        let orchestrator = TurnOrchestrator::new(model.clone(), invoker, options);
        let assistant = AgentAssistant::new(model, &settings.llm.model, prompts.clone(), settings.assist.clone());

        Self {
            settings,
            prompts,
            orchestrator,
            assistant,
            conversations,
            customers,
        }
    }

    /// Build the service from settings: OpenAI model, configured stores and
    /// the enabled tools.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let retry = settings.llm.retry_policy();
        let model = OpenAIChatModel::new(settings.llm.api_base.as_deref(), settings.llm.request_timeout())?
            .with_retry(retry);

        let (conversations, customers) = open_stores(&settings)?;
        let registry = Self::default_tools(&settings, retry)?;
        info!("Tools enabled: {:?}", registry);

        Ok(Self::new(settings, prompts, Arc::new(model), registry, conversations, customers))
    }

    fn default_tools(settings: &Settings, retry: RetryPolicy) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();

        if settings.web_search.enabled {
            if settings.web_search.api_key().is_none() {
                warn!(
                    "Web search is enabled but {} is not set; search_web calls will fail",
                    crate::config::WebSearchSettings::API_KEY_ENV
                );
            }
            let client = WebSearchClient::from_settings(&settings.web_search)?.with_retry(retry);
            registry.register(Arc::new(SearchWebTool::new(Arc::new(client))))?;
        }

        if settings.knowledge.enabled {
            let tool = KnowledgeSearchTool::new(KnowledgeBase::from_settings(settings)?)
                .with_max_results(settings.knowledge.max_results)
                .with_min_score(settings.knowledge.min_score);
            registry.register(Arc::new(tool))?;
        }

        Ok(registry)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn assistant(&self) -> &AgentAssistant {
        &self.assistant
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn customers(&self) -> &Arc<dyn CustomerDirectory> {
        &self.customers
    }

    /// A fresh session. Nothing is stored until the first turn.
    pub fn start_session(&self, subject_id: &str) -> ConversationSession {
        ConversationSession::new(subject_id)
    }

    /// Load a stored self-service session, `None` if it was never saved.
    pub async fn resume_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        self.resume_kind(session_id, ConversationKind::SelfService).await
    }

    /// Load a stored agent-assist session, `None` if it was never saved.
    pub async fn resume_agent_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        self.resume_kind(session_id, ConversationKind::AgentAssist).await
    }

    async fn resume_kind(&self, session_id: &str, kind: ConversationKind) -> Result<Option<ConversationSession>> {
        match self.conversations.read(session_id).await? {
            Some(doc) if doc.kind != kind => Err(ParleyError::InvalidInput(format!(
                "session {} is a {} conversation",
                session_id,
                doc.kind.as_str()
            ))),
            doc => Ok(doc.map(ConversationDocument::into_session)),
        }
    }

    /// Answer one customer message and persist the updated session.
    ///
    /// Only the user message and the final answer are added to the session;
    /// tool calls and observations are reported in the reply but not kept.
    #[instrument(skip(self, session, user_text), fields(session = %session.session_id, customer = %session.subject_id))]
    pub async fn handle_turn(&self, mut session: ConversationSession, user_text: &str) -> Result<TurnReply> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(ParleyError::InvalidInput("message is empty".to_string()));
        }

        let customer_id = session.subject_id.as_str();
        let (profile, purchases) = futures::try_join!(
            self.customers.customer(customer_id),
            self.customers.purchases(customer_id),
        )?;
        if profile.is_none() {
            warn!("No profile found for customer {}", customer_id);
        }
        let blocks = customer_blocks(&self.prompts.chat, profile.as_ref(), &purchases)?;

        let history = match self.settings.llm.max_history_messages {
            Some(max) => trim_history(&session.messages, max),
            None => &session.messages,
        };
        let messages = build(&self.prompts.chat_system(), &blocks, history, user_text);

        let outcome = self.orchestrator.run(messages).await?;

        session.push(Message::user(user_text));
        session.push(Message::assistant(outcome.answer.clone()));
        self.conversations.save_session(&session).await?;

        info!(
            "Turn done: {} completion call(s), {} tool call(s), {} tokens",
            outcome.completion_calls,
            outcome.tool_observations.len(),
            outcome.usage.total_tokens
        );

        Ok(TurnReply {
            session,
            answer: outcome.answer,
            tool_observations: outcome.tool_observations,
            usage: outcome.usage,
        })
    }

    /// Profile, purchases and prior conversation for the agent-assist views.
    pub async fn customer_context(&self, customer_id: &str) -> Result<CustomerContext> {
        CustomerContext::load(self.customers.as_ref(), self.conversations.as_ref(), customer_id).await
    }

    /// One turn of a human agent's live chat with a simulated customer.
    ///
    /// The agent's text is appended as `user` and the simulated customer's
    /// answer as `assistant`; the session is stored as agent-assist so it is
    /// never mistaken for the customer's prior conversation. Only the live
    /// messages are sent; the prior conversation reaches the model through
    /// the prompt alone.
    #[instrument(skip(self, session, agent_text), fields(session = %session.session_id, customer = %session.subject_id))]
    pub async fn agent_turn(&self, mut session: ConversationSession, agent_text: &str) -> Result<AgentTurnReply> {
        let agent_text = agent_text.trim();
        if agent_text.is_empty() {
            return Err(ParleyError::InvalidInput("message is empty".to_string()));
        }
        if let Some(doc) = self.conversations.read(&session.session_id).await? {
            if doc.kind != ConversationKind::AgentAssist {
                return Err(ParleyError::InvalidInput(format!(
                    "session {} is not an agent session",
                    session.session_id
                )));
            }
            if doc.analysis.is_some() {
                return Err(ParleyError::InvalidInput(format!(
                    "session {} is already finalized",
                    session.session_id
                )));
            }
        }

        let context = self.customer_context(&session.subject_id).await?;

        session.push(Message::user(agent_text));
        let customer_reply = self.assistant.simulate_customer(&context, &session.messages).await?;
        session.push(Message::assistant(customer_reply.clone()));
        self.conversations
            .save_as(&session, ConversationKind::AgentAssist)
            .await?;

        let suggested_reply = self.assistant.recommend_reply(&context, &session.messages).await?;
        info!("Agent turn done: {} live message(s)", session.messages.len());

        Ok(AgentTurnReply {
            session,
            customer_reply,
            suggested_reply,
        })
    }

    /// Live messages of an agent session, empty when there is none yet.
    async fn live_messages(&self, agent_session: Option<&str>) -> Result<Vec<Message>> {
        match agent_session {
            Some(id) => Ok(self
                .resume_agent_session(id)
                .await?
                .map(|s| s.messages)
                .unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Recommended next agent reply for the customer.
    pub async fn suggest_reply(&self, customer_id: &str, agent_session: Option<&str>) -> Result<String> {
        let context = self.customer_context(customer_id).await?;
        let live = self.live_messages(agent_session).await?;
        self.assistant.recommend_reply(&context, &live).await
    }

    /// What the simulated customer would say next.
    pub async fn simulate_reply(&self, customer_id: &str, agent_session: Option<&str>) -> Result<String> {
        let context = self.customer_context(customer_id).await?;
        let live = self.live_messages(agent_session).await?;
        self.assistant.simulate_customer(&context, &live).await
    }

    /// Summary of the customer's most recent self-service conversation.
    pub async fn summarize_prior(&self, customer_id: &str) -> Result<String> {
        let prior = self
            .conversations
            .latest_for_subject(customer_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound(format!("no conversation for customer {}", customer_id)))?;
        self.assistant.summarize(&prior.messages).await
    }

    /// Assign the agent and attach analysis for a finished session, swapping
    /// agent-assist transcripts to the customer's perspective.
    pub async fn finalize(&self, session_id: &str, agent_id: Option<u32>) -> Result<ConversationDocument> {
        self.assistant
            .finalize(self.conversations.as_ref(), session_id, agent_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Role, ToolCallRequest};
    use crate::llm::testing::ScriptedModel;
    use crate::llm::CompletionResponse;
    use crate::store::{CustomerProfile, MemoryStore, Purchase};
    use crate::tools::testing::EchoTool;

    fn service(model: Arc<ScriptedModel>, store: Arc<MemoryStore>) -> SupportService {
        let settings = Settings::default();
        let prompts = Prompts::load(None, Some(&settings.prompts.variables)).unwrap();
        let registry = ToolRegistry::new().with(EchoTool::new("search_web")).unwrap();
        SupportService::new(settings, prompts, model, registry, store.clone(), store)
    }

    async fn seed_customer(store: &MemoryStore) {
        store
            .upsert_customer(&CustomerProfile {
                customer_id: "7".to_string(),
                first_name: "Chloe".to_string(),
                last_name: "Martin".to_string(),
                email: "chloe@example.com".to_string(),
                phone_number: String::new(),
                address: Default::default(),
            })
            .await
            .unwrap();
        store
            .add_purchase(&Purchase {
                order_number: "A-100".to_string(),
                customer_id: "7".to_string(),
                product_details: serde_json::json!({"name": "Essenza Mini"})
                    .as_object()
                    .cloned()
                    .unwrap(),
                quantity: 1,
                total_price: 99.0,
                purchasing_date: "2024-03-01".to_string(),
                delivered_date: Some("2024-03-04".to_string()),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_turn_injects_customer_context() {
        let store = Arc::new(MemoryStore::new());
        seed_customer(&store).await;
        let model = Arc::new(ScriptedModel::new(vec![CompletionResponse::text(
            "Your Essenza Mini was delivered on March 4th.",
        )]));
        let service = service(model.clone(), store);

        let session = service.start_session("7");
        let reply = service.handle_turn(session, "When did my machine arrive?").await.unwrap();
        assert_eq!(reply.answer, "Your Essenza Mini was delivered on March 4th.");

        let system = &model.requests()[0].messages[0].content;
        assert!(system.contains("assistant for Contoso"));
        assert!(system.contains("Customer Information:\n{"));
        assert!(system.contains("Previous Purchases the customer made:\n["));
        assert!(system.contains("\"order_number\": \"A-100\""));
    }

    #[tokio::test]
    async fn test_only_dialogue_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::tool_calls(vec![ToolCallRequest::new(
                "c1",
                "search_web",
                r#"{"query": "Contoso news"}"#,
            )]),
            CompletionResponse::text("Contoso launched a new grinder."),
        ]));
        let service = service(model, store.clone());

        let session = service.start_session("7");
        let session_id = session.session_id.clone();
        let reply = service.handle_turn(session, "Any Contoso news?").await.unwrap();

        assert_eq!(reply.tool_observations.len(), 1);
        let stored = store.read(&session_id).await.unwrap().unwrap();
        let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(stored.messages[1].content, "Contoso launched a new grinder.");
        assert_eq!(reply.session.messages, stored.messages);
    }

    #[tokio::test]
    async fn test_history_carries_into_next_turn() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("Hello Chloe!"),
            CompletionResponse::text("You're welcome."),
        ]));
        let service = service(model.clone(), store);

        let session = service.start_session("7");
        let reply = service.handle_turn(session, "Hi").await.unwrap();
        let reply = service.handle_turn(reply.session, "Thanks").await.unwrap();

        assert_eq!(reply.session.messages.len(), 4);
        let second = &model.requests()[1];
        let contents: Vec<&str> = second.messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Hello Chloe!", "Thanks"]);
    }

    #[tokio::test]
    async fn test_resume_session() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![CompletionResponse::text("Hi!")]));
        let service = service(model, store);

        assert!(service.resume_session("unknown").await.unwrap().is_none());

        let reply = service
            .handle_turn(service.start_session("7"), "Hello")
            .await
            .unwrap();
        let resumed = service
            .resume_session(&reply.session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed, reply.session);
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_model_call() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![]));
        let service = service(model.clone(), store);

        let result = service.handle_turn(service.start_session("7"), "   ").await;
        assert!(matches!(result, Err(ParleyError::InvalidInput(_))));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_finalize_after_self_service_turn_keeps_customer_as_user() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("Sorry, let me check."),
            CompletionResponse::text(r#"{"topic": "delivery", "product": "unknown", "sentiment": "upset"}"#),
        ]));
        let service = service(model, store.clone());

        let reply = service
            .handle_turn(service.start_session("7"), "My order never arrived")
            .await
            .unwrap();
        let doc = service.finalize(&reply.session.session_id, None).await.unwrap();

        assert_eq!(doc.messages[0].role, Role::User);
        assert_eq!(doc.messages[0].content, "My order never arrived");
        assert_eq!(doc.messages[1].role, Role::Assistant);
        assert_eq!(doc.analysis.unwrap().topic, "delivery");
    }

    #[tokio::test]
    async fn test_agent_turn_records_live_chat_apart_from_prior() {
        let store = Arc::new(MemoryStore::new());
        seed_customer(&store).await;
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("Sorry, let me check."),
            CompletionResponse::text("My Essenza Mini never showed up."),
            CompletionResponse::text("I'm sorry Chloe, let me look up order A-100."),
        ]));
        let service = service(model.clone(), store.clone());

        let prior = service
            .handle_turn(service.start_session("7"), "My order never arrived")
            .await
            .unwrap();
        let reply = service
            .agent_turn(service.start_session("7"), "Hello, this is Contoso support. How can I help?")
            .await
            .unwrap();

        assert_eq!(reply.customer_reply, "My Essenza Mini never showed up.");
        assert_eq!(reply.suggested_reply, "I'm sorry Chloe, let me look up order A-100.");
        let roles: Vec<Role> = reply.session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        let requests = model.requests();
        let simulate = &requests[1];
        assert!(simulate.messages[0].content.contains("User: My order never arrived"));
        assert_eq!(simulate.messages.len(), 2);
        assert_eq!(simulate.messages[1].role, Role::User);
        assert_eq!(simulate.messages[1].content, "Hello, this is Contoso support. How can I help?");

        let recommend = &requests[2];
        let live: Vec<(Role, &str)> = recommend.messages[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            live,
            vec![
                (Role::Assistant, "Hello, this is Contoso support. How can I help?"),
                (Role::User, "My Essenza Mini never showed up."),
            ]
        );

        let stored = store.read(&reply.session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.kind, ConversationKind::AgentAssist);
        assert_eq!(stored.id, format!("human_{}", reply.session.session_id));
        let latest = store.latest_for_subject("7").await.unwrap().unwrap();
        assert_eq!(latest.session_id, prior.session.session_id);
    }

    #[tokio::test]
    async fn test_agent_turn_then_finalize_puts_customer_first_as_user() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("My grinder stopped working."),
            CompletionResponse::text("Have you tried cleaning the burrs?"),
            CompletionResponse::text(r#"{"topic": "support", "product": "grinder", "sentiment": "upset"}"#),
        ]));
        let service = service(model, store);

        let reply = service
            .agent_turn(service.start_session("7"), "Hello, Contoso support here.")
            .await
            .unwrap();
        let doc = service.finalize(&reply.session.session_id, Some(5)).await.unwrap();
        assert_eq!(doc.messages[0].role, Role::Assistant);
        assert_eq!(doc.messages[1].role, Role::User);
        assert_eq!(doc.messages[1].content, "My grinder stopped working.");

        let err = service
            .agent_turn(reply.session, "Anything else?")
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_sessions_do_not_cross_kinds() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("Hi!"),
            CompletionResponse::text("It broke."),
            CompletionResponse::text("Sorry to hear that."),
        ]));
        let service = service(model.clone(), store);

        let chat = service.handle_turn(service.start_session("7"), "Hello").await.unwrap();
        assert!(service.resume_agent_session(&chat.session.session_id).await.is_err());
        let err = service.agent_turn(chat.session, "Hello, support here.").await.unwrap_err();
        assert!(matches!(err, ParleyError::InvalidInput(_)));
        assert_eq!(model.call_count(), 1);

        let live = service
            .agent_turn(service.start_session("7"), "Hello, support here.")
            .await
            .unwrap();
        assert!(service.resume_session(&live.session.session_id).await.is_err());
        let resumed = service
            .resume_agent_session(&live.session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.messages, live.session.messages);
    }

    #[tokio::test]
    async fn test_suggest_reply_without_live_session_sends_prompt_only() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![
            CompletionResponse::text("Sorry, let me check."),
            CompletionResponse::text("Hi, I see your order did not arrive."),
        ]));
        let service = service(model.clone(), store);

        service
            .handle_turn(service.start_session("7"), "My order never arrived")
            .await
            .unwrap();
        let suggestion = service.suggest_reply("7", None).await.unwrap();
        assert_eq!(suggestion, "Hi, I see your order did not arrive.");

        let request = &model.requests()[1];
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages[0].content.contains("User: My order never arrived"));
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(vec![]));
        model.push_error(ParleyError::openai("bad request"));
        let service = service(model, store.clone());

        let session = service.start_session("7");
        let session_id = session.session_id.clone();
        assert!(service.handle_turn(session, "Hello").await.is_err());
        assert!(store.read(&session_id).await.unwrap().is_none());
    }
}
