//! Agent-assist operations for a human support agent.
//!
//! When a human takes over from the self-service bot, these operations
//! summarise what happened before, suggest the next reply, simulate a
//! customer for training, and analyse finished conversations. Each
//! operation is a single completion call with no tools.

mod context;

pub use context::{customer_blocks, CustomerContext};

use crate::chat::{system_message, Message};
use crate::config::{AssistSettings, Prompts};
use crate::error::{ParleyError, Result};
use crate::llm::{ChatModel, CompletionRequest};
use crate::store::{swap_perspective, swap_roles, ConversationAnalysis, ConversationDocument, ConversationStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Render messages as `Role: content` lines, skipping system and tool traffic.
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.is_dialogue())
        .map(|m| format!("{}: {}\n", m.role.label(), m.content))
        .collect()
}

pub struct AgentAssistant {
    model: Arc<dyn ChatModel>,
    model_name: String,
    prompts: Prompts,
    settings: AssistSettings,
}

impl AgentAssistant {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>, prompts: Prompts, settings: AssistSettings) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            prompts,
            settings,
        }
    }

    fn render(&self, template: &str, transcript: &str) -> String {
        let vars = HashMap::from([("transcript".to_string(), transcript.to_string())]);
        self.prompts.render_with_custom(template, &vars)
    }

    async fn complete(&self, messages: Vec<Message>, temperature: f32, max_tokens: u32, json: bool) -> Result<String> {
        let mut request = CompletionRequest::new(&self.model_name, messages)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);
        if json {
            request = request.json();
        }
        let response = self.model.complete(&request).await?;
        Ok(response.content_or_empty())
    }

    /// Key-point summary of a prior conversation.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let transcript = format_transcript(messages);
        if transcript.is_empty() {
            return Err(ParleyError::Assist("conversation has no messages to summarize".to_string()));
        }

        let assist = &self.prompts.assist;
        let request = vec![
            Message::system(self.render(&assist.summary_system, "")),
            Message::user(self.render(&assist.summary_user, &transcript)),
        ];
        self.complete(
            request,
            self.settings.summary_temperature,
            self.settings.summary_max_tokens,
            false,
        )
        .await
    }

    /// Suggest the human agent's next reply in the live conversation.
    ///
    /// `live` is the agent-seat transcript (agent lines are `user`). The
    /// model speaks for the agent here, so roles are traded before sending.
    #[instrument(skip_all, fields(customer = %context.customer_id, live = live.len()))]
    pub async fn recommend_reply(&self, context: &CustomerContext, live: &[Message]) -> Result<String> {
        let mut live = live.to_vec();
        swap_roles(&mut live);
        let request = self.with_customer(&self.prompts.assist.reply_system, context, &live)?;
        self.complete(
            request,
            self.settings.reply_temperature,
            self.settings.reply_max_tokens,
            false,
        )
        .await
    }

    /// Reply as the customer would, for agent training. `live` is the
    /// agent-seat transcript, so the model plays `assistant`.
    #[instrument(skip_all, fields(customer = %context.customer_id, live = live.len()))]
    pub async fn simulate_customer(&self, context: &CustomerContext, live: &[Message]) -> Result<String> {
        let request = self.with_customer(&self.prompts.assist.simulate_system, context, live)?;
        self.complete(
            request,
            self.settings.reply_temperature,
            self.settings.reply_max_tokens,
            false,
        )
        .await
    }

    fn with_customer(&self, template: &str, context: &CustomerContext, live: &[Message]) -> Result<Vec<Message>> {
        let prior = context
            .prior
            .as_ref()
            .map(|doc| format_transcript(&doc.messages))
            .unwrap_or_default();
        let system = self.render(template, &prior);
        let blocks = context.blocks(&self.prompts.chat)?;

        let mut messages = Vec::with_capacity(live.len() + 1);
        messages.push(system_message(&system, &blocks));
        messages.extend(live.iter().filter(|m| m.is_dialogue()).cloned());
        Ok(messages)
    }

    /// Extract topic, product and sentiment from a conversation.
    #[instrument(skip_all, fields(messages = messages.len()))]
    pub async fn analyze(&self, messages: &[Message]) -> Result<ConversationAnalysis> {
        let assist = &self.prompts.assist;
        let request = vec![
            Message::system(self.render(&assist.analysis_system, "")),
            Message::user(self.render(&assist.analysis_user, &format_transcript(messages))),
        ];
        let raw = self
            .complete(
                request,
                self.settings.analysis_temperature,
                self.settings.analysis_max_tokens,
                true,
            )
            .await?;

        serde_json::from_str(&raw)
            .map_err(|e| ParleyError::Assist(format!("analysis is not valid JSON ({}): {}", e, raw)))
    }

    /// Prepare a finished conversation for analytics.
    ///
    /// Agent-assist transcripts are swapped to the customer's perspective
    /// the first time they are finalized; self-service chats keep their
    /// roles. Assigns an agent id if none is stored, attaches the analysis
    /// and replaces the stored document.
    #[instrument(skip(self, store))]
    pub async fn finalize(
        &self,
        store: &dyn ConversationStore,
        session_id: &str,
        agent_id: Option<u32>,
    ) -> Result<ConversationDocument> {
        let mut doc = store
            .read(session_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound(format!("conversation {}", session_id)))?;

        if doc.analysis.is_none() && swap_perspective(doc.kind, &mut doc.messages) {
            debug!("Swapped roles for {}", doc.id);
        }
        if doc.agent_id.is_none() {
            doc.agent_id = Some(agent_id.unwrap_or_else(pick_agent_id));
        }

        doc.analysis = Some(self.analyze(&doc.messages).await?);
        doc.updated_at = chrono::Utc::now();
        store.upsert(&doc).await?;

        info!("Finalized conversation {} for agent {:?}", doc.id, doc.agent_id);
        Ok(doc)
    }
}

/// Agent ids 1-9 stand in for a real roster.
fn pick_agent_id() -> u32 {
    (Uuid::new_v4().as_bytes()[0] % 9) as u32 + 1
}
