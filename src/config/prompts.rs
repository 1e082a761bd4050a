//! Prompt templates for Parley.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub chat: ChatPrompts,
    pub assist: AssistPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the self-service chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPrompts {
    pub system: String,
    /// Label for the serialized customer profile context block.
    pub customer_label: String,
    /// Label for the serialized purchase history context block.
    pub purchases_label: String,
}

impl Default for ChatPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a helpful customer service assistant for {{company}}. You help customers find information about {{company}}, its products and the brands it owns.

IMPORTANT: First work out what the customer is really asking, using their intent and the conversation so far, then decide whether a tool is needed. Think step by step.
- Only call tools with arguments taken verbatim from the customer or from the output of other tools.
- Use 'search_knowledge_base' for questions about policies, orders, returns, warranties and support procedures.
- Use 'search_web' for questions about {{company}}, its products or brands that the knowledge base does not cover, or that need up-to-date information.
- When you used a source, briefly remind the customer at the end of your answer which URL the information came from.
- If the question is unrelated to {{company}}, answer directly from your own knowledge without calling any tool.
- If the question is about a competitor of {{company}}, politely decline to answer."#
                .to_string(),
            customer_label: "Customer Information".to_string(),
            purchases_label: "Previous Purchases the customer made".to_string(),
        }
    }
}

/// Prompts for the agent-assist operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistPrompts {
    pub summary_system: String,
    pub summary_user: String,
    pub reply_system: String,
    pub simulate_system: String,
    pub analysis_system: String,
    pub analysis_user: String,
}

impl Default for AssistPrompts {
    fn default() -> Self {
        Self {
            summary_system: r#"You are a helpful customer service representative who is good at reading a prior customer-agent conversation and writing a key-point summary. The key points are: 'Issue reported', 'Help already provided', 'What the customer expects next' and 'Conversation language'."#
                .to_string(),
            summary_user: "Summarize the following conversation:\n\n{{transcript}}".to_string(),
            reply_system: r#"You are a senior customer service agent for {{company}} who is good at giving the next reply that keeps a conversation engaging and solves the customer's problem.
You were forwarded an existing conversation handled by a junior agent, together with the customer's information and previous purchases.
This is a live chat, so expect a quick response from the customer and do not reply as if the customer were offline. You open the conversation with the customer.

The existing conversation:

{{transcript}}"#
                .to_string(),
            simulate_system: r#"You are in a role-playing exercise simulating what a real person would say in a customer service conversation with {{company}}.
The user plays a friendly customer service agent and you play a real-world, grumpy customer looking for help.
Finish the conversation within 3 turns, either happily accepting the help offered or leaving the conversation with a negative sentiment.

The prior conversation with the company:

{{transcript}}"#
                .to_string(),
            analysis_system: r#"You are a customer service analyst who reviews customer-agent conversations about {{company}} products and extracts the topic of the conversation, the product it is about and the customer's sentiment.
Allowed values:
sentiment = ['positive', 'negative', 'neutral', 'mixed', 'content', 'upset', 'angry', 'frustrated', 'happy', 'disappointed', 'confused']
topic = ['churn', 'assistance', 'support', 'information', 'billing', 'payment', 'account', 'service', 'delivery', 'damages', 'quality', 'brand image', 'nutrition information', 'health issues', 'sustainability']
Output a JSON object with the keys "topic", "product" and "sentiment"."#
                .to_string(),
            analysis_user: "Analyse the following conversation:\n\n{{transcript}}".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let chat_path = custom_path.join("chat.toml");
            if chat_path.exists() {
                let content = std::fs::read_to_string(&chat_path)?;
                prompts.chat = toml::from_str(&content)?;
            }

            let assist_path = custom_path.join("assist.toml");
            if assist_path.exists() {
                let content = std::fs::read_to_string(&assist_path)?;
                prompts.assist = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// The self-service system prompt with config variables applied.
    pub fn chat_system(&self) -> String {
        Self::render(&self.chat.system, &self.variables)
    }
}
