//! Conversation persistence and customer data.
//!
//! Conversations are stored as one document per session and replaced
//! wholesale on every save (last writer wins). Self-service chats are keyed
//! `chat_<session_id>`; transcripts recorded from a human agent's seat live
//! under `human_<session_id>`. Customer profiles and purchases feed the
//! system prompt.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::chat::{ConversationSession, Message, Role};
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Document key for a self-service session.
pub fn document_id(session_id: &str) -> String {
    ConversationKind::SelfService.document_id(session_id)
}

/// Who was in the conversation and from whose seat it was recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Customer and bot. `user` is the customer.
    #[default]
    SelfService,
    /// Human agent and customer, recorded from the agent's seat: `user` is
    /// the agent until the transcript is finalized.
    AgentAssist,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::SelfService => "self_service",
            ConversationKind::AgentAssist => "agent_assist",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "self_service" => Ok(ConversationKind::SelfService),
            "agent_assist" => Ok(ConversationKind::AgentAssist),
            other => Err(ParleyError::Store(format!("Unknown conversation kind: {}", other))),
        }
    }

    pub fn document_id(&self, session_id: &str) -> String {
        match self {
            ConversationKind::SelfService => format!("chat_{}", session_id),
            ConversationKind::AgentAssist => format!("human_{}", session_id),
        }
    }
}

/// Topic, product and sentiment extracted from a finished conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub topic: String,
    pub product: String,
    pub sentiment: String,
}

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub id: String,
    pub session_id: String,
    /// Customer the conversation belongs to.
    #[serde(rename = "customer_id")]
    pub subject_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub kind: ConversationKind,
    /// Human agent who handled the conversation, once finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ConversationAnalysis>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationDocument {
    pub fn from_session(session: &ConversationSession) -> Self {
        Self::with_kind(session, ConversationKind::SelfService)
    }

    pub fn with_kind(session: &ConversationSession, kind: ConversationKind) -> Self {
        Self {
            id: kind.document_id(&session.session_id),
            session_id: session.session_id.clone(),
            subject_id: session.subject_id.clone(),
            messages: session.messages.clone(),
            kind,
            agent_id: None,
            analysis: None,
            updated_at: Utc::now(),
        }
    }

    pub fn into_session(self) -> ConversationSession {
        ConversationSession::from_parts(self.session_id, self.subject_id, self.messages)
    }
}

/// Keyed storage for conversation documents.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Read by session id. A missing document is `Ok(None)`.
    async fn read(&self, session_id: &str) -> Result<Option<ConversationDocument>>;

    /// Create or replace the document with the same id.
    async fn upsert(&self, doc: &ConversationDocument) -> Result<()>;

    /// The customer's most recently updated self-service conversation.
    /// Agent-assist transcripts are never returned here.
    async fn latest_for_subject(&self, subject_id: &str) -> Result<Option<ConversationDocument>>;

    /// Persist a self-service session. See [`ConversationStore::save_as`].
    async fn save_session(&self, session: &ConversationSession) -> Result<ConversationDocument> {
        self.save_as(session, ConversationKind::SelfService).await
    }

    /// Persist a session's messages, keeping the kind, agent id and
    /// analysis already stored for it. `kind` applies to new documents.
    async fn save_as(&self, session: &ConversationSession, kind: ConversationKind) -> Result<ConversationDocument> {
        let doc = match self.read(&session.session_id).await? {
            Some(mut existing) => {
                existing.subject_id = session.subject_id.clone();
                existing.messages = session.messages.clone();
                existing.updated_at = Utc::now();
                existing
            }
            None => ConversationDocument::with_kind(session, kind),
        };
        self.upsert(&doc).await?;
        Ok(doc)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: Address,
}

impl CustomerProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub order_number: String,
    pub customer_id: String,
    /// Free-form product attributes (name, category, color, ...).
    #[serde(default)]
    pub product_details: Map<String, Value>,
    pub quantity: u32,
    pub total_price: f64,
    pub purchasing_date: String,
    #[serde(default)]
    pub delivered_date: Option<String>,
}

/// Customer profiles and order history.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer(&self, customer_id: &str) -> Result<Option<CustomerProfile>>;

    /// Purchases ordered by purchasing date, oldest first.
    async fn purchases(&self, customer_id: &str) -> Result<Vec<Purchase>>;

    async fn upsert_customer(&self, profile: &CustomerProfile) -> Result<()>;

    async fn add_purchase(&self, purchase: &Purchase) -> Result<()>;
}

/// Customers and purchases in one import file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerSeed {
    #[serde(default)]
    pub customers: Vec<CustomerProfile>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

impl CustomerSeed {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ParleyError::Store(format!("Invalid customer file {}: {}", path.display(), e)))
    }

    /// Write everything into `directory`. Returns (customers, purchases).
    pub async fn apply(&self, directory: &dyn CustomerDirectory) -> Result<(usize, usize)> {
        for profile in &self.customers {
            directory.upsert_customer(profile).await?;
        }
        for purchase in &self.purchases {
            directory.add_purchase(purchase).await?;
        }
        Ok((self.customers.len(), self.purchases.len()))
    }
}

/// Trade `user` and `assistant` roles. System and tool messages are left alone.
pub fn swap_roles(messages: &mut [Message]) {
    for message in messages.iter_mut() {
        message.role = match message.role {
            Role::User => Role::Assistant,
            Role::Assistant => Role::User,
            other => other,
        };
    }
}

/// Swap `user` and `assistant` roles when the transcript was recorded from
/// the human agent's seat.
///
/// Only applies to agent-assist transcripts whose first non-system message
/// is a `user` message; afterwards `user` denotes the customer. Returns
/// whether the transcript was swapped.
pub fn swap_perspective(kind: ConversationKind, messages: &mut [Message]) -> bool {
    if kind != ConversationKind::AgentAssist {
        return false;
    }
    let first = messages.iter().find(|m| m.role != Role::System);
    if first.map(|m| m.role) != Some(Role::User) {
        return false;
    }

    swap_roles(messages);
    true
}

/// Open the configured store and hand it out under both traits.
pub fn open_stores(settings: &Settings) -> Result<(Arc<dyn ConversationStore>, Arc<dyn CustomerDirectory>)> {
    match settings.store.provider.as_str() {
        "memory" => {
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store))
        }
        "sqlite" => {
            let path = settings.store_path();
            let store = Arc::new(SqliteStore::new(&path)?);
            info!("Using SQLite store at {}", path.display());
            Ok((store.clone(), store))
        }
        other => Err(ParleyError::Config(format!("Unknown store provider: {}", other))),
    }
}
