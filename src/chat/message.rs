//! Conversation messages and sessions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a message in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Capitalized role name as used in rendered transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    /// Arguments exactly as the model emitted them.
    pub raw_arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }
}

/// The result (or failure description) of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolObservation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
}

impl ToolObservation {
    /// Convert into the `tool` message appended to the transcript.
    pub fn into_message(self) -> Message {
        Message {
            role: Role::Tool,
            content: self.content,
            tool_call_id: Some(self.tool_call_id),
            name: Some(self.tool_name),
            tool_calls: Vec::new(),
        }
    }
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Non-empty only on an assistant message that requested tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant message carrying the model's tool call requests.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this message belongs in a human-readable transcript.
    pub fn is_dialogue(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant) && !self.has_tool_calls()
    }
}

/// A conversation with one customer, identified by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    /// Identifier of the customer this conversation belongs to.
    pub subject_id: String,
    pub messages: Vec<Message>,
}

impl ConversationSession {
    /// Start a new, empty session with a generated id.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            messages: Vec::new(),
        }
    }

    /// Rebuild a session from stored parts.
    pub fn from_parts(session_id: impl Into<String>, subject_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            messages,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// User and assistant messages only, in order.
    pub fn transcript(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_dialogue())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
