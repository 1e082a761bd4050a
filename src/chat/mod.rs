//! Conversation data model, message assembly and the turn loop.

mod assemble;
mod message;
mod orchestrator;

pub use assemble::{build, system_message, trim_history, ContextBlock};
pub use message::{ConversationSession, Message, Role, ToolCallRequest, ToolObservation};
pub use orchestrator::{TurnOptions, TurnOrchestrator, TurnOutcome, TurnState};
