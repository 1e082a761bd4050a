//! Builds the ordered message sequence sent to the completion endpoint.

use super::{Message, Role};
use serde::Serialize;

/// A labelled block of context appended to the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock(String);

impl ContextBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Render `value` as pretty JSON under `label`.
    pub fn json<T: Serialize + ?Sized>(label: &str, value: &T) -> crate::error::Result<Self> {
        let body = serde_json::to_string_pretty(value)?;
        Ok(Self(format!("{}:\n{}", label, body)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The system prompt followed by each context block, separated by blank lines.
pub fn system_message(system_prompt: &str, context_blocks: &[ContextBlock]) -> Message {
    let mut system = system_prompt.trim_end().to_string();
    for block in context_blocks {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(block.as_str());
    }
    Message::system(system)
}

/// Assemble the request messages for one turn.
///
/// The system prompt and context blocks become a single leading system
/// message, `history` follows verbatim and `new_user_text` comes last.
/// Nothing is deduplicated or truncated here; see [`trim_history`].
pub fn build(
    system_prompt: &str,
    context_blocks: &[ContextBlock],
    history: &[Message],
    new_user_text: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(system_message(system_prompt, context_blocks));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(new_user_text));
    messages
}

/// Keep at most `max_messages` of the most recent history.
///
/// The kept window never starts on a `tool` message, so observations are
/// never kept without the assistant message that requested them. The window
/// may therefore be shorter than `max_messages`.
pub fn trim_history(history: &[Message], max_messages: usize) -> &[Message] {
    if history.len() <= max_messages {
        return history;
    }

    let mut start = history.len() - max_messages;
    while start < history.len() && history[start].role == Role::Tool {
        start += 1;
    }
    &history[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ToolCallRequest;

    fn sample_history() -> Vec<Message> {
        vec![
            Message::user("Hi, my coffee machine is broken."),
            Message::assistant("Sorry to hear that. Which model is it?"),
            Message::user("Essenza Mini."),
            Message::assistant("Thanks, is it still under warranty?"),
        ]
    }

    #[test]
    fn test_build_orders_system_history_user() {
        let history = sample_history();
        let messages = build("You are helpful.", &[], &history, "Yes, bought last year.");

        assert_eq!(messages.len(), history.len() + 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You are helpful.");
        assert_eq!(&messages[1..=history.len()], history.as_slice());
        assert_eq!(messages.last(), Some(&Message::user("Yes, bought last year.")));
    }

    #[test]
    fn test_build_folds_context_into_system_message() {
        let profile = serde_json::json!({"customer_id": "7", "first_name": "Chloe"});
        let blocks = vec![
            ContextBlock::json("Customer Information", &profile).unwrap(),
            ContextBlock::text("Previous Purchases:\n[]"),
        ];
        let messages = build("Base prompt.", &blocks, &[], "Hello");

        let system = &messages[0].content;
        assert!(system.starts_with("Base prompt.\n\nCustomer Information:\n{"));
        assert!(system.contains("\"first_name\": \"Chloe\""));
        assert!(system.ends_with("Previous Purchases:\n[]"));
        assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[test]
    fn test_build_keeps_duplicate_history_entries() {
        let history = vec![Message::user("hello"), Message::user("hello")];
        let messages = build("", &[], &history, "hello");
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn test_json_block_renders_null_for_missing_value() {
        let block = ContextBlock::json("Customer Information", &Option::<String>::None).unwrap();
        assert_eq!(block.as_str(), "Customer Information:\nnull");
    }

    #[test]
    fn test_trim_history_never_starts_on_tool_message() {
        let history = vec![
            Message::user("news?"),
            Message::assistant_with_tool_calls("", vec![ToolCallRequest::new("c1", "search_web", "{}")]),
            Message::tool("c1", "search_web", "[]"),
            Message::assistant("Nothing today."),
        ];

        let kept = trim_history(&history, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "Nothing today.");

        let kept = trim_history(&history, 3);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].has_tool_calls());

        assert_eq!(trim_history(&history, 10).len(), 4);
    }
}
