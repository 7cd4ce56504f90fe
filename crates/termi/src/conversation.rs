//! Conversation state
//!
//! Ordered, append-only message history replayed to the model on every
//! request. Lives for one process; nothing is persisted.

use termi_llm::{ChatMessage, Role};

#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The most recent `k` messages, minus any leading `tool` messages whose
    /// assistant call fell outside the window
    pub fn last_n(&self, k: usize) -> &[ChatMessage] {
        let mut start = self.messages.len().saturating_sub(k);
        while start < self.messages.len() && self.messages[start].role == Role::Tool {
            start += 1;
        }
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use termi_llm::ToolCall;

    fn sample() -> ConversationState {
        let mut conversation = ConversationState::new();
        conversation.append(ChatMessage::user("where am I?"));
        conversation.append(ChatMessage::assistant_with_calls(
            "",
            vec![ToolCall::new("c1", "shell_cmd", json!("pwd"))],
        ));
        conversation.append(ChatMessage::tool_result("c1", "/home/user\n"));
        conversation.append(ChatMessage::assistant("You are in /home/user."));
        conversation
    }

    #[test]
    fn test_append_preserves_order() {
        let conversation = sample();
        let roles: Vec<Role> = conversation.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(conversation.len(), 4);
        assert!(!conversation.is_empty());
    }

    #[test]
    fn test_last_n_window() {
        let conversation = sample();
        assert_eq!(conversation.last_n(1).len(), 1);
        assert_eq!(conversation.last_n(100).len(), 4);
        assert!(conversation.last_n(0).is_empty());
        assert!(ConversationState::new().last_n(3).is_empty());
    }

    #[test]
    fn test_last_n_skips_orphaned_tool_message() {
        let conversation = sample();
        // Window of 2 would start at the tool message
        let window = conversation.last_n(2);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role, Role::Assistant);
    }
}
