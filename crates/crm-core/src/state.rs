use crate::types::{Message, ToolCall};
use serde::{Deserialize, Serialize};

/// The history of one conversation thread.
///
/// Messages are only ever appended; there is no way to edit or drop one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    #[serde(default)]
    terminate: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state from checkpointed parts.
    pub fn from_parts(messages: Vec<Message>, terminate: bool) -> Self {
        Self { messages, terminate }
    }

    /// Start a new turn: the terminate flag belongs to the previous run and
    /// is cleared before the user message is appended.
    pub fn begin_turn(&mut self, user_message: Message) {
        self.terminate = false;
        self.messages.push(user_message);
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages appended after the first `from` ones.
    pub fn messages_since(&self, from: usize) -> &[Message] {
        &self.messages[from.min(self.messages.len())..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool calls carried by the most recent message, if any.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        self.last().map(Message::tool_calls).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn terminate(&mut self) {
        self.terminate = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_turn_clears_terminate() {
        let mut state = ConversationState::new();
        state.begin_turn(Message::user("first"));
        state.terminate();
        assert!(state.is_terminated());

        state.begin_turn(Message::user("second"));
        assert!(!state.is_terminated());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_pending_tool_calls_follow_last_message() {
        let mut state = ConversationState::new();
        assert!(state.pending_tool_calls().is_empty());

        state.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("c1", "extract_interaction_from_text", "{}")],
        ));
        assert_eq!(state.pending_tool_calls().len(), 1);

        state.push(Message::assistant("ok"));
        assert!(state.pending_tool_calls().is_empty());
    }

    #[test]
    fn test_messages_since_clamps() {
        let mut state = ConversationState::new();
        state.push(Message::user("a"));
        state.push(Message::assistant("b"));
        assert_eq!(state.messages_since(1).len(), 1);
        assert!(state.messages_since(10).is_empty());
    }
}
