//! Conversation-related types.

use segment_agent_model::{ModelMessage, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// The human side of the conversation.
    User,
    /// The model.
    Assistant,
    /// The result of a tool invocation.
    Tool,
}

/// A message in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(ModelMessage);

impl Message {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self(ModelMessage::User(text.into()))
    }

    /// Creates a text-only assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self(ModelMessage::assistant_text(text))
    }

    /// Returns the role of this message.
    pub fn role(&self) -> Role {
        match &self.0 {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant { .. } => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the text content of this message.
    ///
    /// For an assistant message that only requested tools, this is an
    /// empty string.
    pub fn content(&self) -> &str {
        match &self.0 {
            ModelMessage::System(text) | ModelMessage::User(text) => text,
            ModelMessage::Assistant { content, .. } => content,
            ModelMessage::Tool(result) => &result.content,
        }
    }

    /// Returns the tool calls requested by an assistant message.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match &self.0 {
            ModelMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Returns the identifier of the tool call a tool message answers.
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.0 {
            ModelMessage::Tool(result) => Some(&result.id),
            _ => None,
        }
    }

    /// Returns the underlying model message.
    #[inline]
    pub fn as_model_message(&self) -> &ModelMessage {
        &self.0
    }
}

impl From<ModelMessage> for Message {
    #[inline]
    fn from(msg: ModelMessage) -> Self {
        Self(msg)
    }
}

/// The transcript of a conversation.
///
/// Messages can only be appended. The turn executor borrows the state and
/// hands back an extended copy, so pre-existing messages are never removed
/// or reordered, and a failed turn leaves the caller's state untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation that starts with one user message.
    #[inline]
    pub fn from_user_input<S: Into<String>>(input: S) -> Self {
        Self {
            messages: vec![Message::user(input)],
        }
    }

    /// Appends a user message.
    #[inline]
    pub fn push_user_input<S: Into<String>>(&mut self, input: S) {
        self.messages.push(Message::user(input));
    }

    #[inline]
    pub(crate) fn push<M: Into<Message>>(&mut self, msg: M) {
        self.messages.push(msg.into());
    }

    /// Returns the messages in order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the text of the last assistant message.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role() == Role::Assistant)
            .map(Message::content)
    }

    /// Returns `true` if `prefix` is an unchanged prefix of this state.
    pub fn extends(&self, prefix: &ConversationState) -> bool {
        self.messages.starts_with(&prefix.messages)
    }
}

impl FromIterator<Message> for ConversationState {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use segment_agent_model::ToolCallResult;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_accessors() {
        let call = ToolCallRequest {
            id: "call_1".to_owned(),
            name: "execute_query".to_owned(),
            arguments: json!({ "query": "SELECT 1" }),
        };
        let mut state = ConversationState::from_user_input("Top states");
        state.push(ModelMessage::Assistant {
            content: String::new(),
            tool_calls: vec![call.clone()],
        });
        state.push(ModelMessage::Tool(ToolCallResult {
            id: "call_1".to_owned(),
            content: "FL 120".to_owned(),
        }));
        state.push(Message::assistant("Florida leads."));

        let roles: Vec<_> = state.messages().iter().map(Message::role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(state.messages()[1].tool_calls(), &[call]);
        assert_eq!(state.messages()[2].tool_call_id(), Some("call_1"));
        assert_eq!(state.last_assistant_text(), Some("Florida leads."));
    }

    #[test]
    fn test_extends() {
        let prefix = ConversationState::from_user_input("Hi");
        let mut longer = prefix.clone();
        longer.push(Message::assistant("Hello"));
        assert!(longer.extends(&prefix));
        assert!(!prefix.extends(&longer));

        let other = ConversationState::from_user_input("Bye");
        assert!(!longer.extends(&other));
    }

    #[test]
    fn test_serde() {
        let mut state = ConversationState::from_user_input("Hi");
        state.push(Message::assistant("Hello"));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [
                    { "role": "user", "content": "Hi" },
                    { "role": "assistant", "content": { "content": "Hello" } }
                ]
            })
        );
        let back: ConversationState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
