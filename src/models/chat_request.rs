use serde::{Deserialize, Serialize};

use super::message::MessageRole;

/// One turn carried in an inbound chat request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Inbound chat request, as handed over by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Present when the caller wants to continue an existing conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub messages: Vec<IncomingMessage>,
    /// Caller explicitly opting out of persistence.
    #[serde(default)]
    pub ephemeral: bool,
}

impl ChatRequest {
    /// Text of the most recent user message in the payload, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// Text of the first user message in the payload, if any.
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// The user turns of the payload, in order.
    pub fn user_messages(&self) -> Vec<IncomingMessage> {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .cloned()
            .collect()
    }
}

/// Caller identity resolved upstream. Absent for anonymous requests.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
    pub display_name: Option<String>,
}
