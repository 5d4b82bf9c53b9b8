use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::StoreResult;
use crate::models::message::MessageRole;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A persisted conversation. Owned by exactly one user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted message row.
///
/// `content` is the flattened display string; `parts` is the JSON-serialized
/// structured representation when the turn carried one. The flattened string
/// is a cache: it must always be re-derivable from `parts` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// JSON-serialized `Vec<MessagePart>`, absent for plain-text turns.
    pub parts: Option<String>,
    pub created_at: i64,
}

/// A message row pending insertion. Id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub parts: Option<String>,
}

/// Storage abstraction for conversations and their messages.
pub trait ConversationStore: Send + Sync + 'static {
    /// Look up a conversation by id, scoped to its owner. Returns `None` both
    /// when the id is unknown and when it belongs to somebody else, so callers
    /// cannot distinguish the two.
    fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> BoxFuture<'static, StoreResult<Option<ConversationRecord>>>;

    /// Create a conversation under a caller-generated id.
    fn create_conversation(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<ConversationRecord>>;

    /// Append a batch of messages atomically (all-or-nothing).
    fn insert_messages(
        &self,
        conversation_id: &str,
        rows: Vec<NewMessage>,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// Replace the conversation title.
    fn update_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// The most recent messages of a conversation, newest first.
    fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> BoxFuture<'static, StoreResult<Vec<MessageRecord>>>;

    /// Delete a conversation and, cascading, all of its messages.
    fn delete_conversation(&self, id: &str) -> BoxFuture<'static, StoreResult<()>>;

    /// Delete a single message.
    fn delete_message(&self, id: &str) -> BoxFuture<'static, StoreResult<()>>;
}
