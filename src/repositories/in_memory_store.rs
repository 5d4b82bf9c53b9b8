use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use super::conversation_store::{
    BoxFuture, ConversationRecord, ConversationStore, MessageRecord, NewMessage,
};
use super::error::{StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, ConversationRecord>,
    /// Messages per conversation, in insertion order (oldest first).
    messages: HashMap<String, Vec<MessageRecord>>,
}

/// In-memory conversation store.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidData {
        message: format!("Failed to lock store: {e}"),
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> BoxFuture<'static, StoreResult<Option<ConversationRecord>>> {
        let inner = self.inner.clone();
        let id = id.to_string();
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let store = inner.lock().map_err(lock_err)?;
            Ok(store
                .conversations
                .get(&id)
                .filter(|c| c.owner_id == owner_id)
                .cloned())
        })
    }

    fn create_conversation(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<ConversationRecord>> {
        let inner = self.inner.clone();
        let now = Utc::now().timestamp_millis();
        let record = ConversationRecord {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        Box::pin(async move {
            let mut store = inner.lock().map_err(lock_err)?;
            store.conversations.insert(record.id.clone(), record.clone());
            store.messages.entry(record.id.clone()).or_default();
            Ok(record)
        })
    }

    fn insert_messages(
        &self,
        conversation_id: &str,
        rows: Vec<NewMessage>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }

            let mut store = inner.lock().map_err(lock_err)?;
            if !store.conversations.contains_key(&conversation_id) {
                return Err(StoreError::InvalidData {
                    message: format!("Unknown conversation: {conversation_id}"),
                });
            }

            let now = Utc::now().timestamp_millis();
            let records: Vec<MessageRecord> = rows
                .into_iter()
                .map(|row| MessageRecord {
                    id: Uuid::new_v4().to_string(),
                    conversation_id: conversation_id.clone(),
                    role: row.role,
                    content: row.content,
                    parts: row.parts,
                    created_at: now,
                })
                .collect();

            store
                .messages
                .entry(conversation_id.clone())
                .or_default()
                .extend(records);
            if let Some(conversation) = store.conversations.get_mut(&conversation_id) {
                conversation.updated_at = now;
            }
            Ok(())
        })
    }

    fn update_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let conversation_id = conversation_id.to_string();
        let title = title.to_string();
        Box::pin(async move {
            let mut store = inner.lock().map_err(lock_err)?;
            if let Some(conversation) = store.conversations.get_mut(&conversation_id) {
                conversation.title = title;
                conversation.updated_at = Utc::now().timestamp_millis();
            }
            Ok(())
        })
    }

    fn list_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> BoxFuture<'static, StoreResult<Vec<MessageRecord>>> {
        let inner = self.inner.clone();
        let conversation_id = conversation_id.to_string();
        Box::pin(async move {
            let store = inner.lock().map_err(lock_err)?;
            Ok(store
                .messages
                .get(&conversation_id)
                .map(|messages| {
                    messages
                        .iter()
                        .rev()
                        .take(limit as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn delete_conversation(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let id = id.to_string();
        Box::pin(async move {
            let mut store = inner.lock().map_err(lock_err)?;
            store.conversations.remove(&id);
            store.messages.remove(&id);
            Ok(())
        })
    }

    fn delete_message(&self, id: &str) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let id = id.to_string();
        Box::pin(async move {
            let mut store = inner.lock().map_err(lock_err)?;
            for messages in store.messages.values_mut() {
                messages.retain(|m| m.id != id);
            }
            Ok(())
        })
    }
}
