use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::title_generator::derive_title_from_text;
use crate::models::chat_request::{CallerIdentity, ChatRequest};
use crate::repositories::{ConversationRecord, ConversationStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The supplied id does not resolve to a conversation the caller owns.
    /// Deliberately indistinguishable from a nonexistent conversation.
    #[error("Conversation not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How an inbound chat request maps onto conversation state.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// No caller identity, or persistence explicitly suppressed. Nothing is
    /// created or loaded and no writes will occur.
    Ephemeral,
    /// The supplied conversation id resolved under the caller's ownership.
    Continue(ConversationRecord),
    /// A new conversation is needed. Only the id and initial title are
    /// decided here; the row is written by the deferred save after the first
    /// assistant turn completes, so aborted requests never leave empty
    /// conversations behind.
    ///
    /// The title is advisory, for optimistic display: it comes from the most
    /// recent user message, while the committed title is derived from the
    /// first user message at save time. The two only differ for payloads
    /// carrying more than one user turn.
    Create { conversation_id: String, title: String },
}

/// Decides whether a request continues an existing conversation, requires a
/// new one, or runs without persistence.
pub struct ConversationLifecycle {
    store: Arc<dyn ConversationStore>,
}

impl ConversationLifecycle {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        caller: Option<&CallerIdentity>,
        request: &ChatRequest,
    ) -> Result<SessionOutcome, LifecycleError> {
        let Some(caller) = caller else {
            debug!("No caller identity, running ephemeral");
            return Ok(SessionOutcome::Ephemeral);
        };

        if request.ephemeral {
            debug!(user_id = %caller.user_id, "Caller requested ephemeral mode");
            return Ok(SessionOutcome::Ephemeral);
        }

        if let Some(id) = &request.conversation_id {
            // Fail closed: an id that doesn't resolve under this owner must
            // never silently fall back to creating a fresh conversation.
            return match self.store.find_conversation(id, &caller.user_id).await? {
                Some(record) => Ok(SessionOutcome::Continue(record)),
                None => {
                    warn!(conversation_id = %id, user_id = %caller.user_id, "Conversation lookup failed ownership check");
                    Err(LifecycleError::NotFound)
                }
            };
        }

        let title = request
            .latest_user_text()
            .map(derive_title_from_text)
            .unwrap_or_else(|| derive_title_from_text(""));

        Ok(SessionOutcome::Create {
            conversation_id: Uuid::new_v4().to_string(),
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat_request::IncomingMessage;
    use crate::models::message::MessageRole;
    use crate::repositories::InMemoryConversationStore;
    use crate::services::title_generator::DEFAULT_TITLE;

    fn caller(user_id: &str) -> CallerIdentity {
        CallerIdentity {
            user_id: user_id.to_string(),
            display_name: None,
        }
    }

    fn request(conversation_id: Option<&str>, user_text: Option<&str>) -> ChatRequest {
        ChatRequest {
            conversation_id: conversation_id.map(str::to_string),
            messages: user_text
                .map(|text| {
                    vec![IncomingMessage {
                        role: MessageRole::User,
                        content: text.to_string(),
                    }]
                })
                .unwrap_or_default(),
            ephemeral: false,
        }
    }

    fn lifecycle() -> (Arc<InMemoryConversationStore>, ConversationLifecycle) {
        let store = Arc::new(InMemoryConversationStore::new());
        let lifecycle = ConversationLifecycle::new(store.clone());
        (store, lifecycle)
    }

    #[tokio::test]
    async fn test_anonymous_caller_is_ephemeral() {
        let (_store, lifecycle) = lifecycle();
        let outcome = lifecycle
            .resolve(None, &request(None, Some("hi")))
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Ephemeral));
    }

    #[tokio::test]
    async fn test_explicit_ephemeral_flag() {
        let (_store, lifecycle) = lifecycle();
        let mut req = request(None, Some("hi"));
        req.ephemeral = true;
        let outcome = lifecycle
            .resolve(Some(&caller("alice")), &req)
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Ephemeral));
    }

    #[tokio::test]
    async fn test_continue_with_owned_conversation() {
        let (store, lifecycle) = lifecycle();
        store
            .create_conversation("conv-1", "alice", "Hello")
            .await
            .unwrap();

        let outcome = lifecycle
            .resolve(Some(&caller("alice")), &request(Some("conv-1"), Some("hi")))
            .await
            .unwrap();
        match outcome {
            SessionOutcome::Continue(record) => assert_eq!(record.id, "conv-1"),
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_foreign_conversation_fails_closed() {
        let (store, lifecycle) = lifecycle();
        store
            .create_conversation("conv-1", "alice", "Hello")
            .await
            .unwrap();

        let result = lifecycle
            .resolve(
                Some(&caller("mallory")),
                &request(Some("conv-1"), Some("hi")),
            )
            .await;
        assert!(matches!(result, Err(LifecycleError::NotFound)));
    }

    #[tokio::test]
    async fn test_unknown_id_fails_closed() {
        let (_store, lifecycle) = lifecycle();
        let result = lifecycle
            .resolve(Some(&caller("alice")), &request(Some("ghost"), Some("hi")))
            .await;
        assert!(matches!(result, Err(LifecycleError::NotFound)));
    }

    #[tokio::test]
    async fn test_create_derives_title_from_latest_user_message() {
        let (store, lifecycle) = lifecycle();
        let outcome = lifecycle
            .resolve(
                Some(&caller("alice")),
                &request(None, Some("What's the weather in Recife today and tomorrow?")),
            )
            .await
            .unwrap();

        match outcome {
            SessionOutcome::Create {
                conversation_id,
                title,
            } => {
                assert!(!conversation_id.is_empty());
                assert_eq!(title, "What's the weather in Recife today and tomorrow?");
                // Nothing written yet: creation is deferred to the save task.
                assert!(
                    store
                        .find_conversation(&conversation_id, "alice")
                        .await
                        .unwrap()
                        .is_none()
                );
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_without_user_turn_gets_placeholder() {
        let (_store, lifecycle) = lifecycle();
        let outcome = lifecycle
            .resolve(Some(&caller("alice")), &request(None, None))
            .await
            .unwrap();
        match outcome {
            SessionOutcome::Create { title, .. } => assert_eq!(title, DEFAULT_TITLE),
            other => panic!("expected Create, got {other:?}"),
        }
    }
}
