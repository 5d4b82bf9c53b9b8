use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::{DEDUP_LOOKBACK, filter_consecutive_duplicates};
use super::stream_processor::{ModelResponse, process_stream_result};
use super::title_generator::derive_title_from_text;
use crate::models::chat_request::{CallerIdentity, IncomingMessage};
use crate::models::message::{
    MessagePart, MessageRole, check_tool_invocation_pairing, serialize_message_parts,
};
use crate::repositories::{ConversationStore, NewMessage};

/// Acknowledgement that a save has been scheduled. The write itself happens
/// on a deferred task, off the request path.
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    pub success: bool,
    pub conversation_id: String,
    pub error: Option<String>,
}

/// Everything the deferred save needs, captured from the request closure.
pub struct SaveRequest {
    pub response: Arc<dyn ModelResponse>,
    pub owner: CallerIdentity,
    pub conversation_id: String,
    /// `Some` when the request continued an existing conversation; `None`
    /// marks a brand-new one whose row still has to be created.
    pub original_conversation_id: Option<String>,
    pub user_messages: Vec<IncomingMessage>,
}

/// Commits finished turns to conversation storage without blocking the
/// user-visible stream.
///
/// Saves run on spawned tasks; failures there are logged and swallowed, never
/// surfaced to the request cycle that already completed. At-most-once,
/// best-effort: a crash between response completion and persistence silently
/// loses that one turn from history.
pub struct PersistenceGateway {
    store: Arc<dyn ConversationStore>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Schedule the save of a completed turn and return immediately.
    pub fn save_chat_response(&self, request: SaveRequest) -> SaveReceipt {
        let conversation_id = request.conversation_id.clone();
        let store = self.store.clone();

        let handle = tokio::spawn(async move {
            let conversation_id = request.conversation_id.clone();
            if let Err(err) = persist_turn(store, request).await {
                // The response already reached the user; nothing to do but log.
                error!(conversation_id = %conversation_id, error = %err, "Deferred chat save failed");
            }
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);

        SaveReceipt {
            success: true,
            conversation_id,
            error: None,
        }
    }

    /// Wait for all scheduled saves to settle. For orderly shutdown and tests;
    /// request handlers never call this.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Structured parts are persisted only when the turn carried reasoning or a
/// tool interaction; plain-text turns keep just the flattened string.
fn structured_parts(parts: Option<&Vec<MessagePart>>) -> Option<&Vec<MessagePart>> {
    parts.filter(|parts| {
        parts
            .iter()
            .any(|part| !matches!(part, MessagePart::Text { .. }))
    })
}

async fn persist_turn(store: Arc<dyn ConversationStore>, request: SaveRequest) -> Result<()> {
    let SaveRequest {
        response,
        owner,
        conversation_id,
        original_conversation_id,
        user_messages,
    } = request;

    let processed = process_stream_result(response.as_ref()).await;

    if let Some(parts) = &processed.parts
        && let Err(err) = check_tool_invocation_pairing(parts)
    {
        warn!(conversation_id = %conversation_id, error = %err, "Tool invocation pairing violated in assembled turn");
    }

    let brand_new = original_conversation_id.is_none();
    if brand_new {
        let title = user_messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| derive_title_from_text(&m.content))
            .unwrap_or_else(|| derive_title_from_text(""));

        store
            .create_conversation(&conversation_id, &owner.user_id, &title)
            .await
            .context("Failed to create conversation")?;
        info!(conversation_id = %conversation_id, title = %title, "Created conversation on first turn");
    }

    // Snapshot of persisted history taken once; both batches are reconciled
    // against it.
    let recent = store
        .list_recent_messages(&conversation_id, DEDUP_LOOKBACK)
        .await
        .context("Failed to load recent messages")?;

    let user_rows: Vec<NewMessage> = filter_consecutive_duplicates(user_messages, &recent)
        .into_iter()
        .map(|m| NewMessage {
            role: m.role,
            content: m.content,
            parts: None,
        })
        .collect();

    if !user_rows.is_empty() {
        store
            .insert_messages(&conversation_id, user_rows)
            .await
            .context("Failed to insert user messages")?;
    }

    let assistant_candidates = filter_consecutive_duplicates(
        vec![IncomingMessage {
            role: MessageRole::Assistant,
            content: processed.text.clone(),
        }],
        &recent,
    );

    if assistant_candidates.is_empty() {
        debug!(conversation_id = %conversation_id, "Assistant turn is a consecutive duplicate, skipping insert");
        return Ok(());
    }

    let parts_json = structured_parts(processed.parts.as_ref())
        .map(|parts| serialize_message_parts(parts))
        .transpose()
        .context("Failed to serialize assistant parts")?;

    store
        .insert_messages(
            &conversation_id,
            vec![NewMessage {
                role: MessageRole::Assistant,
                content: processed.text,
                parts: parts_json,
            }],
        )
        .await
        .context("Failed to insert assistant message")?;

    debug!(conversation_id = %conversation_id, "Turn persisted");

    Ok(())
}
