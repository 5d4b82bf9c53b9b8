use tracing::debug;

use super::text_extractor::extract_text_from_parts;
use crate::models::chat_request::IncomingMessage;
use crate::models::message::reconstruct_message_parts;
use crate::repositories::MessageRecord;

/// Only the most recent persisted message is consulted. Duplicates further
/// back in history are intentionally allowed to stand; this favors a bounded
/// O(1) comparison over exhaustive history scanning.
pub const DEDUP_LOOKBACK: u32 = 1;

/// Flattened text of a persisted message, reconstructed from its stored parts
/// when present. The stored `content` string is only a cache.
fn flattened_text(record: &MessageRecord) -> String {
    match &record.parts {
        Some(json) => match reconstruct_message_parts(json) {
            Ok(parts) => extract_text_from_parts(&parts),
            Err(err) => {
                debug!(message_id = %record.id, error = %err, "Unreadable parts column, comparing stored content");
                record.content.clone()
            }
        },
        None => record.content.clone(),
    }
}

/// Drop candidates that exactly repeat the most recent persisted message
/// (idempotent retries, client double-submits).
///
/// A candidate is a consecutive duplicate iff the newest persisted message
/// has the same role and its reconstructed flattened text equals the
/// candidate's content byte for byte.
pub fn filter_consecutive_duplicates(
    candidates: Vec<IncomingMessage>,
    recent_newest_first: &[MessageRecord],
) -> Vec<IncomingMessage> {
    let Some(latest) = recent_newest_first.first() else {
        return candidates;
    };

    let latest_text = flattened_text(latest);

    candidates
        .into_iter()
        .filter(|candidate| {
            let duplicate = candidate.role == latest.role && candidate.content == latest_text;
            if duplicate {
                debug!(role = latest.role.as_str(), "Skipping consecutive duplicate message");
            }
            !duplicate
        })
        .collect()
}
