use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Placeholder for conversations whose payload carried no usable user text.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Derived titles keep the first 50 characters of the source message.
pub const TITLE_MAX_CHARS: usize = 50;

/// Derive a conversation title from user message text: the first 50
/// characters verbatim, or the generic placeholder for blank input.
pub fn derive_title_from_text(text: &str) -> String {
    let title: String = text.chars().take(TITLE_MAX_CHARS).collect();
    if title.trim().is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Non-streaming completion client used for summary titles.
#[async_trait]
pub trait TitleModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Truncate text to max length
fn truncate_text(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// Clean and validate generated title
fn clean_title(raw_title: &str) -> String {
    let cleaned = raw_title
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .lines()
        .next()
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    if cleaned.chars().count() > 100 {
        format!("{}...", truncate_text(&cleaned, 97))
    } else if cleaned.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        cleaned
    }
}

/// Generate a concise summary title for a conversation from its first
/// exchange. Replaces the heuristic placeholder after the first successful
/// round-trip; the replacement is committed via
/// `ConversationStore::update_title`.
pub async fn generate_title(
    model: &dyn TitleModel,
    user_text: &str,
    assistant_text: &str,
) -> Result<String> {
    let prompt = format!(
        "Generate a concise, descriptive title (3-7 words) for this conversation. \
        Output ONLY the title, no quotes, no explanation.\n\n\
        User: {}\n\nAssistant: {}",
        truncate_text(user_text, 500),
        truncate_text(assistant_text, 500)
    );

    let raw = model.complete(&prompt).await?;
    let title = clean_title(&raw);

    debug!(title = %title, "Generated summary title");

    Ok(title)
}
