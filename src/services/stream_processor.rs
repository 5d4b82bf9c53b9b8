use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::text_extractor::extract_text_from_parts;
use crate::models::message::{MessagePart, ToolInvocationState};

/// Canned reply for total stream failure. The chat UI always receives
/// renderable text, never a raw error.
pub const FALLBACK_RESPONSE: &str =
    "Sorry, I ran into technical difficulties while generating this response. Please try again.";

/// A tool call reported by the model stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Some providers omit call ids; one is synthesized during assembly.
    pub call_id: Option<String>,
    pub tool_name: String,
    pub args: Map<String, Value>,
}

/// A resolved tool result reported by the model stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub result: Value,
}

/// Input/output token counts for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A model response whose constituents can each be awaited independently.
///
/// Implementations must tolerate being awaited multiple times without side
/// effects: the fallback path re-awaits `text` after a failure elsewhere.
#[async_trait]
pub trait ModelResponse: Send + Sync {
    async fn text(&self) -> Result<String>;
    async fn tool_calls(&self) -> Result<Vec<ToolCall>>;
    async fn tool_results(&self) -> Result<Vec<ToolOutcome>>;
    async fn reasoning(&self) -> Result<String>;
}

/// Finalized, renderable representation of one assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResponse {
    pub text: String,
    /// `None` means "no structured content"; callers treat it like an empty
    /// sequence.
    pub parts: Option<Vec<MessagePart>>,
    /// Usage accounting is not wired up yet; always `None`.
    pub usage: Option<TokenUsage>,
}

/// Consume a model response and assemble the ordered part sequence plus the
/// derived summary string.
///
/// Parts come out in a fixed order: text, reasoning, tool invocations in call
/// state, then in result state. Any failure while awaiting the constituents
/// degrades to text-only, and a failing text promise degrades further to a
/// fixed placeholder. The caller always gets something renderable.
pub async fn process_stream_result(response: &dyn ModelResponse) -> ProcessedResponse {
    match assemble_parts(response).await {
        Ok(processed) => processed,
        Err(err) => {
            warn!(error = %err, "Stream assembly failed, falling back to text only");
            match response.text().await {
                Ok(text) => ProcessedResponse {
                    text: text.trim().to_string(),
                    parts: None,
                    usage: None,
                },
                Err(err) => {
                    warn!(error = %err, "Text promise also failed, using placeholder");
                    ProcessedResponse {
                        text: FALLBACK_RESPONSE.to_string(),
                        parts: None,
                        usage: None,
                    }
                }
            }
        }
    }
}

async fn assemble_parts(response: &dyn ModelResponse) -> Result<ProcessedResponse> {
    let mut parts: Vec<MessagePart> = Vec::new();

    let text = response.text().await?.trim().to_string();
    if !text.is_empty() {
        parts.push(MessagePart::Text { text: text.clone() });
    }

    let reasoning = clean_reasoning(&response.reasoning().await?);
    if !reasoning.is_empty() {
        parts.push(MessagePart::Reasoning { reasoning });
    }

    let calls = response.tool_calls().await?;
    let now = Utc::now().timestamp_millis();
    // Arguments and call timestamps keyed by call id, so result entries can
    // carry them even when the source does not re-supply arguments.
    let mut call_context: HashMap<String, (Map<String, Value>, i64)> = HashMap::new();

    for (index, call) in calls.iter().enumerate() {
        let call_id = call
            .call_id
            .clone()
            .unwrap_or_else(|| format!("tool-{now}-{index}"));
        call_context.insert(call_id.clone(), (call.args.clone(), now));
        parts.push(MessagePart::ToolInvocation {
            call_id,
            tool_name: call.tool_name.clone(),
            state: ToolInvocationState::Call,
            args: call.args.clone(),
            called_at: now,
            completed_at: None,
            result: None,
        });
    }

    for outcome in response.tool_results().await? {
        let (args, called_at) = call_context
            .get(&outcome.call_id)
            .cloned()
            .unwrap_or_else(|| (Map::new(), now));
        parts.push(MessagePart::ToolInvocation {
            call_id: outcome.call_id.clone(),
            tool_name: outcome.tool_name.clone(),
            state: ToolInvocationState::Result,
            args,
            called_at,
            completed_at: Some(Utc::now().timestamp_millis()),
            result: Some(outcome.result.clone()),
        });
    }

    let final_text = if text.is_empty() {
        extract_text_from_parts(&parts)
    } else {
        text
    };

    debug!(part_count = parts.len(), "Assembled response parts");

    Ok(ProcessedResponse {
        text: final_text,
        parts: if parts.is_empty() { None } else { Some(parts) },
        usage: None,
    })
}

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Normalize raw reasoning text: runs of 3+ newlines become a single paragraph
/// break, remaining newlines and whitespace runs collapse to single spaces.
fn clean_reasoning(raw: &str) -> String {
    let normalized = EXCESS_NEWLINES.replace_all(raw, "\n\n");
    normalized
        .split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Canned model response backed by pre-resolved values.
///
/// Intended for tests and development, like the in-memory store. A `None`
/// field simulates a failed await for that constituent.
#[derive(Debug, Clone, Default)]
pub struct StaticModelResponse {
    pub text: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_results: Option<Vec<ToolOutcome>>,
    pub reasoning: Option<String>,
}

impl StaticModelResponse {
    /// A response that resolves to plain text and nothing else.
    pub fn text_only(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            tool_calls: Some(Vec::new()),
            tool_results: Some(Vec::new()),
            reasoning: Some(String::new()),
        }
    }
}

#[async_trait]
impl ModelResponse for StaticModelResponse {
    async fn text(&self) -> Result<String> {
        self.text.clone().ok_or_else(|| anyhow!("text unavailable"))
    }

    async fn tool_calls(&self) -> Result<Vec<ToolCall>> {
        self.tool_calls
            .clone()
            .ok_or_else(|| anyhow!("tool calls unavailable"))
    }

    async fn tool_results(&self) -> Result<Vec<ToolOutcome>> {
        self.tool_results
            .clone()
            .ok_or_else(|| anyhow!("tool results unavailable"))
    }

    async fn reasoning(&self) -> Result<String> {
        self.reasoning
            .clone()
            .ok_or_else(|| anyhow!("reasoning unavailable"))
    }
}
