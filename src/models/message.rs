use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Role of a message within a conversation.
///
/// Kept as a closed enum and checked at every boundary (deserialization,
/// persistence, rendering) rather than threading raw strings around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parse a persisted role string. Returns `None` for anything unknown.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// Whether a tool invocation has only been issued, or already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolInvocationState {
    Call,
    Result,
}

/// One typed fragment of an assistant or user turn.
///
/// Serialized with a `type` discriminant so that persisted rows round-trip
/// losslessly through the JSON `parts` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },

    /// Model reasoning, kept separate from `text` so renderers can collapse it.
    #[serde(rename = "reasoning")]
    Reasoning { reasoning: String },

    #[serde(rename = "tool-invocation")]
    ToolInvocation {
        call_id: String,
        tool_name: String,
        state: ToolInvocationState,
        /// Invocation arguments, opaque to this layer. Tool schemas vary by
        /// deployment, so no fixed shape is imposed.
        args: Map<String, Value>,
        called_at: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<i64>,
        /// Absent while `state` is `call`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    /// Raw tool output carried outside the call/result state machine.
    #[serde(rename = "tool-result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        result: Value,
    },

    /// Citation metadata.
    #[serde(rename = "source")]
    Source {
        id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

/// Serialize parts for the JSON `parts` column.
pub fn serialize_message_parts(parts: &[MessagePart]) -> Result<String> {
    serde_json::to_string(parts).context("Failed to serialize message parts")
}

/// Reconstruct parts from a persisted JSON `parts` column.
pub fn reconstruct_message_parts(json: &str) -> Result<Vec<MessagePart>> {
    serde_json::from_str(json).context("Failed to deserialize message parts")
}

/// Check the tool-invocation pairing rules within one turn:
/// a `result`-state entry must share its call id with a prior `call`-state
/// entry, and a `call`-state entry must never carry a non-null result.
pub fn check_tool_invocation_pairing(parts: &[MessagePart]) -> Result<()> {
    let mut seen_calls: HashSet<&str> = HashSet::new();

    for part in parts {
        if let MessagePart::ToolInvocation {
            call_id,
            state,
            result,
            ..
        } = part
        {
            match state {
                ToolInvocationState::Call => {
                    if result.is_some() {
                        bail!("tool call {call_id} carries a result while in call state");
                    }
                    seen_calls.insert(call_id.as_str());
                }
                ToolInvocationState::Result => {
                    if !seen_calls.contains(call_id.as_str()) {
                        bail!("tool result {call_id} has no matching prior call");
                    }
                }
            }
        }
    }

    Ok(())
}
