use serde_json::Value;

use crate::models::message::MessagePart;

/// Tool name of the built-in weather lookup.
pub const WEATHER_TOOL_NAME: &str = "get_weather";

/// Derive a flat display/storage string from a part sequence.
///
/// Text parts are joined with a single space, in sequence order. A turn that
/// carried only tool invocations gets a synthesized sentence instead, so
/// titles and fallback rendering never end up blank. Pure: called both at
/// persistence time and at render time, and must agree with itself.
pub fn extract_text_from_parts(parts: &[MessagePart]) -> String {
    let text = parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ");

    if !text.is_empty() {
        return text;
    }

    let has_invocation = parts
        .iter()
        .any(|part| matches!(part, MessagePart::ToolInvocation { .. }));
    if has_invocation {
        let weather_location = parts.iter().find_map(|part| match part {
            MessagePart::ToolInvocation {
                tool_name, args, ..
            } if tool_name == WEATHER_TOOL_NAME => {
                args.get("location").and_then(Value::as_str)
            }
            _ => None,
        });

        return match weather_location {
            Some(location) => format!("I looked up the weather for {location}."),
            None => "I consulted a tool to help answer this.".to_string(),
        };
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::ToolInvocationState;
    use serde_json::{Map, json};

    fn invocation(tool_name: &str, args: Map<String, Value>) -> MessagePart {
        MessagePart::ToolInvocation {
            call_id: "call-1".to_string(),
            tool_name: tool_name.to_string(),
            state: ToolInvocationState::Call,
            args,
            called_at: 0,
            completed_at: None,
            result: None,
        }
    }

    #[test]
    fn test_joins_text_parts_in_order() {
        let parts = vec![
            MessagePart::Text {
                text: "Hello".to_string(),
            },
            MessagePart::Reasoning {
                reasoning: "hidden".to_string(),
            },
            MessagePart::Text {
                text: "world".to_string(),
            },
        ];
        assert_eq!(extract_text_from_parts(&parts), "Hello world");
    }

    #[test]
    fn test_weather_invocation_fallback() {
        let mut args = Map::new();
        args.insert("location".to_string(), json!("Recife"));
        let parts = vec![invocation(WEATHER_TOOL_NAME, args)];
        assert_eq!(
            extract_text_from_parts(&parts),
            "I looked up the weather for Recife."
        );
    }

    #[test]
    fn test_generic_invocation_fallback() {
        let parts = vec![invocation("search_docs", Map::new())];
        assert_eq!(
            extract_text_from_parts(&parts),
            "I consulted a tool to help answer this."
        );
    }

    #[test]
    fn test_text_wins_over_fallback() {
        let mut args = Map::new();
        args.insert("location".to_string(), json!("Recife"));
        let parts = vec![
            invocation(WEATHER_TOOL_NAME, args),
            MessagePart::Text {
                text: "28C and sunny".to_string(),
            },
        ];
        assert_eq!(extract_text_from_parts(&parts), "28C and sunny");
    }

    #[test]
    fn test_empty_without_text_or_invocations() {
        let parts = vec![MessagePart::Reasoning {
            reasoning: "only thoughts".to_string(),
        }];
        assert_eq!(extract_text_from_parts(&parts), "");
        assert_eq!(extract_text_from_parts(&[]), "");
    }
}
