//! Wire types for the assistant subprocess's newline-delimited JSON protocol (spec §4.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of assistant stdout, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    System(SystemEvent),
    Assistant(AssistantMessageEvent),
    ToolUse(ToolUseEvent),
    ToolResult(ToolResultEvent),
    Result(ResultEvent),
    /// Any event type not recognized by this build. Tolerated so a newer assistant
    /// binary doesn't take the whole session down over an unfamiliar line.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemEvent {
    pub subtype: String,
    /// The assistant's own opaque session id, used for `--resume` on respawn.
    #[serde(rename = "session-id", alias = "session_id")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessageEvent {
    pub message: AssistantMessageBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessageBody {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// A `tool_use` block that arrived as its own top-level event rather than nested
/// inside an `assistant` message (spec §4.2: "may also appear nested in `assistant`").
#[derive(Debug, Clone, Deserialize)]
pub struct ToolUseEvent {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolResultEvent {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultEvent {
    pub subtype: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}

impl ResultEvent {
    pub fn is_success(&self) -> bool {
        self.subtype == "success"
    }
}

/// One line written to assistant stdin.
#[derive(Debug, Clone, Serialize)]
pub struct UserMessage {
    pub role: &'static str,
    pub content: UserContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl UserMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: UserContent::Text(content.into()),
        }
    }

    /// A reply to a blocking tool call (plan approval, numbered question) — sent back as a
    /// `tool_result` content block correlated by `tool_use_id` rather than as free text.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: UserContent::Blocks(vec![serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id.into(),
                "content": content.into(),
            })]),
        }
    }

    /// A message carrying image attachments alongside text (spec §4.10 payload
    /// construction): one block per image plus a trailing text block.
    pub fn with_images(text: impl Into<String>, images_base64: &[(String, String)]) -> Self {
        let mut blocks: Vec<Value> = images_base64
            .iter()
            .map(|(media_type, data)| {
                serde_json::json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": media_type, "data": data },
                })
            })
            .collect();
        blocks.push(serde_json::json!({ "type": "text", "text": text.into() }));
        Self {
            role: "user",
            content: UserContent::Blocks(blocks),
        }
    }

    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Parse one line of assistant stdout. Malformed lines are the caller's problem to log
/// and skip — the stream as a whole must keep flowing (spec §4.2/§7).
pub fn parse_event(line: &str) -> serde_json::Result<AssistantEvent> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_system_init_event() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc-123"}"#;
        let event = parse_event(line).unwrap();
        match event {
            AssistantEvent::System(sys) => {
                assert_eq!(sys.subtype, "init");
                assert_eq!(sys.session_id.as_deref(), Some("abc-123"));
            }
            other => panic!("expected System, got {other:?}"),
        }
    }

    #[test]
    fn parses_assistant_text_and_tool_use_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"hi"},
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}
        ]}}"#;
        let event = parse_event(line).unwrap();
        match event {
            AssistantEvent::Assistant(msg) => {
                assert_eq!(msg.message.content.len(), 2);
                assert!(matches!(msg.message.content[0], ContentBlock::Text { .. }));
                assert!(matches!(msg.message.content[1], ContentBlock::ToolUse { .. }));
            }
            other => panic!("expected Assistant, got {other:?}"),
        }
    }

    #[test]
    fn parses_result_success() {
        let line = r#"{"type":"result","subtype":"success","duration_ms":1200,"total_cost_usd":0.01}"#;
        let AssistantEvent::Result(result) = parse_event(line).unwrap() else {
            panic!("expected Result event");
        };
        assert!(result.is_success());
    }

    #[test]
    fn unrecognized_event_type_falls_back_to_unknown_not_error() {
        let line = r#"{"type":"future_event_kind","whatever":true}"#;
        let event = parse_event(line).unwrap();
        assert!(matches!(event, AssistantEvent::Unknown));
    }

    #[test]
    fn user_message_serializes_as_plain_text_content() {
        let msg = UserMessage::text("hello");
        let line = msg.to_ndjson_line().unwrap();
        assert_eq!(line, r#"{"role":"user","content":"hello"}"#);
    }
}
