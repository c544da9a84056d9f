//! Inbound agent events
//!
//! The transport decodes raw protocol messages into [`AgentEvent`]s and hands
//! them to the engine one at a time. Decoding is forward compatible: a tag the
//! engine does not know, or a known tag with an unexpected shape, becomes
//! [`AgentEvent::Unknown`] carrying the original payload instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::entry::ToolKind;
use crate::error::{Error, Result};
use crate::usage::{ModelUsageInfo, UsageInfo};

/// Kind of a complete (non-streamed) text message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    #[default]
    Text,
    Thinking,
    Error,
    Plan,
}

/// Backend session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusKind {
    Idle,
    Working,
    Compacting,
    #[serde(other)]
    Other,
}

/// What caused a context compaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionTrigger {
    Auto,
    Manual,
    Cleared,
}

/// Streaming signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    MessageStart,
    BlockStart,
    Text,
    Thinking,
    ToolInput,
    BlockStop,
    MessageStop,
}

/// Declared kind of a streamed content block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Events delivered by the agent transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// An agent invoked a tool
    ToolInvocation {
        call_id: String,
        tool_name: String,
        #[serde(default)]
        tool_kind: Option<ToolKind>,
        #[serde(default)]
        parent_call_id: Option<String>,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        raw: Option<Value>,
    },

    /// A tool call finished
    ToolCompletion {
        call_id: String,
        #[serde(default)]
        output: Value,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        raw: Option<Value>,
    },

    /// A complete text message
    Text {
        text: String,
        #[serde(default)]
        kind: TextKind,
        #[serde(default)]
        parent_call_id: Option<String>,
        #[serde(default)]
        raw: Option<Value>,
    },

    /// Input from the user
    UserInput {
        text: String,
        #[serde(default)]
        is_synthetic: bool,
        /// Echo of input the view already shows
        #[serde(default)]
        is_replay: bool,
        #[serde(default)]
        parent_call_id: Option<String>,
        #[serde(default)]
        raw: Option<Value>,
    },

    /// An agent finished its turn
    TurnComplete {
        #[serde(default)]
        parent_call_id: Option<String>,
        #[serde(default)]
        usage: UsageInfo,
        #[serde(default)]
        model_usage: HashMap<String, ModelUsageInfo>,
        #[serde(default)]
        cost_usd: f64,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        provider: Option<String>,
    },

    /// Usage for one API round-trip
    UsageUpdate {
        #[serde(default)]
        step_usage: UsageInfo,
        #[serde(default)]
        parent_call_id: Option<String>,
    },

    /// The backend session started
    SessionInit {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        permission_mode: Option<String>,
    },

    /// The backend session changed status
    SessionStatus {
        status: SessionStatusKind,
        #[serde(default)]
        permission_mode: Option<String>,
    },

    /// Context was compacted or cleared
    ContextCompaction {
        trigger: CompactionTrigger,
        #[serde(default)]
        pre_tokens: Option<u64>,
        #[serde(default)]
        summary: Option<String>,
        #[serde(default)]
        parent_call_id: Option<String>,
    },

    /// A subagent was spawned, or an earlier one resumed
    SubagentSpawn {
        call_id: String,
        #[serde(default)]
        is_resume: bool,
        #[serde(default)]
        resume_agent_id: Option<String>,
        #[serde(default)]
        agent_type: String,
        #[serde(default)]
        description: String,
    },

    /// A subagent finished
    SubagentComplete {
        call_id: String,
        /// New resumable identifier for the agent
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        status: String,
        #[serde(default)]
        summary: Option<String>,
    },

    /// An incremental streaming signal
    StreamDelta {
        kind: DeltaKind,
        #[serde(default)]
        block_index: usize,
        #[serde(default)]
        block_kind: Option<BlockKind>,
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        /// Text, thinking, or raw tool-input JSON fragment
        #[serde(default)]
        fragment: Option<String>,
        #[serde(default)]
        parent_call_id: Option<String>,
    },

    /// Anything the decoder did not recognise
    #[serde(skip)]
    Unknown { message_type: String, raw: Value },
}

impl AgentEvent {
    /// Decode a JSON value, falling back to [`AgentEvent::Unknown`]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<AgentEvent>(value.clone()) {
            Ok(event) => event,
            Err(e) => {
                let message_type = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                tracing::debug!("Passing through unrecognised '{}' event: {}", message_type, e);
                AgentEvent::Unknown {
                    message_type,
                    raw: value,
                }
            }
        }
    }

    /// Decode one line of JSON. Fails only if the line is not a JSON object.
    pub fn parse_line(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(Error::InvalidEvent(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        }
        Ok(Self::from_value(value))
    }

    /// The event's type tag
    pub fn type_tag(&self) -> &str {
        match self {
            AgentEvent::ToolInvocation { .. } => "tool_invocation",
            AgentEvent::ToolCompletion { .. } => "tool_completion",
            AgentEvent::Text { .. } => "text",
            AgentEvent::UserInput { .. } => "user_input",
            AgentEvent::TurnComplete { .. } => "turn_complete",
            AgentEvent::UsageUpdate { .. } => "usage_update",
            AgentEvent::SessionInit { .. } => "session_init",
            AgentEvent::SessionStatus { .. } => "session_status",
            AgentEvent::ContextCompaction { .. } => "context_compaction",
            AgentEvent::SubagentSpawn { .. } => "subagent_spawn",
            AgentEvent::SubagentComplete { .. } => "subagent_complete",
            AgentEvent::StreamDelta { .. } => "stream_delta",
            AgentEvent::Unknown { message_type, .. } => message_type,
        }
    }

    /// The call id of the subagent task this event belongs to, if any
    pub fn parent_call_id(&self) -> Option<&str> {
        match self {
            AgentEvent::ToolInvocation { parent_call_id, .. }
            | AgentEvent::Text { parent_call_id, .. }
            | AgentEvent::UserInput { parent_call_id, .. }
            | AgentEvent::TurnComplete { parent_call_id, .. }
            | AgentEvent::UsageUpdate { parent_call_id, .. }
            | AgentEvent::ContextCompaction { parent_call_id, .. }
            | AgentEvent::StreamDelta { parent_call_id, .. } => parent_call_id.as_deref(),
            _ => None,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_tool_invocation() {
        let event = AgentEvent::from_value(json!({
            "type": "tool_invocation",
            "call_id": "toolu_1",
            "tool_name": "Read",
            "input": {"file_path": "src/lib.rs"},
            "parent_call_id": "toolu_parent"
        }));
        match &event {
            AgentEvent::ToolInvocation {
                call_id,
                tool_name,
                tool_kind,
                input,
                ..
            } => {
                assert_eq!(call_id, "toolu_1");
                assert_eq!(tool_name, "Read");
                assert!(tool_kind.is_none());
                assert_eq!(input["file_path"], "src/lib.rs");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(event.parent_call_id(), Some("toolu_parent"));
        assert_eq!(event.type_tag(), "tool_invocation");
    }

    #[test]
    fn test_decode_turn_complete_defaults() {
        let event = AgentEvent::from_value(json!({"type": "turn_complete"}));
        match event {
            AgentEvent::TurnComplete {
                usage,
                model_usage,
                cost_usd,
                subtype,
                result,
                ..
            } => {
                assert!(usage.is_empty());
                assert!(model_usage.is_empty());
                assert_eq!(cost_usd, 0.0);
                assert!(subtype.is_empty());
                assert!(result.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_stream_delta() {
        let event = AgentEvent::from_value(json!({
            "type": "stream_delta",
            "kind": "tool_input",
            "block_index": 2,
            "fragment": "{\"pa"
        }));
        assert_eq!(
            event,
            AgentEvent::StreamDelta {
                kind: DeltaKind::ToolInput,
                block_index: 2,
                block_kind: None,
                call_id: None,
                tool_name: None,
                fragment: Some("{\"pa".into()),
                parent_call_id: None,
            }
        );
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let raw = json!({"type": "rate_limit_notice", "retry_after": 30});
        let event = AgentEvent::from_value(raw.clone());
        assert_eq!(
            event,
            AgentEvent::Unknown {
                message_type: "rate_limit_notice".into(),
                raw
            }
        );
        assert_eq!(event.type_tag(), "rate_limit_notice");
    }

    #[test]
    fn test_malformed_known_tag_passes_through() {
        let raw = json!({"type": "tool_completion", "is_error": "maybe"});
        match AgentEvent::from_value(raw.clone()) {
            AgentEvent::Unknown {
                message_type,
                raw: kept,
            } => {
                assert_eq!(message_type, "tool_completion");
                assert_eq!(kept, raw);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_tag_is_unknown() {
        match AgentEvent::from_value(json!({"hello": 1})) {
            AgentEvent::Unknown { message_type, .. } => assert_eq!(message_type, "unknown"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_literal_unknown_tag_cannot_forge_variant() {
        let raw = json!({"type": "unknown", "message_type": "x", "raw": {}});
        match AgentEvent::from_value(raw.clone()) {
            AgentEvent::Unknown { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_line_rejects_non_objects() {
        assert!(AgentEvent::parse_line("not json").is_err());
        let err = AgentEvent::parse_line("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_parse_line_unknown_status_kind() {
        let event =
            AgentEvent::parse_line(r#"{"type":"session_status","status":"thinking"}"#).unwrap();
        assert_eq!(
            event,
            AgentEvent::SessionStatus {
                status: SessionStatusKind::Other,
                permission_mode: None
            }
        );
    }

    #[test]
    fn test_parent_call_id_absent_for_completion() {
        let event = AgentEvent::ToolCompletion {
            call_id: "c".into(),
            output: Value::Null,
            is_error: false,
            raw: None,
        };
        assert_eq!(event.parent_call_id(), None);
    }
}
