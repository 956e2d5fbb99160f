//! Lifecycle event types for the agent stream (type + payload).
//!
//! The remote side emits low-level message and tool-call lifecycle events
//! rather than pre-formed steps; the consumer coalesces them. Payload fields
//! use camelCase on the wire; the `type` discriminant is kebab-case.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stream event: wire shape is `{"type": "<kebab-case>", ...payload}`.
///
/// Message text and tool-call arguments arrive as fragments (`delta` /
/// `tool-call-args`) between their start and end events and must be
/// concatenated by the consumer. Event types this crate does not know are
/// deserialized as [`AgentEvent::Unknown`] so a stream with newer lifecycle
/// events still parses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    /// A message of the given role was opened. Roles: `assistant`, `thinking`.
    #[serde(rename_all = "camelCase")]
    MessageStart { message_id: String, role: String },
    /// Text fragment for the open message.
    #[serde(rename_all = "camelCase")]
    Delta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        delta: String,
    },
    /// The open message is complete.
    #[serde(rename_all = "camelCase")]
    MessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// A tool call was opened; arguments follow as `tool-call-args` fragments.
    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    /// JSON fragment of the open tool call's arguments.
    #[serde(rename_all = "camelCase")]
    ToolCallArgs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        delta: String,
    },
    /// The open tool call's arguments are complete.
    #[serde(rename_all = "camelCase")]
    ToolCallEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
    /// In-band result of a completed tool call.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// The run failed remotely. Open buffers should still be flushed.
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Terminal event: the run completed with an optional final result.
    #[serde(rename_all = "camelCase")]
    RunFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// Any event type this crate does not know. Carried so consumers can
    /// forward the raw payload without failing the stream.
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// Parses one event from a decoded frame payload.
    ///
    /// Returns `None` when the value is not an object with a string `type`
    /// (a malformed frame, tolerated by consumers).
    pub fn from_value(value: &Value) -> Option<AgentEvent> {
        if value.get("type").and_then(|t| t.as_str()).is_none() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Serializes this event to a JSON object (type + payload).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::AgentEvent;
    use serde_json::json;

    #[test]
    fn message_start_uses_camel_case_payload() {
        let event = AgentEvent::MessageStart {
            message_id: "m-1".to_string(),
            role: "assistant".to_string(),
        };
        let value = event.to_value().unwrap();

        assert_eq!(value["type"], "message-start");
        assert_eq!(value["messageId"], "m-1");
        assert_eq!(value["role"], "assistant");
    }

    #[test]
    fn tool_call_args_round_trips() {
        let value = json!({"type": "tool-call-args", "toolCallId": "t-1", "delta": "{\"svc\":"});
        let event = AgentEvent::from_value(&value).unwrap();
        assert_eq!(
            event,
            AgentEvent::ToolCallArgs {
                tool_call_id: Some("t-1".to_string()),
                delta: "{\"svc\":".to_string(),
            }
        );
        assert_eq!(event.to_value().unwrap(), value);
    }

    #[test]
    fn unknown_type_parses_as_unknown() {
        let value = json!({"type": "heartbeat", "seq": 7});
        assert_eq!(AgentEvent::from_value(&value), Some(AgentEvent::Unknown));
    }

    #[test]
    fn missing_type_is_rejected() {
        assert_eq!(AgentEvent::from_value(&json!({"delta": "x"})), None);
        assert_eq!(AgentEvent::from_value(&json!("data")), None);
    }

    #[test]
    fn tool_result_defaults_is_error_false() {
        let value = json!({"type": "tool-result", "content": "ok"});
        match AgentEvent::from_value(&value) {
            Some(AgentEvent::ToolResult { is_error, .. }) => assert!(!is_error),
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
