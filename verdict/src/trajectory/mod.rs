//! Trajectory data model: the canonical unit of recorded agent behavior.
//!
//! A [`TrajectoryStep`] is created once by a connector during `execute()` and
//! immutable thereafter. Steps within one run are ordered by emission order,
//! not by timestamp, since subprocess output may buffer; consumers must treat
//! array order as authoritative.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of one observable unit of agent behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Internal reasoning text.
    Thinking,
    /// Assistant-visible message text.
    Assistant,
    /// A tool invocation (`tool_name` + `tool_args`).
    Action,
    /// The outcome of a tool invocation (`status`, optional `latency_ms`).
    ToolResult,
    /// Terminal answer for the run.
    Response,
}

/// Outcome of a tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    Failure,
}

/// One step of a recorded trajectory.
///
/// `id` and `timestamp` are generated at construction; builder methods
/// override them when the caller carries its own (e.g. replaying stored raw
/// events keeps the stored ids).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Free text; JSON-stringified for tool results and structured payloads.
    pub content: String,
    /// Wall-clock ms since epoch at emission.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl TrajectoryStep {
    /// Builds a step with generated `id` and `timestamp`.
    pub fn new(step_type: StepType, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            step_type,
            content: content.into(),
            timestamp: now_millis(),
            tool_name: None,
            tool_args: None,
            status: None,
            latency_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets `tool_name` and `tool_args` (for `action` steps).
    pub fn with_tool(mut self, name: impl Into<String>, args: Option<Value>) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = args;
        self
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// What one evaluation attempt produced.
///
/// Constructed once per `execute()` call and handed to the persistence layer.
/// `raw_events` preserves the untouched protocol payloads so the trajectory
/// can later be reconstructed without re-invoking the network (audit/replay).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorResponse {
    pub trajectory: Vec<TrajectoryStep>,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_events: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Step content for a wire value: strings pass through verbatim, everything
/// else is JSON-stringified (never the `[object Object]` style of a naive
/// display conversion).
pub fn content_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Wall-clock ms since epoch. Monotonic-ish: ordering across steps is carried
/// by emission order, not this value.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Collision-resistant id: `<millis>-<random>`.
pub fn generate_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_millis(), &random[..8])
}
