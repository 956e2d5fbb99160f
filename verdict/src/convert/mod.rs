//! Trajectory reconstruction: fold stream lifecycle events into steps.
//!
//! The streaming protocol emits message/tool-call lifecycle events rather
//! than pre-formed steps. [`TrajectoryConverter`] is the per-run state
//! machine that coalesces them: deltas buffer until message-end (emitting
//! per-delta would fragment a step into unusable pieces), tool-call argument
//! fragments concatenate until tool-call-end, and a terminal event closes the
//! run. State is scoped to a single `execute()` call; connectors build a
//! fresh converter per call.

use agui_event::AgentEvent;
use serde_json::Value;

use crate::trajectory::{content_from_value, StepStatus, StepType, TrajectoryStep};

/// Message buffer between message-start and message-end.
struct OpenMessage {
    id: Option<String>,
    step_type: StepType,
    buffer: String,
}

/// Tool-call record between tool-call-start and tool-call-end.
struct OpenToolCall {
    id: Option<String>,
    name: String,
    args: String,
}

/// The last emitted action, kept until its in-band result arrives so
/// `latency_ms` can be computed from the two step timestamps.
struct PendingAction {
    tool_call_id: Option<String>,
    timestamp: u64,
}

/// Per-run state machine: lifecycle events in, ordered steps out.
///
/// [`feed`](TrajectoryConverter::feed) returns the steps completed by one
/// event (usually zero or one); [`flush`](TrajectoryConverter::flush) closes
/// any open buffers as best-effort steps (used on run-error and when a stream
/// ends without a terminal event).
#[derive(Default)]
pub struct TrajectoryConverter {
    open_message: Option<OpenMessage>,
    open_tool_call: Option<OpenToolCall>,
    pending_action: Option<PendingAction>,
    run_id: Option<String>,
    finished: bool,
}

impl Default for OpenMessage {
    fn default() -> Self {
        Self {
            id: None,
            step_type: StepType::Assistant,
            buffer: String::new(),
        }
    }
}

impl TrajectoryConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event (run-finished or run-error) was seen.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Run id announced by the stream's terminal event, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Feeds one event; returns the steps it completed, in emission order.
    pub fn feed(&mut self, event: &AgentEvent) -> Vec<TrajectoryStep> {
        match event {
            AgentEvent::MessageStart { message_id, role } => {
                // An unterminated previous message is closed best-effort.
                let steps = self.flush_message();
                self.open_message = Some(OpenMessage {
                    id: Some(message_id.clone()),
                    step_type: step_type_for_role(role),
                    buffer: String::new(),
                });
                steps
            }
            AgentEvent::Delta { message_id, delta } => {
                match &mut self.open_message {
                    Some(open) if id_matches(&open.id, message_id) => {
                        open.buffer.push_str(delta);
                        Vec::new()
                    }
                    Some(_) => {
                        // Delta for a different message: close the stale
                        // buffer and start over under the new id.
                        let steps = self.flush_message();
                        self.open_message = Some(OpenMessage {
                            id: message_id.clone(),
                            buffer: delta.clone(),
                            ..OpenMessage::default()
                        });
                        steps
                    }
                    None => {
                        // Delta without a start: open an implicit assistant
                        // buffer rather than dropping agent text.
                        self.open_message = Some(OpenMessage {
                            id: message_id.clone(),
                            buffer: delta.clone(),
                            ..OpenMessage::default()
                        });
                        Vec::new()
                    }
                }
            }
            AgentEvent::MessageEnd { .. } => self.flush_message(),
            AgentEvent::ToolCallStart {
                tool_call_id,
                tool_name,
            } => {
                let steps = self.flush_tool_call();
                self.open_tool_call = Some(OpenToolCall {
                    id: Some(tool_call_id.clone()),
                    name: tool_name.clone(),
                    args: String::new(),
                });
                steps
            }
            AgentEvent::ToolCallArgs {
                tool_call_id,
                delta,
            } => {
                match &mut self.open_tool_call {
                    Some(open) if id_matches(&open.id, tool_call_id) => {
                        open.args.push_str(delta);
                    }
                    _ => {
                        tracing::debug!("tool-call-args with no matching open tool call");
                    }
                }
                Vec::new()
            }
            AgentEvent::ToolCallEnd { .. } => self.flush_tool_call(),
            AgentEvent::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => {
                let status = if *is_error {
                    StepStatus::Failure
                } else {
                    StepStatus::Success
                };
                let mut step = TrajectoryStep::new(StepType::ToolResult, content_from_value(content))
                    .with_status(status);
                if let Some(action) = self.pending_action.take() {
                    if id_matches(&action.tool_call_id, tool_call_id) {
                        let latency = step.timestamp.saturating_sub(action.timestamp);
                        step = step.with_latency_ms(latency);
                    }
                }
                vec![step]
            }
            AgentEvent::RunFinished { run_id, result } => {
                let mut steps = self.flush();
                self.run_id = run_id.clone();
                self.finished = true;
                let content = result.as_ref().map(content_from_value).unwrap_or_default();
                steps.push(TrajectoryStep::new(StepType::Response, content));
                steps
            }
            AgentEvent::RunError { .. } => {
                // Open buffers are flushed best-effort; the connector owns
                // surfacing the error itself.
                let steps = self.flush();
                self.finished = true;
                steps
            }
            AgentEvent::Unknown => Vec::new(),
        }
    }

    /// Closes any open message and tool-call buffers as best-effort steps.
    pub fn flush(&mut self) -> Vec<TrajectoryStep> {
        let mut steps = self.flush_message();
        steps.extend(self.flush_tool_call());
        steps
    }

    fn flush_message(&mut self) -> Vec<TrajectoryStep> {
        match self.open_message.take() {
            Some(open) => vec![TrajectoryStep::new(open.step_type, open.buffer)],
            None => Vec::new(),
        }
    }

    fn flush_tool_call(&mut self) -> Vec<TrajectoryStep> {
        let Some(open) = self.open_tool_call.take() else {
            return Vec::new();
        };
        // Streamed argument fragments form one JSON document; a buffer that
        // does not parse stays a raw string rather than failing the run.
        let args = if open.args.is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&open.args) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    tracing::debug!(tool = %open.name, error = %err, "tool args not valid JSON, keeping raw");
                    Some(Value::String(open.args.clone()))
                }
            }
        };
        let step = TrajectoryStep::new(StepType::Action, open.args).with_tool(open.name, args);
        self.pending_action = Some(PendingAction {
            tool_call_id: open.id,
            timestamp: step.timestamp,
        });
        vec![step]
    }
}

fn step_type_for_role(role: &str) -> StepType {
    if role.eq_ignore_ascii_case("thinking") {
        StepType::Thinking
    } else {
        StepType::Assistant
    }
}

/// Loose id match: an absent id on either side refers to the open record.
fn id_matches(open: &Option<String>, event: &Option<String>) -> bool {
    match (open, event) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}
