//! Replay/audit path: reconstructing trajectories from stored raw data
//! through the public API, without any network.


use serde_json::json;

use verdict::{
    Connector, RestConnector, StepType, StreamingConnector, TrajectoryConverter,
};
use agui_event::AgentEvent;

/// **Scenario**: feeding a stored raw event array to parse_response yields
/// the same step sequence as feeding the parsed events through a converter;
/// the two reconstruction paths agree.
#[test]
fn streaming_parse_response_matches_direct_conversion() {
    let raw_events = vec![
        json!({"type": "message-start", "messageId": "m-1", "role": "thinking"}),
        json!({"type": "delta", "messageId": "m-1", "delta": "correlating deploys"}),
        json!({"type": "message-end", "messageId": "m-1"}),
        json!({"type": "tool-call-start", "toolCallId": "t-1", "toolName": "query_metrics"}),
        json!({"type": "tool-call-args", "toolCallId": "t-1", "delta": "{\"service\":\"checkout\"}"}),
        json!({"type": "tool-call-end", "toolCallId": "t-1"}),
        json!({"type": "tool-result", "toolCallId": "t-1", "content": "ok"}),
        json!({"type": "run-finished", "runId": "run-3", "result": "done"}),
    ];

    let connector = StreamingConnector::new();
    let parsed = connector.parse_response(&json!(raw_events));

    let mut converter = TrajectoryConverter::new();
    let mut direct = Vec::new();
    for value in &raw_events {
        let event = AgentEvent::from_value(value).expect("valid event");
        direct.extend(converter.feed(&event));
    }
    direct.extend(converter.flush());

    let shape = |steps: &[verdict::TrajectoryStep]| {
        steps
            .iter()
            .map(|s| (s.step_type, s.content.clone(), s.tool_name.clone(), s.status))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&parsed), shape(&direct));
    assert_eq!(parsed.len(), 4);
    assert_eq!(parsed[0].step_type, StepType::Thinking);
    assert_eq!(parsed[3].step_type, StepType::Response);
}

/// **Scenario**: events after the terminal run-finished are not replayed:
/// the converter stops at the run boundary on both paths.
#[test]
fn replay_stops_at_terminal_event() {
    let raw_events = json!([
        {"type": "run-finished", "result": "early"},
        {"type": "message-start", "messageId": "m-9", "role": "assistant"},
        {"type": "delta", "messageId": "m-9", "delta": "late text"},
        {"type": "message-end", "messageId": "m-9"}
    ]);
    let connector = StreamingConnector::new();
    let steps = connector.parse_response(&raw_events);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].content, "early");
}

/// **Scenario**: REST raw payloads replay through the same heuristics as the
/// live parse, including the JSON-stringified object rule.
#[test]
fn rest_parse_response_replays_stored_body() {
    let connector = RestConnector::new();
    let steps = connector.parse_response(&json!({"response": {"a": 1}}));
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step_type, StepType::Response);
    assert_eq!(steps[0].content, r#"{"a":1}"#);

    // Stored as the one-element rawEvents array form.
    let steps = connector.parse_response(&json!([{"answer": "scale up"}]));
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].content, "scale up");
}
