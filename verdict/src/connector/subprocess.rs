//! Subprocess connector: run a local executable and fold its
//! newline-delimited JSON stdout into trajectory steps.
//!
//! The composed prompt (context bullet list, then the task) is the only
//! stdin write; stdin is closed afterwards and the process's exit is treated
//! as end-of-stream. Stdout is read incrementally through a line splitter
//! that carries the partial-line remainder across reads, since agent CLIs
//! buffer. Auth travels as environment variables, never as argv.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::ConnectorType;
use crate::connector::auth::{build_auth_env, ConnectorAuth};
use crate::connector::{emit_raw, emit_step, Connector, ConnectorError, ConnectorRequest};
use crate::trajectory::{
    content_from_value, now_millis, ConnectorResponse, StepStatus, StepType, TrajectoryStep,
};

/// How much stderr to attach to a failure step.
const STDERR_TAIL_CHARS: usize = 500;

/// Connector for agents shipped as local executables.
#[derive(Default)]
pub struct SubprocessConnector;

impl SubprocessConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Splits a byte stream into lines, carrying the partial-line remainder
/// across reads.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    remainder: String,
}

impl LineSplitter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds one read's bytes; returns the lines it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.remainder.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.remainder.find('\n') {
            let mut line: String = self.remainder.drain(..=pos).collect();
            line.truncate(line.trim_end_matches(['\n', '\r']).len());
            lines.push(line);
        }
        lines
    }

    /// Flushes a trailing line the process never terminated with a newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.remainder);
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Renders the prompt the executable reads from stdin: a context bullet list,
/// then the task with its expected outcomes.
fn compose_prompt(request: &ConnectorRequest) -> String {
    let test_case = &request.test_case;
    let mut prompt = String::new();
    if !test_case.context.is_empty() {
        prompt.push_str("## Context\n\n");
        for item in &test_case.context {
            prompt.push_str(&format!("- **{}:** {}\n", item.description, item.value));
        }
        prompt.push('\n');
    }
    prompt.push_str("## Task\n\n");
    prompt.push_str(&test_case.initial_prompt);
    prompt.push('\n');
    if !test_case.expected_outcomes.is_empty() {
        prompt.push_str("\n### Expected outcomes\n\n");
        for outcome in &test_case.expected_outcomes {
            prompt.push_str(&format!("- {}\n", outcome));
        }
    }
    prompt
}

/// Classifies one parsed stdout object into steps.
///
/// `{"type":"assistant"}` carries content blocks (text / thinking /
/// tool_use); `{"type":"tool_result"}` and `{"type":"result"}` map directly.
/// Anything else degrades to a generic assistant step wrapping the payload.
fn steps_from_json(value: &Value) -> Vec<TrajectoryStep> {
    match value.get("type").and_then(|t| t.as_str()) {
        Some("assistant") => {
            let Some(blocks) = value.pointer("/message/content").and_then(|c| c.as_array()) else {
                return Vec::new();
            };
            let mut steps = Vec::new();
            for block in blocks {
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("text") => {
                        let text = block.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                        steps.push(TrajectoryStep::new(StepType::Assistant, text));
                    }
                    Some("thinking") => {
                        let text = block
                            .get("thinking")
                            .or_else(|| block.get("text"))
                            .and_then(|t| t.as_str())
                            .unwrap_or_default();
                        steps.push(TrajectoryStep::new(StepType::Thinking, text));
                    }
                    Some("tool_use") => {
                        let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("tool");
                        let input = block.get("input").cloned();
                        let content = input
                            .as_ref()
                            .map(|i| serde_json::to_string(i).unwrap_or_default())
                            .unwrap_or_default();
                        steps.push(
                            TrajectoryStep::new(StepType::Action, content).with_tool(name, input),
                        );
                    }
                    _ => {}
                }
            }
            steps
        }
        Some("tool_result") => {
            let content = value.get("content").map(content_from_value).unwrap_or_default();
            let status = if value.get("is_error").and_then(|e| e.as_bool()).unwrap_or(false) {
                StepStatus::Failure
            } else {
                StepStatus::Success
            };
            vec![TrajectoryStep::new(StepType::ToolResult, content).with_status(status)]
        }
        Some("result") => {
            let content = value.get("result").map(content_from_value).unwrap_or_default();
            vec![TrajectoryStep::new(StepType::Response, content)]
        }
        _ => vec![TrajectoryStep::new(
            StepType::Assistant,
            serde_json::to_string(value).unwrap_or_default(),
        )],
    }
}

/// One stdout line → (raw event, steps). Non-JSON lines degrade to a generic
/// assistant step carrying the raw text.
fn classify_line(line: &str) -> Option<(Value, Vec<TrajectoryStep>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            let steps = steps_from_json(&value);
            Some((value, steps))
        }
        Err(err) => {
            tracing::debug!(error = %err, "non-JSON agent output line, degrading to assistant step");
            Some((
                Value::String(trimmed.to_string()),
                vec![TrajectoryStep::new(StepType::Assistant, trimmed)],
            ))
        }
    }
}

fn stderr_tail(stderr: &str, max_chars: usize) -> &str {
    let trimmed = stderr.trim();
    match trimmed.char_indices().nth_back(max_chars.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

#[async_trait]
impl Connector for SubprocessConnector {
    fn kind(&self) -> ConnectorType {
        ConnectorType::Subprocess
    }

    fn name(&self) -> &str {
        "Subprocess (stdio)"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    /// The payload for this protocol is the composed stdin prompt.
    fn build_payload(&self, request: &ConnectorRequest) -> Value {
        Value::String(compose_prompt(request))
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: &ConnectorRequest,
        auth: &ConnectorAuth,
        progress_tx: Option<mpsc::Sender<TrajectoryStep>>,
        raw_tx: Option<mpsc::Sender<Value>>,
    ) -> Result<ConnectorResponse, ConnectorError> {
        let started = now_millis();
        let mut words = endpoint.split_whitespace();
        let program = words.next().ok_or_else(|| {
            ConnectorError::Configuration("subprocess endpoint is empty".to_string())
        })?;
        let args: Vec<&str> = words.collect();
        let prompt = compose_prompt(request);

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in build_auth_env(auth) {
            command.env(name, value);
        }
        let mut child = command
            .spawn()
            .map_err(|err| ConnectorError::Transport(format!("spawn {}: {}", program, err)))?;

        // The initial prompt is the only stdin write; closing the pipe tells
        // the agent input is complete. A write failure means the process died
        // early; keep reading stdout for whatever it managed to say.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                tracing::warn!(error = %err, "writing prompt to agent stdin failed");
            }
            let _ = stdin.shutdown().await;
        }

        let stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr_pipe {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        let mut stdout = child.stdout.take().ok_or_else(|| {
            ConnectorError::Transport("agent stdout pipe unavailable".to_string())
        })?;

        let mut splitter = LineSplitter::new();
        let mut steps = Vec::new();
        let mut raw_events = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stdout.read(&mut chunk).await {
                Ok(n) => n,
                Err(err) => {
                    let _ = child.start_kill();
                    return Err(ConnectorError::Transport(format!(
                        "reading agent stdout: {}",
                        err
                    )));
                }
            };
            if n == 0 {
                break;
            }
            for line in splitter.push(&chunk[..n]) {
                if let Some((raw, line_steps)) = classify_line(&line) {
                    emit_raw(&raw_tx, &raw).await;
                    raw_events.push(raw);
                    for step in line_steps {
                        emit_step(&progress_tx, &step).await;
                        steps.push(step);
                    }
                }
            }
        }
        if let Some(rest) = splitter.finish() {
            if let Some((raw, line_steps)) = classify_line(&rest) {
                emit_raw(&raw_tx, &raw).await;
                raw_events.push(raw);
                for step in line_steps {
                    emit_step(&progress_tx, &step).await;
                    steps.push(step);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| ConnectorError::Transport(format!("waiting for agent: {}", err)))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        // Graceful degradation: a failed exit becomes a failure step, not a
        // discarded trajectory.
        if !status.success() {
            let mut content = match status.code() {
                Some(code) => format!("agent process exited with status {}", code),
                None => "agent process terminated by signal".to_string(),
            };
            let tail = stderr_tail(&stderr_text, STDERR_TAIL_CHARS);
            if !tail.is_empty() {
                content.push_str(": ");
                content.push_str(tail);
            }
            tracing::warn!(exit = ?status.code(), "agent process failed");
            let step = TrajectoryStep::new(StepType::Response, content);
            emit_step(&progress_tx, &step).await;
            steps.push(step);
        }

        Ok(ConnectorResponse {
            trajectory: steps,
            run_id: request.resolved_run_id(),
            raw_events: Some(raw_events),
            metadata: Some(json!({
                "protocol": "subprocess",
                "model": request.model_id,
                "exitCode": status.code(),
                "durationMs": now_millis().saturating_sub(started),
            })),
        })
    }

    /// Replays captured stdout: an array of raw events (JSON objects or raw
    /// line strings) or one transcript string with embedded newlines.
    fn parse_response(&self, raw: &Value) -> Vec<TrajectoryStep> {
        match raw {
            Value::Array(events) => events
                .iter()
                .flat_map(|event| match event {
                    Value::String(line) => {
                        classify_line(line).map(|(_, steps)| steps).unwrap_or_default()
                    }
                    other => steps_from_json(other),
                })
                .collect(),
            Value::String(transcript) => transcript
                .lines()
                .filter_map(classify_line)
                .flat_map(|(_, steps)| steps)
                .collect(),
            Value::Object(map) => map
                .get("rawEvents")
                .map(|events| self.parse_response(events))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Reachability here means the configured executable exists on PATH.
    async fn health_check(&self, endpoint: &str, _auth: &ConnectorAuth) -> bool {
        match endpoint.split_whitespace().next() {
            Some(program) => which::which(program).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ContextItem, TestCase};
    use serde_json::json;

    fn request() -> ConnectorRequest {
        ConnectorRequest {
            test_case: TestCase {
                id: "tc-1".to_string(),
                initial_prompt: "Find the root cause of the 5xx spike.".to_string(),
                context: vec![
                    ContextItem {
                        description: "Service".to_string(),
                        value: "checkout".to_string(),
                    },
                    ContextItem {
                        description: "Window".to_string(),
                        value: "14:00-14:30".to_string(),
                    },
                ],
                expected_outcomes: vec!["names the faulty deploy".to_string()],
                tools: None,
            },
            model_id: "model-a".to_string(),
            thread_id: None,
            run_id: None,
        }
    }

    #[test]
    fn line_splitter_carries_partial_lines_across_reads() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"{\"a\":").is_empty());
        assert_eq!(splitter.push(b"1}\n{\"b\":2}\npar"), vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(splitter.finish(), Some("par".to_string()));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn line_splitter_strips_crlf() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"one\r\ntwo\n"), vec!["one", "two"]);
    }

    #[test]
    fn prompt_renders_context_bullets_then_task() {
        let prompt = compose_prompt(&request());
        assert!(prompt.starts_with("## Context\n\n- **Service:** checkout\n- **Window:** 14:00-14:30\n"));
        assert!(prompt.contains("## Task\n\nFind the root cause of the 5xx spike."));
        assert!(prompt.contains("### Expected outcomes\n\n- names the faulty deploy"));
    }

    /// **Scenario**: `{"type":"tool_result","content":"x","is_error":true}`
    /// yields one tool_result step with FAILURE status.
    #[test]
    fn tool_result_line_maps_is_error_to_failure() {
        let (_, steps) =
            classify_line(r#"{"type":"tool_result","content":"x","is_error":true}"#).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, StepType::ToolResult);
        assert_eq!(steps[0].status, Some(StepStatus::Failure));
        assert_eq!(steps[0].content, "x");
    }

    #[test]
    fn assistant_line_splits_content_blocks_into_steps() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"thinking","thinking":"cross-checking deploys"},
            {"type":"text","text":"The spike starts at 14:02."},
            {"type":"tool_use","name":"search_logs","input":{"query":"error"}}
        ]}}"#;
        let (_, steps) = classify_line(line).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].step_type, StepType::Thinking);
        assert_eq!(steps[1].step_type, StepType::Assistant);
        assert_eq!(steps[2].step_type, StepType::Action);
        assert_eq!(steps[2].tool_name.as_deref(), Some("search_logs"));
        assert_eq!(steps[2].tool_args, Some(json!({"query": "error"})));
    }

    #[test]
    fn non_json_line_degrades_to_assistant_step() {
        let (raw, steps) = classify_line("warming up...").unwrap();
        assert_eq!(raw, Value::String("warming up...".to_string()));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, StepType::Assistant);
        assert_eq!(steps[0].content, "warming up...");
    }

    #[test]
    fn result_line_becomes_terminal_response() {
        let (_, steps) = classify_line(r#"{"type":"result","result":{"verdict":"deploy"}}"#).unwrap();
        assert_eq!(steps[0].step_type, StepType::Response);
        assert_eq!(steps[0].content, r#"{"verdict":"deploy"}"#);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(classify_line("   ").is_none());
    }

    #[test]
    fn parse_response_replays_a_transcript_string() {
        let connector = SubprocessConnector::new();
        let transcript = concat!(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}\n",
            "{\"type\":\"result\",\"result\":\"done\"}\n",
        );
        let steps = connector.parse_response(&Value::String(transcript.to_string()));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].step_type, StepType::Response);
    }
}
