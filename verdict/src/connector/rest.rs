//! REST connector: single synchronous request/response.
//!
//! No incremental progress is possible here, so steps are delivered on the
//! progress channel only after the full response body is parsed. Response
//! bodies come in several known shapes (plain agent replies, tool-call
//! transcripts, ML-platform inference envelopes); parsing applies the checks
//! in a fixed priority order, and an unrecognized body still yields one
//! generic response step wrapping the payload.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::ConnectorType;
use crate::connector::auth::{build_auth_headers, ConnectorAuth};
use crate::connector::{
    base_http_payload, emit_raw, emit_step, http_health_check, Connector, ConnectorError,
    ConnectorRequest,
};
use crate::trajectory::{
    content_from_value, now_millis, ConnectorResponse, StepStatus, StepType, TrajectoryStep,
};

/// Synchronous request/response connector.
pub struct RestConnector {
    client: reqwest::Client,
}

impl Default for RestConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl RestConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Uses a caller-configured client (timeouts, proxies).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// The nested ML-platform answer path:
/// `inference_results[0].output[].dataAsMap.response`.
fn inference_response(value: &Value) -> Option<&Value> {
    let outputs = value
        .pointer("/inference_results/0/output")?
        .as_array()?;
    outputs
        .iter()
        .find_map(|output| output.pointer("/dataAsMap/response"))
}

/// Applies the heuristic checks to one response body.
///
/// The checks are independent (a body may carry `thinking`, `toolCalls`,
/// and an answer field at once), but at most one terminal response step is
/// emitted, from the first answer-shaped field found. When nothing matches,
/// the whole payload becomes one generic response step.
fn steps_from_body(body: &Value) -> Vec<TrajectoryStep> {
    let mut steps = Vec::new();

    if let Some(thinking) = body.get("thinking") {
        steps.push(TrajectoryStep::new(
            StepType::Thinking,
            content_from_value(thinking),
        ));
    }

    if let Some(calls) = body.get("toolCalls").and_then(|c| c.as_array()) {
        for call in calls {
            let name = call
                .get("toolName")
                .or_else(|| call.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("tool");
            let args = call
                .get("toolArgs")
                .or_else(|| call.get("args"))
                .or_else(|| call.get("input"))
                .cloned();
            let content = args
                .as_ref()
                .map(|a| serde_json::to_string(a).unwrap_or_default())
                .unwrap_or_default();
            steps.push(TrajectoryStep::new(StepType::Action, content).with_tool(name, args));

            let result = call
                .get("result")
                .or_else(|| call.get("output"))
                .map(content_from_value)
                .unwrap_or_default();
            let failed = match call.get("isError").or_else(|| call.get("error")) {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                // A non-boolean error field carries the error itself.
                Some(_) => true,
            };
            let status = if failed {
                StepStatus::Failure
            } else {
                StepStatus::Success
            };
            let mut step = TrajectoryStep::new(StepType::ToolResult, result).with_status(status);
            if let Some(latency) = call.get("latencyMs").and_then(|l| l.as_u64()) {
                step = step.with_latency_ms(latency);
            }
            steps.push(step);
        }
    }

    let answer = body
        .get("response")
        .or_else(|| body.get("content"))
        .or_else(|| body.get("answer"))
        .or_else(|| inference_response(body));
    if let Some(answer) = answer {
        steps.push(TrajectoryStep::new(
            StepType::Response,
            content_from_value(answer),
        ));
    }

    if steps.is_empty() {
        steps.push(TrajectoryStep::new(
            StepType::Response,
            content_from_value(body),
        ));
    }
    steps
}

#[async_trait]
impl Connector for RestConnector {
    fn kind(&self) -> ConnectorType {
        ConnectorType::Rest
    }

    fn name(&self) -> &str {
        "REST (synchronous)"
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn build_payload(&self, request: &ConnectorRequest) -> Value {
        base_http_payload(request)
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
        let payload = self.build_payload(request);

        let mut req = self.client.post(endpoint);
        for (name, value) in build_auth_headers(auth) {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .json(&payload)
            .send()
            .await
            .map_err(|err| ConnectorError::Transport(format!("connect {}: {}", endpoint, err)))?;
        let status = resp.status();
        if !status.is_success() {
            // Hard failure: no partial trajectory exists for a rejected call.
            let body = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|err| ConnectorError::Transport(format!("response body: {}", err)))?;
        emit_raw(&raw_tx, &body).await;

        let steps = steps_from_body(&body);
        for step in &steps {
            emit_step(&progress_tx, step).await;
        }

        Ok(ConnectorResponse {
            trajectory: steps,
            run_id: request.resolved_run_id(),
            raw_events: Some(vec![body]),
            metadata: Some(json!({
                "protocol": "rest",
                "model": request.model_id,
                "httpStatus": status.as_u16(),
                "durationMs": now_millis().saturating_sub(started),
            })),
        })
    }

    fn parse_response(&self, raw: &Value) -> Vec<TrajectoryStep> {
        // Stored raw events for this protocol are a single response body,
        // possibly wrapped in the one-element rawEvents array.
        match raw {
            Value::Array(events) => events.first().map(steps_from_body).unwrap_or_default(),
            other => steps_from_body(other),
        }
    }

    async fn health_check(&self, endpoint: &str, auth: &ConnectorAuth) -> bool {
        http_health_check(&self.client, endpoint, auth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: `{"response": {"a":1}}` yields one response step whose
    /// content is the JSON string `{"a":1}`, not a display-format mangling.
    #[test]
    fn object_answer_is_json_stringified() {
        let steps = steps_from_body(&json!({"response": {"a": 1}}));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, StepType::Response);
        assert_eq!(steps[0].content, r#"{"a":1}"#);
    }

    #[test]
    fn answer_field_priority_is_response_content_answer() {
        let steps = steps_from_body(&json!({"content": "b", "answer": "c"}));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].content, "b");
    }

    #[test]
    fn inference_results_path_is_found() {
        let body = json!({
            "inference_results": [{
                "output": [
                    {"name": "memory_id", "dataAsMap": {"memoryId": "x"}},
                    {"name": "answer", "dataAsMap": {"response": "scale the pool"}}
                ]
            }]
        });
        let steps = steps_from_body(&body);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].content, "scale the pool");
    }

    #[test]
    fn thinking_and_tool_calls_combine_with_answer() {
        let body = json!({
            "thinking": "correlate deploys with errors",
            "toolCalls": [{
                "toolName": "query_metrics",
                "toolArgs": {"service": "checkout"},
                "result": {"errorRate": "12%"},
                "latencyMs": 80
            }],
            "response": "the 14:02 deploy"
        });
        let steps = steps_from_body(&body);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].step_type, StepType::Thinking);
        assert_eq!(steps[1].step_type, StepType::Action);
        assert_eq!(steps[1].tool_name.as_deref(), Some("query_metrics"));
        assert_eq!(steps[2].step_type, StepType::ToolResult);
        assert_eq!(steps[2].status, Some(StepStatus::Success));
        assert_eq!(steps[2].latency_ms, Some(80));
        assert_eq!(steps[3].step_type, StepType::Response);
    }

    #[test]
    fn tool_call_error_flag_maps_to_failure() {
        let body = json!({"toolCalls": [{"name": "search_logs", "isError": true}], "answer": "?"});
        let steps = steps_from_body(&body);
        assert_eq!(steps[1].status, Some(StepStatus::Failure));
    }

    #[test]
    fn unrecognized_body_becomes_generic_response_step() {
        let body = json!({"weird": true, "fields": [1, 2]});
        let steps = steps_from_body(&body);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, StepType::Response);
        assert_eq!(steps[0].content, serde_json::to_string(&body).unwrap());
    }

    /// **Scenario**: a connection that cannot be established makes the probe
    /// return false instead of erroring.
    #[tokio::test]
    async fn health_check_is_false_for_unreachable_endpoint() {
        let connector = RestConnector::new();
        let auth = ConnectorAuth::default();
        assert!(!connector.health_check("http://127.0.0.1:1/agent", &auth).await);
    }
}
