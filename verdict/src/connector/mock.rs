//! Mock connector: a deterministic, scripted root-cause-analysis session.
//!
//! No network. Used by demos and integration tests as a drop-in for real
//! connectors: it honors the same progress/raw emission guarantees, so a test
//! that passes against the mock exercises the full contract surface.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ConnectorType;
use crate::connector::{emit_raw, emit_step, Connector, ConnectorError, ConnectorRequest};
use crate::connector::auth::ConnectorAuth;
use crate::trajectory::{
    now_millis, ConnectorResponse, StepStatus, StepType, TrajectoryStep,
};

/// Default pacing between scripted steps.
const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(300);

/// Deterministic simulator connector.
pub struct MockConnector {
    step_delay: Duration,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
        }
    }

    /// Overrides the pacing delay; tests use `Duration::ZERO`.
    pub fn with_step_delay(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    /// The seven-step scripted session. Content is fixed; ids and timestamps
    /// are stamped fresh per call.
    fn script(&self, request: &ConnectorRequest) -> Vec<TrajectoryStep> {
        let prompt = &request.test_case.initial_prompt;
        vec![
            TrajectoryStep::new(
                StepType::Thinking,
                format!(
                    "Reading the incident description and identifying affected services: {}",
                    prompt
                ),
            ),
            TrajectoryStep::new(StepType::Action, r#"{"service":"checkout","window":"30m"}"#)
                .with_tool(
                    "query_metrics",
                    Some(json!({"service": "checkout", "window": "30m"})),
                ),
            TrajectoryStep::new(
                StepType::ToolResult,
                r#"{"errorRate":"12.4%","baseline":"0.3%"}"#,
            )
            .with_status(StepStatus::Success)
            .with_latency_ms(420),
            TrajectoryStep::new(
                StepType::Thinking,
                "Error rate spike begins at 14:02, right after a deployment. Checking the deploy's logs.",
            ),
            TrajectoryStep::new(StepType::Action, r#"{"query":"deploy checkout 14:02"}"#)
                .with_tool("search_logs", Some(json!({"query": "deploy checkout 14:02"}))),
            TrajectoryStep::new(
                StepType::ToolResult,
                r#"{"hits":17,"top":"connection pool exhausted"}"#,
            )
            .with_status(StepStatus::Success)
            .with_latency_ms(310),
            TrajectoryStep::new(
                StepType::Response,
                "Root cause: the 14:02 checkout deployment shrank the database connection pool; \
                 requests queue until they time out, producing the 5xx spike. Roll back the pool \
                 configuration change.",
            ),
        ]
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn kind(&self) -> ConnectorType {
        ConnectorType::Mock
    }

    fn name(&self) -> &str {
        "Mock (simulator)"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn build_payload(&self, request: &ConnectorRequest) -> Value {
        json!({
            "prompt": request.test_case.initial_prompt,
            "model": request.model_id,
        })
    }

    async fn execute(
        &self,
        _endpoint: &str,
        request: &ConnectorRequest,
        _auth: &ConnectorAuth,
        progress_tx: Option<mpsc::Sender<TrajectoryStep>>,
        raw_tx: Option<mpsc::Sender<Value>>,
    ) -> Result<ConnectorResponse, ConnectorError> {
        let started = now_millis();
        let mut trajectory = Vec::new();
        let mut raw_events = Vec::new();

        for step in self.script(request) {
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            // The raw event for a simulated step is the step itself.
            let raw = serde_json::to_value(&step)
                .map_err(|err| ConnectorError::Transport(err.to_string()))?;
            emit_raw(&raw_tx, &raw).await;
            raw_events.push(raw);
            emit_step(&progress_tx, &step).await;
            trajectory.push(step);
        }

        Ok(ConnectorResponse {
            trajectory,
            run_id: request.resolved_run_id(),
            raw_events: Some(raw_events),
            metadata: Some(json!({
                "protocol": "mock",
                "model": request.model_id,
                "durationMs": now_millis().saturating_sub(started),
            })),
        })
    }

    fn parse_response(&self, raw: &Value) -> Vec<TrajectoryStep> {
        let events = match raw {
            Value::Array(events) => events.as_slice(),
            Value::Object(map) => match map.get("rawEvents").and_then(|v| v.as_array()) {
                Some(events) => events.as_slice(),
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        events
            .iter()
            .filter_map(|event| serde_json::from_value(event.clone()).ok())
            .collect()
    }

    /// The simulator is always reachable.
    async fn health_check(&self, _endpoint: &str, _auth: &ConnectorAuth) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TestCase;

    fn request() -> ConnectorRequest {
        ConnectorRequest {
            test_case: TestCase {
                id: "tc-1".to_string(),
                initial_prompt: "Why did checkout error out?".to_string(),
                context: vec![],
                expected_outcomes: vec![],
                tools: None,
            },
            model_id: "model-a".to_string(),
            thread_id: None,
            run_id: Some("run-1".to_string()),
        }
    }

    #[tokio::test]
    async fn script_has_seven_steps_ending_in_response() {
        let connector = MockConnector::with_step_delay(Duration::ZERO);
        let response = connector
            .execute("mock://demo", &request(), &ConnectorAuth::default(), None, None)
            .await
            .unwrap();
        assert_eq!(response.trajectory.len(), 7);
        assert_eq!(response.trajectory[0].step_type, StepType::Thinking);
        assert_eq!(response.trajectory[6].step_type, StepType::Response);
        assert_eq!(response.run_id, "run-1");
    }

    #[tokio::test]
    async fn parse_response_round_trips_raw_events() {
        let connector = MockConnector::with_step_delay(Duration::ZERO);
        let response = connector
            .execute("mock://demo", &request(), &ConnectorAuth::default(), None, None)
            .await
            .unwrap();
        let replayed =
            connector.parse_response(&Value::Array(response.raw_events.clone().unwrap()));
        assert_eq!(replayed, response.trajectory);
    }
}
