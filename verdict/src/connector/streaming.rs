//! Streaming connector: drive an SSE event stream and reconstruct steps
//! incrementally.
//!
//! The remote protocol emits message/tool-call lifecycle events
//! (`data: <json>\n\n` frames); this connector decodes frames, forwards every
//! payload verbatim on the raw channel, and folds the parsed events through a
//! per-call [`TrajectoryConverter`]. The stream reader is held by a
//! [`ReaderGuard`] whose release hook runs exactly once on every exit path:
//! normal completion, remote run-error, transport failure, and abandonment
//! via drop.

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use agui_event::{AgentEvent, SseFrameDecoder};

use crate::config::ConnectorType;
use crate::connector::auth::{build_auth_headers, ConnectorAuth};
use crate::connector::{emit_raw, emit_step, base_http_payload, Connector, ConnectorError, ConnectorRequest};
use crate::convert::TrajectoryConverter;
use crate::trajectory::{now_millis, ConnectorResponse, TrajectoryStep};

/// SSE streaming connector (the default protocol).
pub struct StreamingConnector {
    client: reqwest::Client,
}

impl Default for StreamingConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Uses a caller-configured client (timeouts, proxies). Deadlines are a
    /// caller concern; this connector imposes none of its own.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Runs its release hook exactly once: on explicit release, or on drop if the
/// consuming future is abandoned. The hook is infallible; a release can never
/// replace the call's own success or error outcome.
pub(crate) struct ReaderGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ReaderGuard {
    pub(crate) fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub(crate) fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// What one stream consumption produced before it ended.
#[derive(Debug)]
pub(crate) struct StreamOutcome {
    pub steps: Vec<TrajectoryStep>,
    pub raw_events: Vec<Value>,
    pub run_id: Option<String>,
}

/// A stream that ended in a remote or transport error, with the partial
/// evidence collected up to the failure point.
#[derive(Debug)]
pub(crate) struct StreamFailure {
    pub message: String,
    pub steps: Vec<TrajectoryStep>,
    pub raw_events: Vec<Value>,
    pub run_id: Option<String>,
}

/// Consumes the byte stream to completion: frames → events → steps.
///
/// The reader is released on every path out of this function; the guard's
/// drop impl covers abandonment mid-`next()`.
pub(crate) async fn drive_stream<S, B, E>(
    mut stream: S,
    mut guard: ReaderGuard,
    progress_tx: &Option<mpsc::Sender<TrajectoryStep>>,
    raw_tx: &Option<mpsc::Sender<Value>>,
) -> Result<StreamOutcome, StreamFailure>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut decoder = SseFrameDecoder::new();
    let mut converter = TrajectoryConverter::new();
    let mut steps = Vec::new();
    let mut raw_events = Vec::new();
    let mut error: Option<String> = None;

    'consume: while let Some(chunk) = stream.next().await {
        let payloads = match chunk {
            Ok(bytes) => decoder.feed(bytes.as_ref()),
            Err(err) => {
                error = Some(format!("stream read: {}", err));
                break;
            }
        };
        for payload in payloads {
            if let Some(message) = handle_payload(
                &payload,
                &mut converter,
                &mut steps,
                &mut raw_events,
                progress_tx,
                raw_tx,
            )
            .await
            {
                error = Some(message);
                break 'consume;
            }
            if converter.finished() {
                break 'consume;
            }
        }
    }

    // A trailing frame the server never terminated with a blank line.
    if error.is_none() && !converter.finished() {
        if let Some(payload) = decoder.finish() {
            if let Some(message) = handle_payload(
                &payload,
                &mut converter,
                &mut steps,
                &mut raw_events,
                progress_tx,
                raw_tx,
            )
            .await
            {
                error = Some(message);
            }
        }
    }

    for step in converter.flush() {
        emit_step(progress_tx, &step).await;
        steps.push(step);
    }
    let run_id = converter.run_id().map(String::from);
    guard.release();

    match error {
        None => Ok(StreamOutcome {
            steps,
            raw_events,
            run_id,
        }),
        Some(message) => Err(StreamFailure {
            message,
            steps,
            raw_events,
            run_id,
        }),
    }
}

/// Processes one decoded frame payload. Returns the run-error message when
/// the stream announced a remote failure.
async fn handle_payload(
    payload: &str,
    converter: &mut TrajectoryConverter,
    steps: &mut Vec<TrajectoryStep>,
    raw_events: &mut Vec<Value>,
    progress_tx: &Option<mpsc::Sender<TrajectoryStep>>,
    raw_tx: &Option<mpsc::Sender<Value>>,
) -> Option<String> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring non-JSON SSE payload");
            return None;
        }
    };
    // Every frame is forwarded, step-producing or not, so parse_response can
    // later reconstruct the trajectory from stored raw events alone.
    emit_raw(raw_tx, &value).await;
    raw_events.push(value.clone());

    let Some(event) = AgentEvent::from_value(&value) else {
        tracing::debug!("SSE payload without event type");
        return None;
    };
    let run_error = match &event {
        AgentEvent::RunError { message, code } => Some(match code {
            Some(code) => format!("{} ({})", message, code),
            None => message.clone(),
        }),
        _ => None,
    };
    for step in converter.feed(&event) {
        emit_step(progress_tx, &step).await;
        steps.push(step);
    }
    run_error
}

/// Replays stored raw events through a fresh converter.
fn steps_from_raw_events(events: &[Value]) -> Vec<TrajectoryStep> {
    let mut converter = TrajectoryConverter::new();
    let mut steps = Vec::new();
    for value in events {
        let Some(event) = AgentEvent::from_value(value) else {
            continue;
        };
        steps.extend(converter.feed(&event));
        if converter.finished() {
            break;
        }
    }
    steps.extend(converter.flush());
    steps
}

#[async_trait]
impl Connector for StreamingConnector {
    fn kind(&self) -> ConnectorType {
        ConnectorType::Streaming
    }

    fn name(&self) -> &str {
        "Streaming (SSE)"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn build_payload(&self, request: &ConnectorRequest) -> Value {
        let mut payload = base_http_payload(request);
        if let Some(thread_id) = &request.thread_id {
            payload["threadId"] = json!(thread_id);
        }
        if let Some(run_id) = &request.run_id {
            payload["runId"] = json!(run_id);
        }
        payload
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

        let mut req = self
            .client
            .post(endpoint)
            .header("Accept", "text/event-stream");
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
            let body = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let probe_endpoint = endpoint.to_string();
        let guard =
            ReaderGuard::new(move || tracing::debug!(endpoint = %probe_endpoint, "stream reader released"));
        let outcome = drive_stream(Box::pin(resp.bytes_stream()), guard, &progress_tx, &raw_tx).await;

        let metadata = json!({
            "protocol": "streaming",
            "model": request.model_id,
            "durationMs": now_millis().saturating_sub(started),
        });
        match outcome {
            Ok(outcome) => Ok(ConnectorResponse {
                trajectory: outcome.steps,
                run_id: outcome
                    .run_id
                    .unwrap_or_else(|| request.resolved_run_id()),
                raw_events: Some(outcome.raw_events),
                metadata: Some(metadata),
            }),
            Err(failure) => {
                if failure.steps.is_empty() && failure.raw_events.is_empty() {
                    return Err(ConnectorError::Transport(failure.message));
                }
                let partial = ConnectorResponse {
                    trajectory: failure.steps,
                    run_id: failure
                        .run_id
                        .unwrap_or_else(|| request.resolved_run_id()),
                    raw_events: Some(failure.raw_events),
                    metadata: Some(metadata),
                };
                Err(ConnectorError::RunFailed {
                    message: failure.message,
                    partial: Box::new(partial),
                })
            }
        }
    }

    fn parse_response(&self, raw: &Value) -> Vec<TrajectoryStep> {
        match raw {
            Value::Array(events) => steps_from_raw_events(events),
            Value::Object(map) => map
                .get("rawEvents")
                .and_then(|v| v.as_array())
                .map(|events| steps_from_raw_events(events))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sse_frame(json: &str) -> Vec<u8> {
        format!("data: {}\n\n", json).into_bytes()
    }

    fn counting_guard() -> (ReaderGuard, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let guard = ReaderGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (guard, releases)
    }

    fn shape(steps: &[TrajectoryStep]) -> Vec<(crate::trajectory::StepType, String, Option<String>)> {
        steps
            .iter()
            .map(|s| (s.step_type, s.content.clone(), s.tool_name.clone()))
            .collect()
    }

    /// **Scenario**: parse_response over the rawEvents captured during a
    /// stream reproduces the same ordered step sequence the stream emitted.
    #[tokio::test]
    async fn round_trip_raw_events_reproduce_steps() {
        let frames: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(sse_frame(r#"{"type":"message-start","messageId":"m-1","role":"assistant"}"#)),
            Ok(sse_frame(r#"{"type":"delta","messageId":"m-1","delta":"Looking at the"}"#)),
            Ok(sse_frame(r#"{"type":"delta","messageId":"m-1","delta":" error budget."}"#)),
            Ok(sse_frame(r#"{"type":"message-end","messageId":"m-1"}"#)),
            Ok(sse_frame(r#"{"type":"tool-call-start","toolCallId":"t-1","toolName":"query_metrics"}"#)),
            Ok(sse_frame(r#"{"type":"tool-call-args","toolCallId":"t-1","delta":"{\"service\":\"checkout\"}"}"#)),
            Ok(sse_frame(r#"{"type":"tool-call-end","toolCallId":"t-1"}"#)),
            Ok(sse_frame(r#"{"type":"tool-result","toolCallId":"t-1","content":{"errorRate":"12.4%"}}"#)),
            Ok(sse_frame(r#"{"type":"run-finished","runId":"run-9","result":"Root cause found"}"#)),
        ];
        let (guard, releases) = counting_guard();
        let (progress_tx, mut progress_rx) = mpsc::channel(32);

        let outcome = drive_stream(
            futures::stream::iter(frames),
            guard,
            &Some(progress_tx),
            &None,
        )
        .await
        .expect("stream completes");

        assert_eq!(outcome.run_id.as_deref(), Some("run-9"));
        assert_eq!(outcome.steps.len(), 4);
        assert_eq!(outcome.raw_events.len(), 9, "every frame forwarded");
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // Progress channel delivered the same steps in emission order.
        let mut delivered = Vec::new();
        while let Ok(step) = progress_rx.try_recv() {
            delivered.push(step);
        }
        assert_eq!(shape(&delivered), shape(&outcome.steps));

        // Pure replay from the captured raw events matches.
        let connector = StreamingConnector::new();
        let replayed = connector.parse_response(&Value::Array(outcome.raw_events.clone()));
        assert_eq!(shape(&replayed), shape(&outcome.steps));
    }

    /// **Scenario**: the transport fails before any event arrives; the
    /// reader's release hook still runs exactly once.
    #[tokio::test]
    async fn transport_error_before_any_event_releases_reader_once() {
        let frames: Vec<Result<Vec<u8>, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let (guard, releases) = counting_guard();

        let failure = drive_stream(futures::stream::iter(frames), guard, &None, &None)
            .await
            .expect_err("stream fails");

        assert!(failure.message.contains("reset"));
        assert!(failure.steps.is_empty());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: a run-error event flushes the open message as a
    /// best-effort step before the failure surfaces.
    #[tokio::test]
    async fn run_error_flushes_open_buffers_and_fails() {
        let frames: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(sse_frame(r#"{"type":"message-start","messageId":"m-1","role":"assistant"}"#)),
            Ok(sse_frame(r#"{"type":"delta","messageId":"m-1","delta":"partial answer"}"#)),
            Ok(sse_frame(r#"{"type":"run-error","message":"agent crashed","code":"E42"}"#)),
        ];
        let (guard, releases) = counting_guard();

        let failure = drive_stream(futures::stream::iter(frames), guard, &None, &None)
            .await
            .expect_err("run error surfaces");

        assert!(failure.message.contains("agent crashed"));
        assert!(failure.message.contains("E42"));
        assert_eq!(failure.steps.len(), 1);
        assert_eq!(failure.steps[0].content, "partial answer");
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: abandoning the consuming future mid-stream still runs
    /// the release hook (via the guard's drop), exactly once.
    #[tokio::test]
    async fn abandoned_call_releases_reader_via_drop() {
        let (guard, releases) = counting_guard();
        let pending = futures::stream::pending::<Result<Vec<u8>, std::io::Error>>();
        let fut = drive_stream(pending, guard, &None, &None);
        // Poll once so the consumption loop is genuinely in flight, then drop.
        tokio::select! {
            biased;
            _ = fut => panic!("pending stream cannot complete"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parse_response_accepts_wrapped_raw_events() {
        let connector = StreamingConnector::new();
        let raw = json!({"rawEvents": [
            {"type": "message-start", "messageId": "m-1", "role": "thinking"},
            {"type": "delta", "messageId": "m-1", "delta": "hm"},
            {"type": "message-end", "messageId": "m-1"}
        ]});
        let steps = connector.parse_response(&raw);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].content, "hm");
    }
}
