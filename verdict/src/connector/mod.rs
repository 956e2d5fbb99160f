//! Connector capability contract and the four protocol implementations.
//!
//! A connector translates one wire protocol into the canonical trajectory:
//! `execute()` performs the protocol I/O, sends each completed
//! [`TrajectoryStep`] on `progress_tx` in emission order and each raw protocol
//! message on `raw_tx` (whether or not it produced a step), and returns the
//! assembled [`ConnectorResponse`]. `build_payload` and `parse_response` are
//! pure; `health_check` never errors.
//!
//! Implementations: [`StreamingConnector`] (SSE), [`RestConnector`]
//! (single request/response), [`SubprocessConnector`] (local executable,
//! newline-delimited JSON), [`MockConnector`] (deterministic simulator).

pub mod auth;
mod error;
mod mock;
mod rest;
mod streaming;
mod subprocess;

pub use auth::{build_auth_env, build_auth_headers, header_value, ConnectorAuth};
pub use error::ConnectorError;
pub use mock::MockConnector;
pub use rest::RestConnector;
pub use streaming::StreamingConnector;
pub use subprocess::SubprocessConnector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::ConnectorType;
use crate::trajectory::{generate_id, ConnectorResponse, TrajectoryStep};

/// One labelled piece of context handed to the agent with the test case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub description: String,
    pub value: String,
}

/// The question one evaluation poses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub initial_prompt: String,
    #[serde(default)]
    pub context: Vec<ContextItem>,
    #[serde(default)]
    pub expected_outcomes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

/// Input to one `execute()` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRequest {
    pub test_case: TestCase,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl ConnectorRequest {
    /// The run id for this attempt: the caller's if given, else generated.
    pub fn resolved_run_id(&self) -> String {
        self.run_id.clone().unwrap_or_else(generate_id)
    }
}

/// Protocol adapter: request in, recorded trajectory out.
///
/// `execute()` is the only operation allowed to perform I/O. Within one call,
/// `progress_tx` and `raw_tx` sends happen in strict emission order matching
/// the underlying event/line order; there is no ordering across concurrent
/// calls. Per-call state is allocated fresh per call; a second `execute()`
/// on the same instance starts from a clean slate.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Protocol discriminant this connector serves.
    fn kind(&self) -> ConnectorType;

    /// Human-readable connector name.
    fn name(&self) -> &str;

    /// Whether steps are delivered incrementally during `execute()`.
    fn supports_streaming(&self) -> bool;

    /// Builds the protocol-specific payload for a request. Pure, no I/O.
    fn build_payload(&self, request: &ConnectorRequest) -> Value;

    /// Runs one evaluation attempt against `endpoint`.
    ///
    /// Sends each completed step on `progress_tx` and each raw protocol
    /// message on `raw_tx` (both optional). Underlying resources (stream
    /// readers, spawned processes) are released on every exit path, including
    /// abandonment, before any error propagates.
    async fn execute(
        &self,
        endpoint: &str,
        request: &ConnectorRequest,
        auth: &ConnectorAuth,
        progress_tx: Option<mpsc::Sender<TrajectoryStep>>,
        raw_tx: Option<mpsc::Sender<Value>>,
    ) -> Result<ConnectorResponse, ConnectorError>;

    /// Reconstructs the trajectory from previously captured raw data.
    ///
    /// Pure: no network. Malformed entries are tolerated and skipped.
    fn parse_response(&self, raw: &Value) -> Vec<TrajectoryStep>;

    /// Best-effort reachability probe. Never errors; `false` on any failure.
    async fn health_check(&self, endpoint: &str, auth: &ConnectorAuth) -> bool {
        http_health_check(&reqwest::Client::new(), endpoint, auth).await
    }
}

/// Shared HEAD→OPTIONS probe for HTTP connectors. Any response counts as
/// reachable; transport failures log at debug and yield `false`.
pub(crate) async fn http_health_check(
    client: &reqwest::Client,
    endpoint: &str,
    auth: &ConnectorAuth,
) -> bool {
    for method in [reqwest::Method::HEAD, reqwest::Method::OPTIONS] {
        let mut req = client.request(method.clone(), endpoint);
        for (name, value) in build_auth_headers(auth) {
            req = req.header(name.as_str(), value.as_str());
        }
        match req.send().await {
            Ok(_) => return true,
            Err(err) => {
                tracing::debug!(endpoint, method = %method, error = %err, "health probe failed");
            }
        }
    }
    false
}

/// Sends one step on the progress channel, if attached.
pub(crate) async fn emit_step(tx: &Option<mpsc::Sender<TrajectoryStep>>, step: &TrajectoryStep) {
    if let Some(tx) = tx {
        let _ = tx.send(step.clone()).await;
    }
}

/// Forwards one raw protocol message, if a raw channel is attached.
pub(crate) async fn emit_raw(tx: &Option<mpsc::Sender<Value>>, raw: &Value) {
    if let Some(tx) = tx {
        let _ = tx.send(raw.clone()).await;
    }
}

/// JSON POST body shared by the HTTP connectors: `{prompt, context, model,
/// tools?}`.
pub(crate) fn base_http_payload(request: &ConnectorRequest) -> Value {
    let mut payload = json!({
        "prompt": request.test_case.initial_prompt,
        "context": request.test_case.context,
        "model": request.model_id,
    });
    if let Some(tools) = &request.test_case.tools {
        payload["tools"] = json!(tools);
    }
    payload
}
