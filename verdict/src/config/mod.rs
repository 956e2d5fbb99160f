//! Agent configuration model consumed by the connector registry.
//!
//! Config *files* are parsed elsewhere; this module only owns the data shape
//! the registry resolves against. An absent `connector_type` means the
//! streaming protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol discriminant an agent config declares.
///
/// A closed sum over the known protocols; configs carrying a discriminant this
/// build does not know land in `Other` and resolve through the registry's
/// documented streaming fallback instead of failing at parse time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorType {
    /// SSE event stream (the default protocol).
    Streaming,
    /// Single synchronous request/response.
    Rest,
    /// Local executable speaking newline-delimited JSON.
    Subprocess,
    /// Deterministic simulator, no network.
    Mock,
    /// Unrecognized discriminant, kept verbatim.
    Other(String),
}

impl ConnectorType {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectorType::Streaming => "streaming",
            ConnectorType::Rest => "rest",
            ConnectorType::Subprocess => "subprocess",
            ConnectorType::Mock => "mock",
            ConnectorType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for ConnectorType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "streaming" => ConnectorType::Streaming,
            "rest" => ConnectorType::Rest,
            "subprocess" => ConnectorType::Subprocess,
            "mock" => ConnectorType::Mock,
            _ => ConnectorType::Other(s),
        }
    }
}

impl From<ConnectorType> for String {
    fn from(t: ConnectorType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured agent: where it lives and which protocol it speaks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Stable lookup key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Protocol endpoint: URL for HTTP connectors, `program arg...` for the
    /// subprocess connector. A legacy `mock://` prefix routes to the mock
    /// connector regardless of `connector_type`.
    pub endpoint: String,
    /// Protocol discriminant; `None` means streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<ConnectorType>,
    /// Model ids this agent can evaluate with.
    #[serde(default)]
    pub models: Vec<String>,
    /// Extra headers the caller merges into the auth header set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Opaque hook configuration, owned by the execution orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Value>,
}
