//! Connector registry: protocol discriminant → connector instance.
//!
//! One registry per process, constructed at startup and passed by reference
//! to wherever resolution happens. Registration is last-writer-wins with a
//! warning on overwrite; user-registered connectors may replace built-ins.
//! Resolution never fails except when not even the streaming fallback is
//! registered, which is a configuration error.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{AgentConfig, ConnectorType};
use crate::connector::{
    Connector, ConnectorError, MockConnector, RestConnector, StreamingConnector,
    SubprocessConnector,
};

/// Legacy endpoint prefix that routes to the mock connector.
const MOCK_ENDPOINT_PREFIX: &str = "mock://";

/// Process-wide connector lookup table.
pub struct ConnectorRegistry {
    inner: RwLock<HashMap<ConnectorType, Arc<dyn Connector>>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConnectorRegistry {
    /// An empty registry. Most callers want [`with_builtins`](Self::with_builtins).
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the four built-in connectors.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(StreamingConnector::new()));
        registry.register(Arc::new(RestConnector::new()));
        registry.register(Arc::new(SubprocessConnector::new()));
        registry.register(Arc::new(MockConnector::new()));
        registry
    }

    /// Registers a connector under its own discriminant. Overwriting an
    /// existing registration is allowed; it logs a warning, never errors.
    pub fn register(&self, connector: Arc<dyn Connector>) {
        let kind = connector.kind();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inner.insert(kind.clone(), connector) {
            tracing::warn!(
                kind = %kind,
                replaced = previous.name(),
                "connector registration overwrote an existing connector"
            );
        }
    }

    /// Looks up the connector registered for a discriminant.
    pub fn get(&self, kind: &ConnectorType) -> Option<Arc<dyn Connector>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .cloned()
    }

    /// Registered discriminants, for startup diagnostics.
    pub fn kinds(&self) -> Vec<ConnectorType> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Resolves an agent config to a connector.
    ///
    /// 1. A legacy `mock://` endpoint prefers the mock connector when one is
    ///    registered.
    /// 2. Otherwise the config's declared discriminant applies, defaulting to
    ///    streaming when absent.
    /// 3. An unregistered discriminant falls back to the streaming connector.
    /// 4. A missing fallback is the only fatal condition.
    pub fn resolve(&self, config: &AgentConfig) -> Result<Arc<dyn Connector>, ConnectorError> {
        if config.endpoint.starts_with(MOCK_ENDPOINT_PREFIX) {
            if let Some(mock) = self.get(&ConnectorType::Mock) {
                return Ok(mock);
            }
            tracing::warn!(
                agent = %config.key,
                "mock:// endpoint but no mock connector registered, falling back"
            );
        }

        let kind = config
            .connector_type
            .clone()
            .unwrap_or(ConnectorType::Streaming);
        if let Some(connector) = self.get(&kind) {
            return Ok(connector);
        }

        tracing::warn!(
            agent = %config.key,
            kind = %kind,
            "no connector registered for discriminant, using streaming fallback"
        );
        self.get(&ConnectorType::Streaming).ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "no connector registered for '{}' and no streaming fallback available",
                kind
            ))
        })
    }
}
