//! Connector error taxonomy.
//!
//! Configuration errors are fatal and never retried here; transport errors
//! surface to the caller after resource cleanup; parse errors are recovered
//! locally by the connectors and never appear in this enum.

use thiserror::Error;

use crate::trajectory::ConnectorResponse;

/// Error from connector resolution or `execute()`.
///
/// Retry policy is a caller concern: the subsystem performs no retries, but it
/// always releases readers/processes before propagating any of these.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No connector resolvable, or the agent/auth configuration is unusable.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Connection refused, stream drop, spawn failure, request build failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Non-2xx HTTP response, with provider detail.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The run failed remotely after steps were already reconstructed.
    ///
    /// Carries the partial trajectory so the caller can persist the evidence
    /// collected up to the failure point.
    #[error("run failed: {message}")]
    RunFailed {
        message: String,
        partial: Box<ConnectorResponse>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_carries_status_and_body() {
        let err = ConnectorError::Http {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("503"), "{}", s);
        assert!(s.contains("upstream unavailable"), "{}", s);
    }

    #[test]
    fn run_failed_keeps_partial_trajectory() {
        let partial = ConnectorResponse {
            trajectory: vec![],
            run_id: "r-1".to_string(),
            raw_events: None,
            metadata: None,
        };
        let err = ConnectorError::RunFailed {
            message: "agent crashed".to_string(),
            partial: Box::new(partial),
        };
        match err {
            ConnectorError::RunFailed { partial, .. } => assert_eq!(partial.run_id, "r-1"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
