//! Auth model and header/env derivation shared by all connectors.
//!
//! HTTP connectors carry auth as headers; the subprocess connector carries
//! AWS credentials as process environment variables, never as headers or argv
//! (argv is visible in process listings). Each variant may declare a
//! `headers` override map, applied last: client-declared headers win over
//! derived auth headers.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Auth material for one agent endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConnectorAuth {
    None {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    Basic {
        username: String,
        password: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    Bearer {
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    ApiKey {
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    #[serde(rename_all = "camelCase")]
    AwsSigv4 {
        aws_region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aws_access_key_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aws_secret_access_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aws_session_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
}

impl Default for ConnectorAuth {
    fn default() -> Self {
        ConnectorAuth::None { headers: None }
    }
}

impl ConnectorAuth {
    /// The client-declared header override map, if any.
    pub fn header_overrides(&self) -> Option<&HashMap<String, String>> {
        match self {
            ConnectorAuth::None { headers }
            | ConnectorAuth::Basic { headers, .. }
            | ConnectorAuth::Bearer { headers, .. }
            | ConnectorAuth::ApiKey { headers, .. }
            | ConnectorAuth::AwsSigv4 { headers, .. } => headers.as_ref(),
        }
    }
}

/// Derives the HTTP header set for this auth variant.
///
/// basic → `Authorization: Basic <base64 user:pass>`; bearer →
/// `Authorization: Bearer <token>`; api-key → both `X-API-Key` and
/// `x-api-key`; aws-sigv4 → no headers (credentials travel as env, see
/// [`build_auth_env`]). The variant's `headers` override map is applied last
/// and replaces derived entries with the same name (case-insensitive).
pub fn build_auth_headers(auth: &ConnectorAuth) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    match auth {
        ConnectorAuth::None { .. } | ConnectorAuth::AwsSigv4 { .. } => {}
        ConnectorAuth::Basic {
            username, password, ..
        } => {
            let encoded = BASE64_STANDARD.encode(format!("{}:{}", username, password));
            headers.push(("Authorization".to_string(), format!("Basic {}", encoded)));
        }
        ConnectorAuth::Bearer { token, .. } => {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        ConnectorAuth::ApiKey { token, .. } => {
            headers.push(("X-API-Key".to_string(), token.clone()));
            headers.push(("x-api-key".to_string(), token.clone()));
        }
    }

    if let Some(overrides) = auth.header_overrides() {
        for (name, value) in overrides {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }
    }
    headers
}

/// Derives the environment map for subprocess auth.
///
/// Only the aws-sigv4 variant produces entries, and only for the fields
/// actually present.
pub fn build_auth_env(auth: &ConnectorAuth) -> Vec<(String, String)> {
    let ConnectorAuth::AwsSigv4 {
        aws_region,
        aws_access_key_id,
        aws_secret_access_key,
        aws_session_token,
        ..
    } = auth
    else {
        return Vec::new();
    };

    let mut env = vec![("AWS_REGION".to_string(), aws_region.clone())];
    if let Some(id) = aws_access_key_id {
        env.push(("AWS_ACCESS_KEY_ID".to_string(), id.clone()));
    }
    if let Some(secret) = aws_secret_access_key {
        env.push(("AWS_SECRET_ACCESS_KEY".to_string(), secret.clone()));
    }
    if let Some(token) = aws_session_token {
        env.push(("AWS_SESSION_TOKEN".to_string(), token.clone()));
    }
    env
}

/// Case-insensitive lookup in a derived header list.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
