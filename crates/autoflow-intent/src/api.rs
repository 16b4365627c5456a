//! Outbound HTTP calls for `api` steps.
//!
//! Unlike page actions, API steps are performed by the engine itself.  The
//! response is returned as `{status, headers, body, elapsed_ms}` where
//! `body` is parsed JSON when the server sent JSON and text otherwise.  A
//! non-2xx status is a step error.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{IntentError, Result};

/// Maximum response body read into the step output (1 MB).
const MAX_BODY_BYTES: usize = 1_024 * 1_024;

/// Characters of a failed response body quoted in the step error.
const MAX_ERROR_BODY_CHARS: usize = 512;

fn default_method() -> String {
    "GET".into()
}

/// Action payload of an `api` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(alias = "endpoint")]
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Strings are sent verbatim; any other value is sent as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(
        default,
        alias = "timeout",
        alias = "timeoutMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u64>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: None,
        }
    }
}

/// HTTP client shared by every `api` step of an executor.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    default_timeout: Duration,
    max_body_bytes: usize,
}

impl ApiClient {
    pub fn new(default_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("autoflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self::with_client(client, default_timeout)
    }

    pub fn with_client(client: reqwest::Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    /// Cap on response bytes read per call; the rest is discarded.
    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Perform `request` on behalf of `step_id`.
    pub async fn call(&self, step_id: &str, request: &ApiRequest) -> Result<Value> {
        let invalid = |reason: String| IntentError::InvalidStepAction {
            step_id: step_id.to_owned(),
            reason,
        };

        let method = parse_method(&request.method).ok_or_else(|| {
            invalid(format!(
                "unsupported HTTP method `{}`. Supported: GET, POST, PUT, PATCH, DELETE, HEAD",
                request.method
            ))
        })?;
        let url = url::Url::parse(&request.url)
            .map_err(|e| invalid(format!("invalid URL `{}`: {e}", request.url)))?;
        let timeout = request
            .timeout_ms
            .map_or(self.default_timeout, Duration::from_millis);

        let mut builder = self.client.request(method, url).timeout(timeout);
        for (name, value) in &request.headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("invalid header name `{name}`: {e}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("invalid header value for `{name}`: {e}")))?;
            builder = builder.header(header_name, header_value);
        }
        builder = match &request.body {
            None | Some(Value::Null) => builder,
            Some(Value::String(text)) => builder.body(text.clone()),
            Some(other) => builder.json(other),
        };

        debug!(step_id, method = %request.method, url = %request.url, "calling api");
        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                IntentError::StepTimeout {
                    step_id: step_id.to_owned(),
                    after_ms: timeout.as_millis() as u64,
                }
            } else {
                IntentError::step(step_id, format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_owned(), v.to_str().unwrap_or("<binary>").to_owned()))
            .collect();
        let (bytes, truncated) = read_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| IntentError::step(step_id, format!("failed to read response body: {e}")))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if truncated {
            warn!(step_id, limit = self.max_body_bytes, "response body truncated");
        }

        let body = serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        debug!(step_id, status = status.as_u16(), elapsed_ms, "api call completed");

        if !status.is_success() {
            let text = crate::template::display(&body);
            return Err(IntentError::step(
                step_id,
                format!("HTTP {}: {}", status.as_u16(), excerpt(&text, MAX_ERROR_BODY_CHARS)),
            ));
        }

        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

/// Read at most `limit` body bytes, chunk by chunk.  The flag is set when
/// the body was longer.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

/// Parse an HTTP method string.  `None` if unsupported.
fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}
