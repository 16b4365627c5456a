//! Provider capability and the HTTP implementation of it.
//!
//! [`TextProvider`] is the seam the orchestrator calls through; tests swap in
//! scripted fakes.  [`HttpProvider`] speaks the three supported wire formats.
//! Request building and response parsing are pure functions so they can be
//! tested without a network.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::provider::config::{AuthScheme, ProviderConfig, ProviderKind};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Longest error body kept in [`AgentError::ProviderHttp`].
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One completion call, already resolved against provider defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Model id.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// A text-generation backend.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Static configuration of this provider.
    fn config(&self) -> &ProviderConfig;

    /// Provider id.
    fn id(&self) -> &str {
        &self.config().id
    }

    /// Produce generated text for `request`.
    ///
    /// `credential` is `None` only for providers whose auth scheme is
    /// [`AuthScheme::None`].
    async fn complete(&self, request: &CompletionRequest, credential: Option<&str>)
    -> Result<String>;
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// [`TextProvider`] backed by an HTTP JSON API.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider.  Per-attempt timeouts come from the retry policy,
    /// so the client itself only bounds connection setup.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AgentError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(config: ProviderConfig, http: reqwest::Client) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl TextProvider for HttpProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        credential: Option<&str>,
    ) -> Result<String> {
        let provider = self.config.id.as_str();
        let url = self.config.resolved_endpoint(&request.model);
        let headers = build_headers(&self.config, credential)?;
        let body = build_request_body(self.config.kind, request);

        debug!(
            provider,
            url = %url,
            model = %request.model,
            kind = self.config.kind.as_str(),
            "sending completion request"
        );

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Network {
                provider: provider.to_owned(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AgentError::Network {
            provider: provider.to_owned(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AgentError::ProviderHttp {
                provider: provider.to_owned(),
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| AgentError::Malformed {
            provider: provider.to_owned(),
            reason: format!("response is not JSON: {e}"),
        })?;
        extract_text(self.config.kind, provider, &json)
    }
}

// ---------------------------------------------------------------------------
// Wire format helpers
// ---------------------------------------------------------------------------

/// Build the authentication and content headers for one call.
pub fn build_headers(config: &ProviderConfig, credential: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let auth = config.effective_auth();
    if auth != AuthScheme::None {
        let credential = credential.ok_or_else(|| AgentError::CredentialMissing {
            provider: config.id.clone(),
        })?;
        let invalid = |e: reqwest::header::InvalidHeaderValue| AgentError::Config {
            reason: format!("invalid credential header for {}: {e}", config.id),
        };
        match auth {
            AuthScheme::Bearer => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {credential}")).map_err(invalid)?,
                );
            }
            AuthScheme::ApiKeyHeader => {
                let name = match config.kind {
                    ProviderKind::Anthropic => "x-api-key",
                    ProviderKind::OpenAi => "api-key",
                    ProviderKind::HuggingFace => "x-api-key",
                };
                headers.insert(name, HeaderValue::from_str(credential).map_err(invalid)?);
            }
            AuthScheme::None => {}
        }
    }

    if config.kind == ProviderKind::Anthropic {
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
    }
    Ok(headers)
}

/// Build the JSON body for `kind`.
pub fn build_request_body(kind: ProviderKind, request: &CompletionRequest) -> Value {
    match kind {
        ProviderKind::OpenAi => {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = &request.system {
                messages.push(json!({"role": "system", "content": system}));
            }
            messages.push(json!({"role": "user", "content": request.prompt}));
            json!({
                "model": request.model,
                "messages": messages,
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
            })
        }
        ProviderKind::Anthropic => {
            let mut body = json!({
                "model": request.model,
                "messages": [{"role": "user", "content": request.prompt}],
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
            });
            if let Some(system) = &request.system {
                body["system"] = Value::String(system.clone());
            }
            body
        }
        ProviderKind::HuggingFace => {
            let inputs = match &request.system {
                Some(system) => format!("{system}\n\n{}", request.prompt),
                None => request.prompt.clone(),
            };
            json!({
                "model": request.model,
                "inputs": inputs,
                "parameters": {
                    "temperature": request.temperature,
                    "max_new_tokens": request.max_tokens,
                    "return_full_text": false,
                },
            })
        }
    }
}

/// Pull the generated text out of a success body.
pub fn extract_text(kind: ProviderKind, provider: &str, body: &Value) -> Result<String> {
    let text = match kind {
        ProviderKind::OpenAi => body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned),
        ProviderKind::Anthropic => body["content"].as_array().map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"].as_str().unwrap_or("text") == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        }),
        ProviderKind::HuggingFace => body[0]["generated_text"]
            .as_str()
            .or_else(|| body["generated_text"].as_str())
            .map(str::to_owned),
    };

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(AgentError::Malformed {
            provider: provider.to_owned(),
            reason: "generated text is empty".into(),
        }),
        None => Err(AgentError::Malformed {
            provider: provider.to_owned(),
            reason: format!("no generated text in {} response", kind.as_str()),
        }),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
