//! Provider configuration.
//!
//! A [`ProviderConfig`] is loaded once at startup and never mutated.  The
//! wire format is selected by the closed [`ProviderKind`] enum; there is no
//! string-keyed dispatch on provider type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const HUGGING_FACE_ENDPOINT: &str = "https://api-inference.huggingface.co/models/{model}";

/// Placeholder substituted with the model id inside endpoint templates.
pub const MODEL_PLACEHOLDER: &str = "{model}";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which wire format a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Chat Completions (and compatible endpoints).
    #[serde(alias = "open_ai")]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Hugging Face text-generation inference.
    #[serde(alias = "huggingface")]
    HuggingFace,
}

impl ProviderKind {
    /// The auth scheme this kind uses unless configured otherwise.
    pub fn default_auth(self) -> AuthScheme {
        match self {
            Self::OpenAi | Self::HuggingFace => AuthScheme::Bearer,
            Self::Anthropic => AuthScheme::ApiKeyHeader,
        }
    }

    /// Lowercase label used in logs and stats.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::HuggingFace => "hugging_face",
        }
    }
}

/// How the credential is attached to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <credential>`.
    Bearer,
    /// Provider-specific API key header (`x-api-key` for Anthropic).
    ApiKeyHeader,
    /// No credential needed (local endpoints).
    None,
}

// ---------------------------------------------------------------------------
// Rate limit
// ---------------------------------------------------------------------------

/// Admission control parameters for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per window.
    pub capacity: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            window_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider config
// ---------------------------------------------------------------------------

/// Static description of one text-generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider id, e.g. `"openai"`.
    pub id: String,
    /// Wire format.
    pub kind: ProviderKind,
    /// Endpoint URL; `{model}` is replaced with the model id.
    pub endpoint: String,
    /// Credential attachment.  Defaults per [`ProviderKind::default_auth`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthScheme>,
    /// Default model id.
    pub model: String,
    /// Default maximum tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Environment variable holding the credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.3
}

impl ProviderConfig {
    /// OpenAI Chat Completions with the given model.
    pub fn openai(model: impl Into<String>) -> Self {
        Self {
            id: "openai".into(),
            kind: ProviderKind::OpenAi,
            endpoint: OPENAI_ENDPOINT.into(),
            auth: None,
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            rate_limit: RateLimitConfig {
                capacity: 60,
                window_secs: 60,
            },
            credential_env: Some("OPENAI_API_KEY".into()),
        }
    }

    /// Anthropic Messages API with the given model.
    pub fn anthropic(model: impl Into<String>) -> Self {
        Self {
            id: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            endpoint: ANTHROPIC_ENDPOINT.into(),
            auth: None,
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            rate_limit: RateLimitConfig {
                capacity: 50,
                window_secs: 60,
            },
            credential_env: Some("ANTHROPIC_API_KEY".into()),
        }
    }

    /// Hugging Face inference with the given model.
    pub fn hugging_face(model: impl Into<String>) -> Self {
        Self {
            id: "hugging_face".into(),
            kind: ProviderKind::HuggingFace,
            endpoint: HUGGING_FACE_ENDPOINT.into(),
            auth: None,
            model: model.into(),
            max_tokens: 1024,
            temperature: default_temperature(),
            rate_limit: RateLimitConfig {
                capacity: 30,
                window_secs: 60,
            },
            credential_env: Some("HUGGINGFACE_API_KEY".into()),
        }
    }

    /// Builder-style id override.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder-style endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Builder-style rate limit override.
    pub fn with_rate_limit(mut self, capacity: u32, window: Duration) -> Self {
        self.rate_limit = RateLimitConfig {
            capacity,
            window_secs: window.as_secs().max(1),
        };
        self
    }

    /// Builder-style auth override.
    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The auth scheme actually used.
    pub fn effective_auth(&self) -> AuthScheme {
        self.auth.unwrap_or_else(|| self.kind.default_auth())
    }

    /// Whether calls need a credential.
    pub fn requires_credential(&self) -> bool {
        self.effective_auth() != AuthScheme::None
    }

    /// Endpoint with `{model}` substituted.
    pub fn resolved_endpoint(&self, model: &str) -> String {
        self.endpoint.replace(MODEL_PLACEHOLDER, model)
    }

    /// Check invariants that deserialization cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AgentError::Config {
                reason: "provider id must not be empty".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::Config {
                reason: format!("provider {} has no model", self.id),
            });
        }
        let endpoint = self.resolved_endpoint(&self.model);
        reqwest::Url::parse(&endpoint).map_err(|e| AgentError::Config {
            reason: format!("provider {} endpoint {endpoint:?} is invalid: {e}", self.id),
        })?;
        if self.rate_limit.capacity == 0 || self.rate_limit.window_secs == 0 {
            return Err(AgentError::Config {
                reason: format!(
                    "provider {} rate limit needs capacity and window above zero",
                    self.id
                ),
            });
        }
        Ok(())
    }
}

/// Built-in provider list used when configuration declares none.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::openai("gpt-4o-mini"),
        ProviderConfig::anthropic("claude-3-5-haiku-latest"),
        ProviderConfig::hugging_face("mistralai/Mistral-7B-Instruct-v0.3"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        for provider in default_providers() {
            provider.validate().unwrap();
        }
    }

    #[test]
    fn endpoint_template_substitutes_model() {
        let hf = ProviderConfig::hugging_face("org/model");
        assert_eq!(
            hf.resolved_endpoint("org/model"),
            "https://api-inference.huggingface.co/models/org/model"
        );
    }

    #[test]
    fn auth_defaults_per_kind() {
        assert_eq!(
            ProviderConfig::anthropic("m").effective_auth(),
            AuthScheme::ApiKeyHeader
        );
        assert_eq!(ProviderConfig::openai("m").effective_auth(), AuthScheme::Bearer);
        let local = ProviderConfig::openai("m").with_auth(AuthScheme::None);
        assert!(!local.requires_credential());
    }

    #[test]
    fn deserialize_from_toml_style_json() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "id": "local",
            "kind": "openai",
            "endpoint": "http://localhost:11434/v1/chat/completions",
            "auth": "none",
            "model": "qwen2.5",
            "rate_limit": { "capacity": 5 }
        }))
        .unwrap();
        assert_eq!(config.kind, ProviderKind::OpenAi);
        assert_eq!(config.rate_limit.capacity, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.max_tokens, 2048);
        config.validate().unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ProviderConfig::openai("m").with_rate_limit(0, Duration::from_secs(1));
        assert!(config.validate().is_err());
    }
}
