//! Agent error types.
//!
//! All generation-path failures surface through [`AgentError`].  Admission
//! and credential failures are intercepted by the orchestrator and only
//! escape when no provider remains; provider call failures are classified
//! by [`AgentError::is_retryable`].

/// Unified error type for provider orchestration.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Admission errors ----------------------------------------------------
    /// The provider's rate limiter refused the call.
    #[error("admission denied for provider: {provider}")]
    AdmissionDenied { provider: String },

    /// No credential is configured for a provider that requires one.
    #[error("missing credential for provider: {provider}")]
    CredentialMissing { provider: String },

    // -- Provider call errors ------------------------------------------------
    /// A single provider attempt exceeded its timeout.
    #[error("provider {provider} timed out after {after_ms}ms")]
    ProviderTimeout { provider: String, after_ms: u64 },

    /// The provider answered with a non-success HTTP status.
    #[error("provider {provider} returned HTTP {status}: {body}")]
    ProviderHttp {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP response.
    #[error("network error calling {provider}: {reason}")]
    Network { provider: String, reason: String },

    /// The response body did not contain usable generated text.
    #[error("malformed response from {provider}: {reason}")]
    Malformed { provider: String, reason: String },

    // -- Orchestration errors ------------------------------------------------
    /// The caller cancelled the generation.
    #[error("generation cancelled")]
    Cancelled,

    /// Every candidate provider was attempted and failed.
    #[error("all {attempted} attempted provider(s) failed; last error: {last}")]
    AllProvidersExhausted {
        attempted: usize,
        last: Box<AgentError>,
    },

    /// No provider could even be attempted.
    #[error("no providers available")]
    NoProvidersAvailable,

    // -- Configuration errors ------------------------------------------------
    /// Provider configuration is invalid.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether another attempt against the same provider may succeed.
    ///
    /// 429 and 5xx responses, timeouts, transport failures and malformed
    /// bodies are retryable.  401/403 and every other 4xx are fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderHttp { status, .. } => *status == 429 || (500..600).contains(status),
            Self::ProviderTimeout { .. } | Self::Network { .. } | Self::Malformed { .. } => true,
            Self::AdmissionDenied { .. }
            | Self::CredentialMissing { .. }
            | Self::Cancelled
            | Self::AllProvidersExhausted { .. }
            | Self::NoProvidersAvailable
            | Self::Config { .. }
            | Self::Json(_) => false,
        }
    }

    /// Whether this error means total generation failure, as opposed to a
    /// cancellation or a configuration problem.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::AllProvidersExhausted { .. } | Self::NoProvidersAvailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> AgentError {
        AgentError::ProviderHttp {
            provider: "p".into(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn status_mapping() {
        assert!(http(429).is_retryable());
        assert!(http(500).is_retryable());
        assert!(http(503).is_retryable());
        assert!(!http(401).is_retryable());
        assert!(!http(403).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!http(400).is_retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        let timeout = AgentError::ProviderTimeout {
            provider: "p".into(),
            after_ms: 10,
        };
        assert!(timeout.is_retryable());
        let malformed = AgentError::Malformed {
            provider: "p".into(),
            reason: "empty".into(),
        };
        assert!(malformed.is_retryable());
    }

    #[test]
    fn exhaustion_display_includes_last_error() {
        let err = AgentError::AllProvidersExhausted {
            attempted: 2,
            last: Box::new(http(503)),
        };
        assert!(err.is_exhaustion());
        assert!(err.to_string().contains("HTTP 503"));
    }
}
