//! Provider orchestration for autoflow.
//!
//! This crate turns a prompt into generated text using whichever configured
//! text-generation provider is healthy, admitted and credentialed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Orchestrator │────>│ RateLimiter │────>│ TextProvider │
//! │ (rank, fail  │     │ (per        │     │ (OpenAI /    │
//! │  over)       │     │  provider)  │     │  Anthropic / │
//! └──────┬───────┘     └─────────────┘     │  HuggingFace)│
//!        │                                 └──────────────┘
//!   ┌────┴──────────┬───────────────┐
//!   │ ResponseCache │ MetricsRecorder│
//!   └───────────────┴───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`provider`] -- Provider configuration, wire formats, HTTP client.
//! - [`orchestrator`] -- Ranked failover with admission, retry and caching.
//! - [`metrics`] -- Rolling per-provider success and latency statistics.
//! - [`fingerprint`] -- SHA-256 cache keys over normalized requests.
//! - [`extract`] -- Recovering JSON from free-form generated text.
//! - [`error`] -- Agent error types.

pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod metrics;
pub mod orchestrator;
pub mod provider;

// Re-export the most commonly used types at the crate root.
pub use error::{AgentError, Result};
pub use extract::{Extracted, extract_structured};
pub use fingerprint::{fingerprint, normalize_prompt};
pub use metrics::{MetricsRecorder, ProviderMetrics};
pub use orchestrator::{GenerateOptions, Generation, Orchestrator, OrchestratorConfig};
pub use provider::{
    AuthScheme, CompletionRequest, HttpProvider, ProviderConfig, ProviderKind, RateLimitConfig,
    TextProvider, default_providers,
};
