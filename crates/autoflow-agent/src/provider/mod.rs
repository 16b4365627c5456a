//! Text-generation providers.
//!
//! - [`config`] -- Static provider configuration and built-in defaults.
//! - [`http`] -- The [`TextProvider`] capability and its HTTP implementation.

pub mod config;
pub mod http;

pub use config::{AuthScheme, ProviderConfig, ProviderKind, RateLimitConfig, default_providers};
pub use http::{CompletionRequest, HttpProvider, TextProvider};
