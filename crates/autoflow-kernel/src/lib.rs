//! Autoflow kernel services.
//!
//! This crate provides the small, dependency-light building blocks shared by
//! the provider orchestration layer and the workflow engine:
//!
//! - **[`ratelimit`]** -- Non-blocking token-bucket admission gate.
//! - **[`retry`]** -- Bounded exponential backoff with per-attempt timeouts
//!   and cooperative cancellation via [`CancellationToken`].
//! - **[`ipc`]** -- Typed request/response channel built on
//!   [`tokio::sync::mpsc`] + [`tokio::sync::oneshot`] with explicit timeouts.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod error;
pub mod ipc;
pub mod ratelimit;
pub mod retry;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{KernelError, Result};
pub use ipc::{Envelope, RequestChannel, RequestReceiver, request_channel};
pub use ratelimit::{RateLimiter, RateLimiterStatus};
pub use retry::{RetryConfig, RetryError, RetryOutcome, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
