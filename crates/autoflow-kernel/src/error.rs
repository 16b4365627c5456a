//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`].  Retry
//! failures are reported separately through the generic
//! [`crate::retry::RetryError`] so callers keep their own error type.

use std::time::Duration;

/// Unified error type for the autoflow kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- IPC errors ---------------------------------------------------------
    /// The serving side of a request channel has shut down.
    #[error("request channel closed")]
    ChannelClosed,

    /// The handler dropped the reply sender without answering.
    #[error("request handler dropped the reply")]
    ReplyDropped,

    /// No reply arrived within the caller's deadline.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout { timeout: Duration },

    // -- Configuration ------------------------------------------------------
    /// A kernel primitive was configured with invalid parameters.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
