//! # autoflow-store
//!
//! Storage collaborators for autoflow.
//!
//! Everything here is in-memory: durable persistence and encrypted
//! credential storage are external systems reached through the traits this
//! crate defines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ResponseCache (FIFO bound + TTL)       │
//! ├─────────────────────────────────────────┤
//! │  KeyValueStore   (namespaced JSON)      │
//! │  CredentialStore (provider secrets)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::time::Duration;
//! use autoflow_store::ResponseCache;
//!
//! let cache: ResponseCache<String> = ResponseCache::new("generations", 100);
//! cache.put("fingerprint", "value".to_string(), Duration::from_secs(60));
//! assert_eq!(cache.get("fingerprint").as_deref(), Some("value"));
//! ```

pub mod cache;
pub mod credentials;
pub mod error;
pub mod kv;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheStats, CacheStatsSnapshot, DEFAULT_CAPACITY, ResponseCache};
pub use credentials::{CredentialStore, EnvCredentials, MemoryCredentials};
pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryStore};
