//! Credential lookup collaborator.
//!
//! Encrypted credential storage is external to autoflow.  The orchestrator
//! only asks a [`CredentialStore`] whether a provider has a usable secret;
//! a missing credential makes the provider skip, it never fails generation on
//! its own.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

/// Read-only access to provider secrets.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the secret for `provider_id`, if one is configured.
    async fn credential(&self, provider_id: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Credentials held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    secrets: DashMap<String, String>,
}

impl MemoryCredentials {
    /// Create an empty credential set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, provider_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(provider_id, secret);
        self
    }

    /// Store or replace a secret.  Empty secrets are ignored.
    pub fn insert(&self, provider_id: impl Into<String>, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return;
        }
        self.secrets.insert(provider_id.into(), secret);
    }

    /// Forget a provider's secret.
    pub fn remove(&self, provider_id: &str) -> bool {
        self.secrets.remove(provider_id).is_some()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn credential(&self, provider_id: &str) -> Option<String> {
        self.secrets
            .get(provider_id)
            .map(|entry| entry.value().clone())
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Credentials read from environment variables at lookup time.
///
/// Each provider id maps to one variable name; unset or blank variables
/// count as missing.
#[derive(Debug, Default, Clone)]
pub struct EnvCredentials {
    variables: HashMap<String, String>,
}

impl EnvCredentials {
    /// Create a lookup with no mappings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `provider_id` to the environment variable `var`.
    pub fn map(mut self, provider_id: impl Into<String>, var: impl Into<String>) -> Self {
        self.variables.insert(provider_id.into(), var.into());
        self
    }

    /// The variable consulted for `provider_id`.
    pub fn variable_for(&self, provider_id: &str) -> Option<&str> {
        self.variables.get(provider_id).map(String::as_str)
    }
}

#[async_trait]
impl CredentialStore for EnvCredentials {
    async fn credential(&self, provider_id: &str) -> Option<String> {
        let var = self.variables.get(provider_id)?;
        std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
