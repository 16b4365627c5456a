//! Application configuration.
//!
//! Read from `autoflow.toml` (or the path given by `--config` /
//! `AUTOFLOW_CONFIG`).  Every section has defaults, so a missing or empty
//! file still yields a working setup with the built-in providers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use autoflow_agent::{OrchestratorConfig, ProviderConfig, default_providers};
use autoflow_intent::ExecutorConfig;
use autoflow_kernel::RetryConfig;
use autoflow_store::EnvCredentials;
use serde::{Deserialize, Serialize};

/// File consulted when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "autoflow.toml";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "AUTOFLOW_CONFIG";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: autoflow_store::DEFAULT_CAPACITY,
            ttl_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Samples kept per provider for success rate and latency.
    pub latency_window: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            latency_window: autoflow_agent::metrics::DEFAULT_LATENCY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Deadline for one request on the typed channel.
    pub request_timeout_secs: u64,
    /// Provider tried first when a request names none.
    pub preferred_provider: Option<String>,
    /// Queue depth of the request channel.
    pub queue_capacity: usize,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            preferred_provider: None,
            queue_capacity: 64,
        }
    }
}

impl ServiceSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: Vec<ProviderConfig>,
    pub retry: RetryConfig,
    pub cache: CacheSection,
    pub metrics: MetricsSection,
    pub executor: ExecutorConfig,
    pub service: ServiceSection,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path (flag or environment) must exist; the default
    /// `autoflow.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::info!(path = %path.display(), providers = config.providers.len(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Declared providers, or the built-in list when none are declared.
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        if self.providers.is_empty() {
            default_providers()
        } else {
            self.providers.clone()
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry.clone(),
            cache_capacity: self.cache.capacity,
            cache_ttl_secs: self.cache.ttl_secs,
            latency_window: self.metrics.latency_window,
        }
    }

    /// Credential lookup mapping each provider to its `credential_env`.
    pub fn credentials(&self) -> EnvCredentials {
        self.effective_providers()
            .into_iter()
            .fold(EnvCredentials::new(), |creds, provider| {
                match provider.credential_env {
                    Some(var) => creds.map(provider.id, var),
                    None => creds,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.effective_providers().len(), 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.executor.step_retry.base_delay_ms, 500);
        assert_eq!(config.service.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::parse(
            r#"
            [retry]
            max_attempts = 5

            [cache]
            ttl_secs = 60

            [executor]
            max_loop_iterations = 10

            [service]
            preferred_provider = "local"

            [[providers]]
            id = "local"
            kind = "openai"
            endpoint = "http://127.0.0.1:8080/v1/chat/completions"
            auth = "none"
            model = "llama"
            rate_limit = { capacity = 5, window_secs = 1 }
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.executor.max_loop_iterations, 10);
        assert_eq!(config.service.preferred_provider.as_deref(), Some("local"));

        let providers = config.effective_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].rate_limit.capacity, 5);
        assert_eq!(config.orchestrator().cache_ttl_secs, 60);
    }

    #[test]
    fn credentials_follow_provider_env_vars() {
        let creds = AppConfig::default().credentials();
        assert_eq!(creds.variable_for("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(creds.variable_for("anthropic"), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn explicit_path_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[metrics]\nlatency_window = 7").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.metrics.latency_window, 7);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(AppConfig::parse("[retry]\nmax_attempts = \"many\"").is_err());
    }
}
