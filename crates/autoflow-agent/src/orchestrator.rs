//! Provider orchestration with failover.
//!
//! The [`Orchestrator`] owns every registered provider together with its
//! rate limiter.  A generation request walks the providers in ranked order:
//!
//! ```text
//!   cache hit? ──yes──> return cached
//!        │no
//!   rank providers (preferred first, then by rolling success rate)
//!        │
//!   for each: credential? ─no─> skip
//!             admitted?   ─no─> skip
//!             RetryPolicy(complete, validate) ─ok─> record success, cache, return
//!                                             └err> record failure, keep as last error
//!        │
//!   AllProvidersExhausted(last) | NoProvidersAvailable
//! ```
//!
//! A reply the caller's validator rejects counts as a malformed response:
//! it is retried, then the next provider is tried, and it is never cached.
//! Admission and credential failures are logged and never surfaced on their
//! own.  The orchestrator is constructed explicitly and shared by reference;
//! there is no global instance.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use autoflow_kernel::{
    CancellationToken, RateLimiter, RateLimiterStatus, RetryConfig, RetryError, RetryPolicy,
};
use autoflow_store::{CacheStatsSnapshot, CredentialStore, ResponseCache};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::fingerprint::fingerprint;
use crate::metrics::{DEFAULT_LATENCY_WINDOW, MetricsRecorder};
use crate::provider::{CompletionRequest, HttpProvider, ProviderConfig, TextProvider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables shared by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Provider-scoped retry budget.
    pub retry: RetryConfig,
    /// Maximum cached generations.
    pub cache_capacity: usize,
    /// Lifetime of a cached generation, in seconds.
    pub cache_ttl_secs: u64,
    /// Samples kept per provider for success rate and latency.
    pub latency_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            cache_capacity: autoflow_store::DEFAULT_CAPACITY,
            cache_ttl_secs: 3_600,
            latency_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Per-request generation options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Provider to try first, if configured.
    pub preferred_provider: Option<String>,
    /// System instructions sent ahead of the prompt.
    pub system_prompt: Option<String>,
    /// Overrides the provider's default temperature.
    pub temperature: Option<f32>,
    /// Overrides the provider's default token limit.
    pub max_tokens: Option<u32>,
    /// Skip the cache lookup (the result is still cached).
    #[serde(skip)]
    pub bypass_cache: bool,
}

impl GenerateOptions {
    /// Options preferring `provider`.
    pub fn prefer(provider: impl Into<String>) -> Self {
        Self {
            preferred_provider: Some(provider.into()),
            ..Self::default()
        }
    }
}

/// A successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Provider that produced the text.
    pub provider_id: String,
    /// Model used.
    pub model: String,
    /// Raw generated text.
    pub text: String,
    /// Wall time spent on the provider, retries included.
    pub latency_ms: u64,
    /// Attempts made against the winning provider.
    pub attempts: u32,
    /// Whether this came from the response cache.
    pub cached: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

struct RegisteredProvider {
    provider: Arc<dyn TextProvider>,
    limiter: RateLimiter,
}

impl RegisteredProvider {
    fn id(&self) -> &str {
        self.provider.id()
    }
}

/// Ranks providers, applies admission control, retries, caches and records
/// metrics for every generation.
pub struct Orchestrator {
    providers: Vec<RegisteredProvider>,
    credentials: Arc<dyn CredentialStore>,
    retry: RetryPolicy,
    cache: ResponseCache<Generation>,
    cache_ttl: Duration,
    metrics: Arc<MetricsRecorder>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.provider_ids())
            .field("retry", self.retry.config())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no providers.
    pub fn new(config: OrchestratorConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        info!(
            cache_capacity = config.cache_capacity,
            cache_ttl_secs = config.cache_ttl_secs,
            max_attempts = config.retry.max_attempts,
            "orchestrator created"
        );
        Self {
            providers: Vec::new(),
            credentials,
            retry: RetryPolicy::new(config.retry),
            cache: ResponseCache::new("generations", config.cache_capacity),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            metrics: Arc::new(MetricsRecorder::new(config.latency_window)),
        }
    }

    /// Create an orchestrator with one [`HttpProvider`] per config, in
    /// declaration order.
    pub fn from_configs(
        config: OrchestratorConfig,
        providers: Vec<ProviderConfig>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let mut orchestrator = Self::new(config, credentials);
        for provider in providers {
            orchestrator.register(Arc::new(HttpProvider::new(provider)?))?;
        }
        Ok(orchestrator)
    }

    /// Register a provider.  Declaration order breaks ranking ties.
    pub fn register(&mut self, provider: Arc<dyn TextProvider>) -> Result<()> {
        let config = provider.config();
        if self.providers.iter().any(|p| p.id() == config.id) {
            return Err(AgentError::Config {
                reason: format!("provider {} registered twice", config.id),
            });
        }
        let limiter = RateLimiter::new(config.rate_limit.capacity, config.rate_limit.window())
            .map_err(|e| AgentError::Config {
                reason: format!("provider {}: {e}", config.id),
            })?;
        info!(
            provider = %config.id,
            kind = config.kind.as_str(),
            model = %config.model,
            capacity = config.rate_limit.capacity,
            window_secs = config.rate_limit.window_secs,
            "provider registered"
        );
        self.providers.push(RegisteredProvider { provider, limiter });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_provider(mut self, provider: Arc<dyn TextProvider>) -> Result<Self> {
        self.register(provider)?;
        Ok(self)
    }

    // -- Generation ----------------------------------------------------------

    /// Generate text for `prompt`, failing over across providers.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        self.generate_validated(prompt, options, cancel, |_| Ok(()))
            .await
    }

    /// Like [`generate`](Self::generate), but a reply is only accepted once
    /// `validate` passes.  A rejected reply becomes
    /// [`AgentError::Malformed`] for that attempt, so it is retried and then
    /// fails over like any other retryable provider error.  Cached entries
    /// are validated too; one that no longer passes is treated as a miss.
    pub async fn generate_validated<V>(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        cancel: &CancellationToken,
        validate: V,
    ) -> Result<Generation>
    where
        V: Fn(&str) -> std::result::Result<(), String> + Sync,
    {
        let key = fingerprint(prompt, options);

        if !options.bypass_cache {
            if let Some(mut hit) = self.cache.get(&key) {
                match validate(&hit.text) {
                    Ok(()) => {
                        debug!(provider = %hit.provider_id, "serving generation from cache");
                        hit.cached = true;
                        return Ok(hit);
                    }
                    Err(reason) => {
                        debug!(provider = %hit.provider_id, %reason, "cached generation rejected");
                    }
                }
            }
        }

        let order = self.candidate_order(options.preferred_provider.as_deref());
        let mut attempted = 0usize;
        let mut last_error: Option<AgentError> = None;

        for candidate in order {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let id = candidate.id();
            let config = candidate.provider.config();

            let credential = if config.requires_credential() {
                match self.credentials.credential(id).await {
                    Some(secret) => Some(secret),
                    None => {
                        warn!(provider = %id, "skipping provider: credential missing");
                        continue;
                    }
                }
            } else {
                None
            };

            if !candidate.limiter.try_acquire() {
                warn!(provider = %id, "skipping provider: admission denied");
                continue;
            }

            attempted += 1;
            let request = build_request(config, prompt, options);
            info!(provider = %id, model = %request.model, "trying provider");

            let started = Instant::now();
            let provider = candidate.provider.as_ref();
            let req = &request;
            let cred = credential.as_deref();
            let validate = &validate;
            let result = self
                .retry
                .execute_if(
                    cancel,
                    move |attempt| async move {
                        debug!(provider = %provider.id(), attempt, "provider attempt");
                        let text = provider.complete(req, cred).await?;
                        validate(&text).map_err(|reason| AgentError::Malformed {
                            provider: provider.id().to_owned(),
                            reason,
                        })?;
                        Ok::<_, AgentError>(text)
                    },
                    AgentError::is_retryable,
                )
                .await;
            let elapsed = started.elapsed();

            let error = match result {
                Ok(outcome) => {
                    self.metrics.record_success(id, elapsed);
                    let generation = Generation {
                        provider_id: id.to_owned(),
                        model: request.model.clone(),
                        text: outcome.value,
                        latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        attempts: outcome.attempts,
                        cached: false,
                    };
                    self.cache
                        .put(key.clone(), generation.clone(), self.cache_ttl);
                    info!(
                        provider = %id,
                        attempts = generation.attempts,
                        latency_ms = generation.latency_ms,
                        "generation succeeded"
                    );
                    return Ok(generation);
                }
                Err(RetryError::Cancelled { attempts }) => {
                    info!(provider = %id, attempts, "generation cancelled");
                    return Err(AgentError::Cancelled);
                }
                Err(RetryError::TimedOut { after, .. }) => AgentError::ProviderTimeout {
                    provider: id.to_owned(),
                    after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
                },
                Err(RetryError::Failed { error, .. }) => error,
            };

            warn!(provider = %id, error = %error, "provider failed, trying next");
            self.metrics.record_failure(id, &error);
            last_error = Some(error);
        }

        match last_error {
            Some(last) => Err(AgentError::AllProvidersExhausted {
                attempted,
                last: Box::new(last),
            }),
            None => {
                warn!("no provider could be attempted");
                Err(AgentError::NoProvidersAvailable)
            }
        }
    }

    /// Providers in the order a request with `preferred` would try them.
    fn candidate_order(&self, preferred: Option<&str>) -> Vec<&RegisteredProvider> {
        let mut ranked: Vec<(f64, &RegisteredProvider)> = self
            .providers
            .iter()
            .map(|p| (self.metrics.ranking_score(p.id()), p))
            .collect();
        // Stable sort keeps declaration order among equal scores.
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut order: Vec<&RegisteredProvider> = ranked.into_iter().map(|(_, p)| p).collect();

        if let Some(preferred) = preferred {
            match order.iter().position(|p| p.id() == preferred) {
                Some(pos) => {
                    let first = order.remove(pos);
                    order.insert(0, first);
                }
                None => warn!(provider = preferred, "preferred provider is not configured"),
            }
        }
        order
    }

    /// Provider ids in the order the next unpreferred request would try them.
    pub fn ranked_provider_ids(&self) -> Vec<String> {
        self.candidate_order(None)
            .into_iter()
            .map(|p| p.id().to_owned())
            .collect()
    }

    // -- Introspection -------------------------------------------------------

    /// Provider ids in declaration order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_owned()).collect()
    }

    /// Configurations of every registered provider.
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .map(|p| p.provider.config().clone())
            .collect()
    }

    /// Whether a usable credential is present for `provider`.
    pub async fn has_credential(&self, provider: &str) -> bool {
        let Some(registered) = self.providers.iter().find(|p| p.id() == provider) else {
            return false;
        };
        !registered.provider.config().requires_credential()
            || self.credentials.credential(provider).await.is_some()
    }

    /// Shared metrics recorder; the executor reports feedback through it.
    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Admission state of every provider.
    pub fn rate_limiter_status(&self) -> BTreeMap<String, RateLimiterStatus> {
        self.providers
            .iter()
            .map(|p| (p.id().to_owned(), p.limiter.status()))
            .collect()
    }

    /// Cached generations currently held.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Cache effectiveness counters.
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats().snapshot()
    }

    /// Drop every cached generation, returning how many were removed.
    pub fn clear_cache(&self) -> usize {
        let dropped = self.cache.clear();
        info!(dropped, "generation cache cleared");
        dropped
    }
}

/// Resolve request options against a provider's defaults.
fn build_request(
    config: &ProviderConfig,
    prompt: &str,
    options: &GenerateOptions,
) -> CompletionRequest {
    CompletionRequest {
        system: options.system_prompt.clone(),
        prompt: prompt.to_owned(),
        model: config.model.clone(),
        temperature: options.temperature.unwrap_or(config.temperature),
        max_tokens: options.max_tokens.unwrap_or(config.max_tokens),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoflow_store::MemoryCredentials;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that returns queued results in order, repeating the last.
    struct Scripted {
        config: ProviderConfig,
        script: Mutex<Vec<Result<String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(id: &str, script: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                config: ProviderConfig::openai("m").with_id(id),
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TextProvider for Scripted {
        fn config(&self) -> &ProviderConfig {
            &self.config
        }

        async fn complete(&self, _: &CompletionRequest, _: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Ok(text) => Ok(text.clone()),
                    Err(_) => Err(AgentError::ProviderHttp {
                        provider: self.config.id.clone(),
                        status: 503,
                        body: String::new(),
                    }),
                }
            }
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            retry: RetryConfig {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
                attempt_timeout_ms: 0,
            },
            ..OrchestratorConfig::default()
        }
    }

    fn all_creds() -> Arc<dyn CredentialStore> {
        Arc::new(MemoryCredentials::new().with("a", "k").with("b", "k"))
    }

    #[tokio::test]
    async fn first_success_is_cached() {
        let a = Scripted::new("a", vec![Ok("hello".into())]);
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(a.clone())
            .unwrap();
        let cancel = CancellationToken::new();

        let first = orch.generate("p", &GenerateOptions::default(), &cancel).await.unwrap();
        assert!(!first.cached);
        let second = orch.generate("p", &GenerateOptions::default(), &cancel).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.text, "hello");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.cache_size(), 1);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let a = Scripted::new(
            "a",
            vec![
                Err(AgentError::ProviderHttp {
                    provider: "a".into(),
                    status: 401,
                    body: "bad key".into(),
                }),
                Ok("unreachable".into()),
            ],
        );
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(a.clone())
            .unwrap();

        let err = orch
            .generate("p", &GenerateOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        match err {
            AgentError::AllProvidersExhausted { attempted, last } => {
                assert_eq!(attempted, 1);
                assert!(matches!(*last, AgentError::ProviderHttp { status: 401, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn no_credentials_means_no_providers_available() {
        let a = Scripted::new("a", vec![Ok("x".into())]);
        let orch = Orchestrator::new(fast_config(), Arc::new(MemoryCredentials::new()))
            .with_provider(a.clone())
            .unwrap();
        let err = orch
            .generate("p", &GenerateOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoProvidersAvailable));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ranking_prefers_higher_success_rate() {
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(Scripted::new("a", vec![Ok("a".into())]))
            .unwrap()
            .with_provider(Scripted::new("b", vec![Ok("b".into())]))
            .unwrap();
        assert_eq!(orch.ranked_provider_ids(), vec!["a", "b"]);

        orch.metrics().record_failure("a", "down");
        orch.metrics().record_success("b", Duration::from_millis(3));
        assert_eq!(orch.ranked_provider_ids(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(Scripted::new("a", vec![Ok("a".into())]))
            .unwrap();
        assert!(
            orch.with_provider(Scripted::new("a", vec![Ok("a".into())]))
                .is_err()
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_generation() {
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(Scripted::new("a", vec![Ok("a".into())]))
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orch
            .generate("p", &GenerateOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn clear_cache_reports_count() {
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(Scripted::new("a", vec![Ok("a".into())]))
            .unwrap();
        let cancel = CancellationToken::new();
        orch.generate("one", &GenerateOptions::default(), &cancel).await.unwrap();
        orch.generate("two", &GenerateOptions::default(), &cancel).await.unwrap();
        assert_eq!(orch.clear_cache(), 2);
        assert_eq!(orch.cache_size(), 0);
    }

    fn json_only(text: &str) -> std::result::Result<(), String> {
        match crate::extract::extract_structured(text) {
            Some(crate::extract::Extracted::Json(_)) => Ok(()),
            _ => Err("no JSON in reply".to_owned()),
        }
    }

    #[tokio::test]
    async fn rejected_reply_fails_over_and_is_not_cached() {
        let a = Scripted::new("a", vec![Ok("Sorry, I cannot help with that request.".into())]);
        let b = Scripted::new("b", vec![Ok("```json\n{\"steps\": []}\n```".into())]);
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(a.clone())
            .unwrap()
            .with_provider(b.clone())
            .unwrap();
        let cancel = CancellationToken::new();

        let generation = orch
            .generate_validated("p", &GenerateOptions::default(), &cancel, json_only)
            .await
            .unwrap();
        assert_eq!(generation.provider_id, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);

        let a_metrics = orch.metrics().provider("a").unwrap();
        assert_eq!(a_metrics.success_count, 0);
        assert_eq!(a_metrics.failure_count, 1);
        assert!(a_metrics.last_error.unwrap().contains("malformed"));

        let again = orch
            .generate_validated("p", &GenerateOptions::default(), &cancel, json_only)
            .await
            .unwrap();
        assert!(again.cached);
        assert_eq!(again.provider_id, "b");
        assert_eq!(orch.cache_size(), 1);
    }

    #[tokio::test]
    async fn every_reply_rejected_exhausts_providers() {
        let a = Scripted::new("a", vec![Ok("no".into())]);
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(a.clone())
            .unwrap();

        let err = orch
            .generate_validated(
                "p",
                &GenerateOptions::default(),
                &CancellationToken::new(),
                json_only,
            )
            .await
            .unwrap_err();
        match err {
            AgentError::AllProvidersExhausted { last, .. } => {
                assert!(matches!(*last, AgentError::Malformed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orch.cache_size(), 0);
    }

    #[tokio::test]
    async fn cached_reply_failing_validation_is_regenerated() {
        let a = Scripted::new("a", vec![Ok("plain".into()), Ok("{\"ok\": true}".into())]);
        let orch = Orchestrator::new(fast_config(), all_creds())
            .with_provider(a.clone())
            .unwrap();
        let cancel = CancellationToken::new();

        orch.generate("p", &GenerateOptions::default(), &cancel).await.unwrap();
        let generation = orch
            .generate_validated("p", &GenerateOptions::default(), &cancel, json_only)
            .await
            .unwrap();
        assert!(!generation.cached);
        assert_eq!(generation.text, "{\"ok\": true}");
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
    }
}
