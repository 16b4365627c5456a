//! Integration tests for the autoflow-agent crate.
//!
//! Providers are scripted fakes registered through the public API; virtual
//! time (`start_paused`) makes retry backoff and attempt timeouts
//! deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use autoflow_agent::{
    AgentError, CompletionRequest, GenerateOptions, Orchestrator, OrchestratorConfig,
    ProviderConfig, Result, TextProvider,
};
use autoflow_kernel::{CancellationToken, RetryConfig};
use autoflow_store::MemoryCredentials;

// ═══════════════════════════════════════════════════════════════════════
//  Fakes
// ═══════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Hang,
    Unavailable,
}

struct FakeProvider {
    config: ProviderConfig,
    behaviour: Behaviour,
    calls: AtomicU32,
}

impl FakeProvider {
    fn new(id: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            config: ProviderConfig::openai("fake-model").with_id(id),
            behaviour,
            calls: AtomicU32::new(0),
        })
    }

    fn with_capacity(id: &str, capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            config: ProviderConfig::openai("fake-model")
                .with_id(id)
                .with_rate_limit(capacity, Duration::from_secs(60)),
            behaviour: Behaviour::Succeed,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for FakeProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn complete(&self, request: &CompletionRequest, _: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(format!("{} says: {}", self.config.id, request.prompt)),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok("too late".into())
            }
            Behaviour::Unavailable => Err(AgentError::ProviderHttp {
                provider: self.config.id.clone(),
                status: 503,
                body: "overloaded".into(),
            }),
        }
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            attempt_timeout_ms: 1_000,
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(creds: MemoryCredentials, providers: &[Arc<FakeProvider>]) -> Orchestrator {
    let mut orch = Orchestrator::new(config(), Arc::new(creds));
    for provider in providers {
        orch.register(provider.clone()).unwrap();
    }
    orch
}

// ═══════════════════════════════════════════════════════════════════════
//  Failover
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn only_credentialed_provider_is_called() {
    let a = FakeProvider::new("a", Behaviour::Succeed);
    let b = FakeProvider::new("b", Behaviour::Succeed);
    let orch = orchestrator(MemoryCredentials::new().with("a", "key-a"), &[b.clone(), a.clone()]);

    let generation = orch
        .generate("hello", &GenerateOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.provider_id, "a");
    assert_eq!(generation.text, "a says: hello");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn timing_out_provider_fails_over_to_next() {
    let a = FakeProvider::new("a", Behaviour::Hang);
    let b = FakeProvider::new("b", Behaviour::Succeed);
    let orch = orchestrator(
        MemoryCredentials::new().with("a", "k").with("b", "k"),
        &[a.clone(), b.clone()],
    );

    let started = tokio::time::Instant::now();
    let generation = orch
        .generate("hello", &GenerateOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.provider_id, "b");
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);
    // Three 1 s timeouts plus 100 ms and 200 ms backoff.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3_300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_400), "elapsed {elapsed:?}");

    let metrics = orch.metrics().provider("a").unwrap();
    assert_eq!(metrics.failure_count, 1);
    assert!(metrics.last_error.unwrap().contains("timed out"));
    assert_eq!(orch.metrics().provider("b").unwrap().success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn preferred_provider_is_attempted_first() {
    let a = FakeProvider::new("a", Behaviour::Succeed);
    let b = FakeProvider::new("b", Behaviour::Succeed);
    let orch = orchestrator(
        MemoryCredentials::new().with("a", "k").with("b", "k"),
        &[a.clone(), b.clone()],
    );

    let generation = orch
        .generate("x", &GenerateOptions::prefer("b"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(generation.provider_id, "b");
    assert_eq!(a.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_providers_report_last_error() {
    let a = FakeProvider::new("a", Behaviour::Unavailable);
    let b = FakeProvider::new("b", Behaviour::Unavailable);
    let orch = orchestrator(
        MemoryCredentials::new().with("a", "k").with("b", "k"),
        &[a.clone(), b.clone()],
    );

    let err = orch
        .generate("x", &GenerateOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AgentError::AllProvidersExhausted { attempted, last } => {
            assert_eq!(attempted, 2);
            assert!(matches!(
                *last,
                AgentError::ProviderHttp { ref provider, status: 503, .. } if provider == "b"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 3);
}

// ═══════════════════════════════════════════════════════════════════════
//  Admission control
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn admission_denied_provider_is_skipped() {
    let a = FakeProvider::with_capacity("a", 1);
    let b = FakeProvider::new("b", Behaviour::Succeed);
    let orch = orchestrator(
        MemoryCredentials::new().with("a", "k").with("b", "k"),
        &[a.clone(), b.clone()],
    );
    let cancel = CancellationToken::new();

    let first = orch.generate("one", &GenerateOptions::default(), &cancel).await.unwrap();
    assert_eq!(first.provider_id, "a");

    // `a` ranks first (1.0 after its success) but has no token left.
    let second = orch.generate("two", &GenerateOptions::default(), &cancel).await.unwrap();
    assert_eq!(second.provider_id, "b");
    assert_eq!(a.calls(), 1);

    let status = orch.rate_limiter_status();
    assert_eq!(status["a"].available, 0);
}

#[tokio::test(start_paused = true)]
async fn all_denied_means_no_providers_available() {
    let a = FakeProvider::with_capacity("a", 1);
    let orch = orchestrator(MemoryCredentials::new().with("a", "k"), &[a.clone()]);
    let options = GenerateOptions {
        bypass_cache: true,
        ..GenerateOptions::default()
    };
    let cancel = CancellationToken::new();

    orch.generate("one", &options, &cancel).await.unwrap();
    let err = orch.generate("one", &options, &cancel).await.unwrap_err();
    assert!(matches!(err, AgentError::NoProvidersAvailable));
}

// ═══════════════════════════════════════════════════════════════════════
//  Cache
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn whitespace_variants_share_cache_entry() {
    let a = FakeProvider::new("a", Behaviour::Succeed);
    let orch = orchestrator(MemoryCredentials::new().with("a", "k"), &[a.clone()]);
    let cancel = CancellationToken::new();

    orch.generate("check  the price", &GenerateOptions::default(), &cancel)
        .await
        .unwrap();
    let hit = orch
        .generate(" check the price\n", &GenerateOptions::default(), &cancel)
        .await
        .unwrap();

    assert!(hit.cached);
    assert_eq!(a.calls(), 1);
    assert_eq!(orch.cache_stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_after_ttl() {
    let a = FakeProvider::new("a", Behaviour::Succeed);
    let orch = orchestrator(MemoryCredentials::new().with("a", "k"), &[a.clone()]);
    let cancel = CancellationToken::new();

    orch.generate("p", &GenerateOptions::default(), &cancel).await.unwrap();
    tokio::time::advance(Duration::from_secs(3_600)).await;
    let again = orch.generate("p", &GenerateOptions::default(), &cancel).await.unwrap();

    assert!(!again.cached);
    assert_eq!(a.calls(), 2);
}
