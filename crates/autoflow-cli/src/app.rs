//! Wiring: build the orchestrator, executor and service from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use autoflow_agent::Orchestrator;
use autoflow_intent::{
    DryRunStepRunner, StepRunnerRegistry, WorkflowExecutor, WorkflowGenerator, WorkflowService,
};
use autoflow_store::{KeyValueStore, MemoryStore};
use tracing::info;

use crate::config::AppConfig;

/// Orchestrator with one HTTP provider per configured provider.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let providers = config.effective_providers();
    let orchestrator = Orchestrator::from_configs(
        config.orchestrator(),
        providers,
        Arc::new(config.credentials()),
    )
    .context("failed to register providers")?;
    info!(providers = ?orchestrator.provider_ids(), "orchestrator ready");
    Ok(orchestrator)
}

/// Executor whose page actions go to the dry-run runner.
pub fn build_executor(config: &AppConfig) -> WorkflowExecutor {
    WorkflowExecutor::new(
        config.executor.clone(),
        StepRunnerRegistry::with_runner(Arc::new(DryRunStepRunner)),
    )
}

/// Full message service backed by an in-memory store.
pub fn build_service(config: &AppConfig) -> Result<WorkflowService> {
    let orchestrator = Arc::new(build_orchestrator(config)?);
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    Ok(WorkflowService::new(
        WorkflowGenerator::new(orchestrator),
        build_executor(config),
        store,
    ))
}
