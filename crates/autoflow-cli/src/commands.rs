//! One-shot subcommands: generate, run, stats, providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use autoflow_intent::{ExecutionStatus, GenerationContext, Workflow};
use serde_json::{Map, Value};
use tracing::info;

use crate::app;
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Subcommand: generate
// ---------------------------------------------------------------------------

pub async fn cmd_generate(
    config: &AppConfig,
    description: String,
    provider: Option<String>,
    url: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let service = app::build_service(config)?;
    let context = GenerationContext {
        url,
        preferred_provider: provider.or_else(|| config.service.preferred_provider.clone()),
        ..GenerationContext::default()
    };

    let workflow = service
        .generate_workflow(&description, &context)
        .await
        .context("workflow generation failed")?;
    if workflow.metadata.placeholder {
        eprintln!("  No provider produced a usable workflow; wrote a placeholder.");
    }

    let rendered = serde_json::to_string_pretty(&workflow)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), workflow_id = %workflow.id, "workflow written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

pub async fn cmd_run(
    config: &AppConfig,
    path: &Path,
    params: Vec<(String, Value)>,
) -> Result<()> {
    let workflow = load_workflow(path)?;
    let executor = app::build_executor(config);
    let params: Map<String, Value> = params.into_iter().collect();

    let summary = executor
        .execute(Arc::new(workflow), params)
        .await
        .context("workflow execution failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status == ExecutionStatus::Failed {
        bail!("execution {} failed", summary.execution_id);
    }
    Ok(())
}

/// Read a workflow file, assigning missing step ids.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow {}", path.display()))?;
    let mut workflow: Workflow = serde_json::from_str(&content)
        .with_context(|| format!("invalid workflow {}", path.display()))?;
    workflow.normalize();
    Ok(workflow)
}

// ---------------------------------------------------------------------------
// Subcommand: stats
// ---------------------------------------------------------------------------

pub fn cmd_stats(config: &AppConfig) -> Result<()> {
    let service = app::build_service(config)?;
    println!("{}", serde_json::to_string_pretty(&service.stats())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: providers
// ---------------------------------------------------------------------------

pub async fn cmd_providers(config: &AppConfig) -> Result<()> {
    let orchestrator = app::build_orchestrator(config)?;

    println!();
    println!("  Providers (in declaration order):");
    for provider in orchestrator.provider_configs() {
        let credential = if !provider.requires_credential() {
            "not required"
        } else if orchestrator.has_credential(&provider.id).await {
            "present"
        } else {
            "missing"
        };
        println!(
            "    {:<14} {:<12} {:<36} credential: {credential}",
            provider.id,
            provider.kind.as_str(),
            provider.model,
        );
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_file_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(
            &path,
            r##"{"name": "Search", "steps": [
                {"type": "navigate", "url": "https://example.com"},
                {"type": "input", "selector": "#q", "value": "{{query}}"}
            ]}"##,
        )
        .unwrap();

        let workflow = load_workflow(&path).unwrap();
        assert_eq!(workflow.name, "Search");
        let ids: Vec<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["step_1", "step_2"]);
    }

    #[test]
    fn missing_workflow_file_is_reported() {
        let err = load_workflow(Path::new("/nonexistent/wf.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read workflow"));
    }

    #[tokio::test]
    async fn dry_run_executes_workflow_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(
            &path,
            r#"{"name": "Alert", "steps": [
                {"type": "alert", "message": "hello {{who}}"}
            ]}"#,
        )
        .unwrap();

        let params = vec![("who".to_owned(), Value::String("world".into()))];
        cmd_run(&AppConfig::default(), &path, params).await.unwrap();
    }
}
