//! Natural-language to workflow generation.
//!
//! The generator builds a prompt from the user's request and page context,
//! asks the [`Orchestrator`] for text and recovers a [`Workflow`] from it:
//! a JSON workflow is parsed and normalized; a plain list of steps becomes
//! a workflow of alert steps.

use std::sync::Arc;

use autoflow_agent::{Extracted, GenerateOptions, Orchestrator, extract_structured};
use autoflow_kernel::CancellationToken;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IntentError, Result};
use crate::workflow::Workflow;

// ---------------------------------------------------------------------------
// System prompt
// ---------------------------------------------------------------------------

const WORKFLOW_SYSTEM_PROMPT: &str = r#"You convert a user's request into a browser automation workflow.

Respond ONLY with a JSON object:
{
  "name": "<short name>",
  "description": "<one sentence>",
  "steps": [
    {"id": "step_1", "type": "<step type>", "description": "<what it does>", "action": { ... }}
  ],
  "variables": {"<name>": {"type": "string|number|boolean|array|object", "default": <value>}},
  "error_handling": "skip|retry|fail",
  "settings": {"step_delay_ms": 0}
}

Step types and their action fields:
- navigate: {"url": "..."}
- click: {"selector": "..."}
- input: {"selector": "...", "value": "..."}
- extract: {"selector": "...", "attribute": "...", "multiple": true|false}
- wait: {"duration_ms": 1000} or {"selector": "..."}
- api: {"method": "GET", "url": "...", "headers": {}, "body": {}}
- transform: {"source": "<step id>", "operation": "filter|map|aggregate|parse|stringify", ...}
- condition: {"conditions": [{"left": "$path", "operator": "equals", "right": ...}], "then": [...], "else": [...]}
- loop: {"items": "$path", "steps": [...]}
- alert: {"message": "...", "level": "info|success|warning|error"}

Steps may carry "conditions" (all must hold) and "output" (a variable name for the result).
Reference earlier values with "$path" in conditions and "{{path}}" inside action fields."#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Page and user context sent along with a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    /// Free-form hints (visible elements, prior corrections, ...).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A generated workflow and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedWorkflow {
    pub workflow: Workflow,
    pub provider_id: String,
    pub cached: bool,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WorkflowGenerator {
    orchestrator: Arc<Orchestrator>,
}

impl WorkflowGenerator {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Generate a workflow for `description`.
    ///
    /// A reply that holds no usable workflow is rejected inside the
    /// provider attempt, so it is retried and then fails over like a
    /// malformed response.  Provider failures surface as
    /// [`IntentError::Agent`].
    pub async fn generate(
        &self,
        description: &str,
        context: &GenerationContext,
        cancel: &CancellationToken,
    ) -> Result<GeneratedWorkflow> {
        let prompt = build_prompt(description, context);
        let options = GenerateOptions {
            preferred_provider: context.preferred_provider.clone(),
            system_prompt: Some(WORKFLOW_SYSTEM_PROMPT.to_owned()),
            temperature: context.temperature,
            ..GenerateOptions::default()
        };

        let generation = self
            .orchestrator
            .generate_validated(&prompt, &options, cancel, |text| {
                parse_workflow(text, description)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .await?;
        debug!(
            provider = %generation.provider_id,
            cached = generation.cached,
            chars = generation.text.len(),
            "received generated workflow text"
        );

        let mut workflow = parse_workflow(&generation.text, description)?;
        workflow.metadata.provider = Some(generation.provider_id.clone());
        workflow.metadata.model = Some(generation.model.clone());
        workflow.metadata.cached = generation.cached;

        info!(
            workflow_id = %workflow.id,
            provider = %generation.provider_id,
            steps = workflow.steps.len(),
            "workflow generated"
        );
        Ok(GeneratedWorkflow {
            workflow,
            provider_id: generation.provider_id,
            cached: generation.cached,
        })
    }
}

/// Recover a workflow from generated text.
fn parse_workflow(text: &str, description: &str) -> Result<Workflow> {
    match extract_structured(text) {
        Some(Extracted::Json(value)) => Workflow::from_generated(value, description),
        Some(Extracted::Steps(lines)) => Workflow::from_step_lines(&lines, description),
        None => Err(IntentError::GenerationUnusable {
            reason: "no JSON or step list found in the response".into(),
        }),
    }
}

/// User prompt: the request followed by whatever page context is known.
fn build_prompt(description: &str, context: &GenerationContext) -> String {
    let mut prompt = format!("Request: {}", description.trim());
    if let Some(url) = &context.url {
        prompt.push_str(&format!("\nCurrent page: {url}"));
    }
    if let Some(title) = &context.page_title {
        prompt.push_str(&format!("\nPage title: {title}"));
    }
    if !context.hints.is_empty() {
        prompt.push_str("\nContext:");
        for hint in &context.hints {
            prompt.push_str(&format!("\n- {hint}"));
        }
    }
    prompt
}
