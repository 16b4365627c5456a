//! Message-level API over generation and execution.
//!
//! Callers send a [`Request`] and get a [`Response`]
//! (`{success, data?, error?}`).  Requests are tagged by `type`:
//!
//! | type                | payload                         | data                 |
//! |---------------------|---------------------------------|----------------------|
//! | `GENERATE_WORKFLOW` | `description`, `context`        | workflow             |
//! | `EXECUTE_WORKFLOW`  | `workflowId`, `parameters`      | execution summary    |
//! | `GET_STATS`         |                                 | service stats        |
//! | `CLEAR_CACHE`       |                                 | `{cleared}`          |
//! | `GET_WORKFLOW`      | `workflowId`                    | workflow             |
//! | `CORRECT_WORKFLOW`  | `workflowId`, `correction`      | corrected workflow   |
//! | `LIST_EXECUTIONS`   |                                 | live executions      |
//! | `CANCEL_EXECUTION`  | `executionId`                   | `{cancelled}`        |
//!
//! When no provider can produce a workflow the caller receives a
//! placeholder workflow explaining the failure instead of an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoflow_agent::{Orchestrator, ProviderMetrics};
use autoflow_kernel::{CancellationToken, RateLimiterStatus, RequestReceiver};
use autoflow_store::{CacheStatsSnapshot, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{IntentError, Result};
use crate::executor::{ExecutionSummary, WorkflowExecutor};
use crate::generator::{GenerationContext, WorkflowGenerator};
use crate::registry::ExecutionInfo;
use crate::workflow::{Workflow, WorkflowCorrection};

/// Store namespace for workflows, keyed by workflow id.
pub const WORKFLOWS: &str = "workflows";
/// Store namespace for finished execution summaries.
pub const EXECUTIONS: &str = "executions";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GenerateWorkflow {
        description: String,
        #[serde(default)]
        context: GenerationContext,
    },
    #[serde(rename_all = "camelCase")]
    ExecuteWorkflow {
        workflow_id: Uuid,
        #[serde(default)]
        parameters: Map<String, Value>,
    },
    GetStats,
    ClearCache,
    #[serde(rename_all = "camelCase")]
    GetWorkflow { workflow_id: Uuid },
    #[serde(rename_all = "camelCase")]
    CorrectWorkflow {
        workflow_id: Uuid,
        correction: WorkflowCorrection,
    },
    ListExecutions,
    #[serde(rename_all = "camelCase")]
    CancelExecution { execution_id: Uuid },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerateWorkflow { .. } => "GENERATE_WORKFLOW",
            Self::ExecuteWorkflow { .. } => "EXECUTE_WORKFLOW",
            Self::GetStats => "GET_STATS",
            Self::ClearCache => "CLEAR_CACHE",
            Self::GetWorkflow { .. } => "GET_WORKFLOW",
            Self::CorrectWorkflow { .. } => "CORRECT_WORKFLOW",
            Self::ListExecutions => "LIST_EXECUTIONS",
            Self::CancelExecution { .. } => "CANCEL_EXECUTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Payload of `GET_STATS`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub provider_metrics: BTreeMap<String, ProviderMetrics>,
    pub rate_limiter_status: BTreeMap<String, RateLimiterStatus>,
    pub cache_size: usize,
    pub cache_stats: CacheStatsSnapshot,
    pub active_executions: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct WorkflowService {
    generator: WorkflowGenerator,
    executor: WorkflowExecutor,
    store: Arc<dyn KeyValueStore>,
    shutdown: CancellationToken,
}

impl WorkflowService {
    pub fn new(
        generator: WorkflowGenerator,
        executor: WorkflowExecutor,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            generator,
            executor,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        self.generator.orchestrator()
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    /// Cancel every in-flight generation and execution.
    pub fn shutdown(&self) {
        info!("shutting down workflow service");
        self.shutdown.cancel();
    }

    /// Handle one request.  Never fails; errors become `success: false`.
    pub async fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        debug!(request = kind, "handling request");
        match self.dispatch(request).await {
            Ok(data) => Response::ok(data),
            Err(error) => {
                warn!(request = kind, %error, "request failed");
                Response::err(error)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value> {
        let data = match request {
            Request::GenerateWorkflow {
                description,
                context,
            } => serde_json::to_value(self.generate_workflow(&description, &context).await?)?,
            Request::ExecuteWorkflow {
                workflow_id,
                parameters,
            } => serde_json::to_value(self.execute_workflow(workflow_id, parameters).await?)?,
            Request::GetStats => serde_json::to_value(self.stats())?,
            Request::ClearCache => json!({ "cleared": self.clear_cache() }),
            Request::GetWorkflow { workflow_id } => {
                serde_json::to_value(self.workflow(workflow_id).await?)?
            }
            Request::CorrectWorkflow {
                workflow_id,
                correction,
            } => serde_json::to_value(self.correct_workflow(workflow_id, correction).await?)?,
            Request::ListExecutions => serde_json::to_value(self.executions())?,
            Request::CancelExecution { execution_id } => {
                self.cancel_execution(execution_id)?;
                json!({ "cancelled": execution_id })
            }
        };
        Ok(data)
    }

    /// Generate and store a workflow.  Falls back to a placeholder when no
    /// provider could produce usable output.
    pub async fn generate_workflow(
        &self,
        description: &str,
        context: &GenerationContext,
    ) -> Result<Workflow> {
        if description.trim().is_empty() {
            return Err(IntentError::InvalidWorkflow {
                reason: "description is empty".into(),
            });
        }

        let workflow = match self
            .generator
            .generate(description, context, &self.shutdown)
            .await
        {
            Ok(generated) => generated.workflow,
            Err(IntentError::Agent(error)) if error.is_exhaustion() => {
                warn!(%error, "generation failed, returning placeholder workflow");
                Workflow::placeholder(description, &error.to_string())
            }
            Err(error @ IntentError::GenerationUnusable { .. }) => {
                warn!(%error, "generated text unusable, returning placeholder workflow");
                Workflow::placeholder(description, &error.to_string())
            }
            Err(error) => return Err(error),
        };

        self.store
            .save(WORKFLOWS, &workflow.id.to_string(), &workflow)
            .await?;
        Ok(workflow)
    }

    /// Run a stored workflow and feed the outcome back into provider
    /// ranking.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        parameters: Map<String, Value>,
    ) -> Result<ExecutionSummary> {
        let workflow = self.workflow(workflow_id).await?;
        let summary = self
            .executor
            .execute_with_cancel(Arc::new(workflow), parameters, &self.shutdown)
            .await?;

        if let Some(provider) = &summary.provider {
            self.orchestrator()
                .metrics()
                .record_feedback(provider, summary.is_clean());
        }
        self.store
            .save(EXECUTIONS, &summary.execution_id.to_string(), &summary)
            .await?;
        Ok(summary)
    }

    pub async fn workflow(&self, workflow_id: Uuid) -> Result<Workflow> {
        self.store
            .load::<Workflow>(WORKFLOWS, &workflow_id.to_string())
            .await?
            .ok_or_else(|| IntentError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    pub async fn correct_workflow(
        &self,
        workflow_id: Uuid,
        correction: WorkflowCorrection,
    ) -> Result<Workflow> {
        let mut workflow = self.workflow(workflow_id).await?;
        workflow.apply_correction(correction)?;
        self.store
            .save(WORKFLOWS, &workflow_id.to_string(), &workflow)
            .await?;
        info!(%workflow_id, steps = workflow.steps.len(), "workflow corrected");
        Ok(workflow)
    }

    pub fn stats(&self) -> ServiceStats {
        let orchestrator = self.orchestrator();
        ServiceStats {
            provider_metrics: orchestrator.metrics().snapshot(),
            rate_limiter_status: orchestrator.rate_limiter_status(),
            cache_size: orchestrator.cache_size(),
            cache_stats: orchestrator.cache_stats(),
            active_executions: self.executor.registry().len(),
        }
    }

    pub fn clear_cache(&self) -> usize {
        let cleared = self.orchestrator().clear_cache();
        info!(cleared, "response cache cleared");
        cleared
    }

    pub fn executions(&self) -> Vec<ExecutionInfo> {
        self.executor.registry().list()
    }

    pub fn cancel_execution(&self, execution_id: Uuid) -> Result<()> {
        if self.executor.registry().cancel(&execution_id) {
            Ok(())
        } else {
            Err(IntentError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })
        }
    }

    /// Answer requests from `receiver` until every sender is gone.  Each
    /// request runs on its own task so a long execution never blocks
    /// `GET_STATS` or `CANCEL_EXECUTION`.
    pub async fn serve(self: Arc<Self>, mut receiver: RequestReceiver<Request, Response>) {
        info!("workflow service listening");
        while let Some(envelope) = receiver.recv().await {
            let service = Arc::clone(&self);
            tokio::spawn(async move {
                let (request, responder) = envelope.into_parts();
                let response = service.handle(request).await;
                if !responder.respond(response) {
                    trace!("caller dropped before the response was ready");
                }
            });
        }
        info!("workflow service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let id = Uuid::now_v7();
        let request: Request = serde_json::from_value(json!({
            "type": "EXECUTE_WORKFLOW",
            "workflowId": id,
            "parameters": {"q": 1}
        }))
        .unwrap();
        assert_eq!(request.kind(), "EXECUTE_WORKFLOW");
        let Request::ExecuteWorkflow { workflow_id, parameters } = request else {
            panic!("wrong variant");
        };
        assert_eq!(workflow_id, id);
        assert_eq!(parameters["q"], 1);

        let stats: Request = serde_json::from_value(json!({"type": "GET_STATS"})).unwrap();
        assert_eq!(stats, Request::GetStats);
    }

    #[test]
    fn generate_request_defaults_context() {
        let request: Request =
            serde_json::from_value(json!({"type": "GENERATE_WORKFLOW", "description": "d"}))
                .unwrap();
        assert_eq!(
            request,
            Request::GenerateWorkflow {
                description: "d".into(),
                context: GenerationContext::default(),
            }
        );
    }

    #[test]
    fn response_shape() {
        assert_eq!(
            serde_json::to_value(Response::ok(json!(1))).unwrap(),
            json!({"success": true, "data": 1})
        );
        assert_eq!(
            serde_json::to_value(Response::err("boom")).unwrap(),
            json!({"success": false, "error": "boom"})
        );
    }
}
