//! Workflow execution engine.
//!
//! Runs a workflow's steps strictly in declared order.  For each step:
//!
//! 1. Declared conditions are ANDed; if any is false the step is recorded
//!    as `Skipped` and nothing is invoked.
//! 2. The action is dispatched: page actions and alerts go to the
//!    registered [`StepRunner`](crate::runner::StepRunner), `api` calls are
//!    made directly, `transform`, `condition` and `loop` are evaluated in
//!    place.  Nested steps run inside their parent's slot.
//! 3. A failing step is handled by its error mode (the step's own, or the
//!    workflow's): `skip` records the error and continues, `retry` re-runs
//!    the step through a step-scoped [`RetryPolicy`], `fail` aborts the
//!    execution.
//! 4. The workflow's fixed inter-step delay is applied after every
//!    top-level step.
//!
//! The execution is registered in the [`ExecutionRegistry`] for its whole
//! lifetime and can be cancelled from there.

use std::sync::Arc;
use std::time::Duration;

use autoflow_kernel::{CancellationToken, RetryConfig, RetryError, RetryOutcome, RetryPolicy};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{LoopAction, StepAction};
use crate::api::ApiClient;
use crate::condition::evaluate_all;
use crate::context::{
    ExecutionContext, ExecutionError, ExecutionStatus, StepOutcome, StepResult,
};
use crate::error::{IntentError, Result};
use crate::registry::ExecutionRegistry;
use crate::runner::StepRunnerRegistry;
use crate::scope::Scope;
use crate::transform::{self, TransformAction};
use crate::workflow::{ErrorHandling, ErrorMode, Step, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Budget for steps in `retry` mode.
    pub step_retry: RetryConfig,
    /// Deadline for delegated steps without their own `timeout_ms`.
    pub default_step_timeout_ms: u64,
    /// Deadline for `api` steps without their own timeout.
    pub api_timeout_ms: u64,
    /// Cap on loop iterations unless the workflow or step sets one.
    pub max_loop_iterations: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 500,
                max_delay_ms: 10_000,
                attempt_timeout_ms: 0,
            },
            default_step_timeout_ms: 30_000,
            api_timeout_ms: 30_000,
            max_loop_iterations: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Terminal report of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub results: Vec<StepResult>,
    pub errors: Vec<ExecutionError>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Provider that generated the workflow, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ExecutionSummary {
    /// Succeeded without a single recorded step error.
    pub fn is_clean(&self) -> bool {
        self.status == ExecutionStatus::Succeeded && self.errors.is_empty()
    }
}

/// Output of a dispatched action.
struct Dispatched {
    payload: Value,
    sub_results: Vec<StepResult>,
    /// Terminal error raised by a nested step.  `sub_results` still holds
    /// every nested result up to and including the one that raised it.
    halted: Option<IntentError>,
}

impl Dispatched {
    fn payload(payload: Value) -> Self {
        Self {
            payload,
            sub_results: Vec::new(),
            halted: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct WorkflowExecutor {
    config: ExecutorConfig,
    runners: StepRunnerRegistry,
    api: ApiClient,
    registry: ExecutionRegistry,
}

impl WorkflowExecutor {
    pub fn new(config: ExecutorConfig, runners: StepRunnerRegistry) -> Self {
        let api = ApiClient::new(Duration::from_millis(config.api_timeout_ms));
        Self {
            config,
            runners,
            api,
            registry: ExecutionRegistry::new(),
        }
    }

    pub fn with_api_client(mut self, api: ApiClient) -> Self {
        self.api = api;
        self
    }

    pub fn with_registry(mut self, registry: ExecutionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    /// Run `workflow` to completion.
    pub async fn execute(
        &self,
        workflow: Arc<Workflow>,
        params: Map<String, Value>,
    ) -> Result<ExecutionSummary> {
        self.execute_with_cancel(workflow, params, &CancellationToken::new())
            .await
    }

    /// Run `workflow`, stopping early if `cancel` fires.
    ///
    /// Only a structurally invalid workflow is an `Err`; step failures and
    /// cancellation are reported in the summary.
    pub async fn execute_with_cancel(
        &self,
        workflow: Arc<Workflow>,
        params: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary> {
        workflow.validate()?;

        let execution_id = Uuid::now_v7();
        let guard = self
            .registry
            .begin(execution_id, workflow.id, &workflow.name, cancel);
        let token = guard.token().clone();
        let started = Instant::now();

        let mut ctx = ExecutionContext::new(execution_id, Arc::clone(&workflow), params);
        ctx.set_status(ExecutionStatus::Running);
        info!(
            %execution_id,
            workflow_id = %workflow.id,
            name = %workflow.name,
            steps = workflow.steps.len(),
            "starting workflow execution"
        );

        let delay = Duration::from_millis(workflow.settings.step_delay_ms);
        let mut aborted = false;
        for (index, step) in workflow.steps.iter().enumerate() {
            ctx.advance_to(index);
            guard.set_current_step(&step.id);

            let (result, abort) = self.run_step(step, &mut ctx, &token).await;
            ctx.results.push(result);
            if let Some(error) = abort {
                warn!(%execution_id, step_id = %step.id, %error, "execution stopped");
                if matches!(error, IntentError::ExecutionCancelled) {
                    ctx.record_error(&step.id, error.to_string());
                }
                aborted = true;
                break;
            }

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        warn!(%execution_id, "execution cancelled during step delay");
                        ctx.record_error(&step.id, IntentError::ExecutionCancelled.to_string());
                        aborted = true;
                        break;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        ctx.set_status(if aborted {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        });
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            %execution_id,
            status = ?ctx.status(),
            errors = ctx.errors.len(),
            duration_ms,
            "workflow execution complete"
        );

        Ok(ExecutionSummary {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            status: ctx.status(),
            results: std::mem::take(&mut ctx.results),
            errors: std::mem::take(&mut ctx.errors),
            duration_ms,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            provider: workflow.metadata.provider.clone(),
        })
    }

    /// Run one step under its error policy.
    ///
    /// The second element is a terminal error (abort or cancellation) that
    /// must stop the enclosing step list.
    fn run_step<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, (StepResult, Option<IntentError>)> {
        Box::pin(async move {
            let started = Instant::now();
            let mut result = StepResult::skipped(step);

            if cancel.is_cancelled() {
                result.outcome = StepOutcome::Error;
                result.error = Some(IntentError::ExecutionCancelled.to_string());
                return (result, Some(IntentError::ExecutionCancelled));
            }

            if !evaluate_all(&step.conditions, &*ctx) {
                debug!(step_id = %step.id, "conditions not met, skipping step");
                return (result, None);
            }

            let policy = step
                .error_handling
                .clone()
                .unwrap_or_else(|| ctx.workflow.error_handling.clone());
            debug!(step_id = %step.id, step_type = %step.step_type(), mode = ?policy.mode, "running step");

            let (outcome, attempts) = match policy.mode {
                ErrorMode::Retry => self.dispatch_with_retry(step, ctx, cancel, &policy).await,
                ErrorMode::Fail | ErrorMode::Skip => (self.dispatch(step, ctx, cancel).await, 1),
            };
            result.attempts = attempts;
            result.duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(dispatched) => {
                    result.sub_results = dispatched.sub_results;
                    if let Some(error) = dispatched.halted {
                        result.outcome = StepOutcome::Error;
                        result.error = Some(error.to_string());
                        return (result, Some(error));
                    }
                    result.outcome = if attempts > 1 {
                        StepOutcome::Retried
                    } else {
                        StepOutcome::Success
                    };
                    ctx.record_output(step, &dispatched.payload);
                    result.payload = dispatched.payload;
                    (result, None)
                }
                Err(error) => {
                    result.outcome = StepOutcome::Error;
                    result.error = Some(error.to_string());
                    if error.is_terminal() {
                        return (result, Some(error));
                    }
                    ctx.record_error(&step.id, error.to_string());
                    if policy.mode == ErrorMode::Fail {
                        warn!(step_id = %step.id, %error, "step failed, aborting execution");
                        let abort = IntentError::ExecutionAborted {
                            step_id: step.id.clone(),
                            reason: error.to_string(),
                        };
                        return (result, Some(abort));
                    }
                    warn!(step_id = %step.id, %error, "step failed, continuing");
                    (result, None)
                }
            }
        })
    }

    /// Dispatch through a step-scoped retry policy.  Terminal errors are
    /// never retried.
    async fn dispatch_with_retry(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
        policy: &ErrorHandling,
    ) -> (Result<Dispatched>, u32) {
        let mut config = self.config.step_retry.clone();
        if let Some(max_attempts) = policy.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(delay) = policy.retry_delay_ms {
            config.base_delay_ms = delay;
        }
        let retry = RetryPolicy::new(config);

        let cell = tokio::sync::Mutex::new(ctx);
        let outcome = retry
            .execute_if(
                cancel,
                |attempt| {
                    let cell = &cell;
                    async move {
                        let mut ctx = cell.lock().await;
                        if attempt > 1 {
                            debug!(step_id = %step.id, attempt, "retrying step");
                        }
                        self.dispatch(step, &mut **ctx, cancel).await
                    }
                },
                |error: &IntentError| !error.is_terminal(),
            )
            .await;

        match outcome {
            Ok(RetryOutcome { value, attempts }) => (Ok(value), attempts),
            Err(RetryError::Failed { attempts, error }) => (Err(error), attempts),
            Err(RetryError::Cancelled { attempts }) => {
                (Err(IntentError::ExecutionCancelled), attempts)
            }
            Err(RetryError::TimedOut { attempts, after }) => (
                Err(IntentError::StepTimeout {
                    step_id: step.id.clone(),
                    after_ms: after.as_millis() as u64,
                }),
                attempts,
            ),
        }
    }

    /// Perform a step's action once.
    async fn dispatch(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Dispatched> {
        let action = step.action.resolved(&step.id, &*ctx)?;
        match &action {
            StepAction::Api(request) => {
                let call = self.api.call(&step.id, request);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(IntentError::ExecutionCancelled),
                    result = call => result.map(Dispatched::payload),
                }
            }
            StepAction::Transform(t) => self.run_transform(step, t, ctx).map(Dispatched::payload),
            StepAction::Condition(c) => {
                let holds = evaluate_all(&c.conditions, &*ctx);
                debug!(step_id = %step.id, holds, "condition evaluated");
                let branch = if holds { &c.then } else { &c.otherwise };
                let (sub_results, halted) = self.run_nested(branch, ctx, cancel).await;
                Ok(Dispatched {
                    payload: Value::Bool(holds),
                    sub_results,
                    halted,
                })
            }
            StepAction::Loop(l) => self.run_loop(step, l, ctx, cancel).await,
            StepAction::Navigate(_)
            | StepAction::Click(_)
            | StepAction::Input(_)
            | StepAction::Extract(_)
            | StepAction::Wait(_)
            | StepAction::Alert(_) => {
                let resolved = Step {
                    action: action.clone(),
                    ..step.clone()
                };
                self.run_delegated(&resolved, cancel)
                    .await
                    .map(Dispatched::payload)
            }
        }
    }

    async fn run_delegated(&self, step: &Step, cancel: &CancellationToken) -> Result<Value> {
        let runner = self.runners.get(step.step_type())?;
        let mut timeout_ms = step
            .timeout_ms
            .unwrap_or(self.config.default_step_timeout_ms);
        if step.timeout_ms.is_none() {
            if let StepAction::Wait(wait) = &step.action {
                timeout_ms = timeout_ms.saturating_add(wait.duration_ms.unwrap_or(0));
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(IntentError::ExecutionCancelled),
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), runner.run(step)) => {
                match result {
                    Ok(output) => output,
                    Err(_) => Err(IntentError::StepTimeout {
                        step_id: step.id.clone(),
                        after_ms: timeout_ms,
                    }),
                }
            }
        }
    }

    fn run_transform(
        &self,
        step: &Step,
        action: &TransformAction,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let input = match action.source.as_deref().map(str::trim) {
            None | Some("") => ctx
                .last_output
                .clone()
                .ok_or_else(|| IntentError::step(&step.id, "no previous output to transform"))?,
            Some(path) if path.starts_with('$') => ctx
                .lookup(&path[1..])
                .ok_or_else(|| IntentError::step(&step.id, format!("`{path}` is undefined")))?,
            Some(name) => ctx
                .step_outputs
                .get(name)
                .or_else(|| ctx.variables.get(name))
                .cloned()
                .ok_or_else(|| {
                    IntentError::step(&step.id, format!("no step output or variable named `{name}`"))
                })?,
        };
        transform::apply(&action.op, input, ctx).map_err(|e| IntentError::step(&step.id, e.to_string()))
    }

    async fn run_loop(
        &self,
        step: &Step,
        action: &LoopAction,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Dispatched> {
        let items = match &action.items {
            Value::Array(items) => items.clone(),
            Value::String(path) if path.starts_with('$') => match ctx.lookup(&path[1..]) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(IntentError::step(&step.id, format!("`{path}` is not an array")));
                }
                None => {
                    return Err(IntentError::step(&step.id, format!("`{path}` is undefined")));
                }
            },
            other => {
                return Err(IntentError::step(
                    &step.id,
                    format!("loop items must be an array, got {other}"),
                ));
            }
        };

        let limit = action
            .max_iterations
            .or(ctx.workflow.settings.max_loop_iterations)
            .unwrap_or(self.config.max_loop_iterations);
        if items.len() > limit {
            return Err(IntentError::step(
                &step.id,
                format!("loop over {} items exceeds the limit of {limit}", items.len()),
            ));
        }

        let saved_item = ctx.variables.get(&action.item_variable).cloned();
        let saved_index = ctx.variables.get(&action.index_variable).cloned();

        let mut iterations = Vec::with_capacity(items.len());
        let mut sub_results = Vec::new();
        let mut halted = None;
        for (index, item) in items.into_iter().enumerate() {
            ctx.set_variable(&action.item_variable, item);
            ctx.set_variable(&action.index_variable, Value::from(index));
            ctx.last_output = None;
            let (results, error) = self.run_nested(&action.steps, ctx, cancel).await;
            sub_results.extend(results);
            if error.is_some() {
                halted = error;
                break;
            }
            iterations.push(ctx.last_output.clone().unwrap_or(Value::Null));
        }

        ctx.restore_variable(&action.item_variable, saved_item);
        ctx.restore_variable(&action.index_variable, saved_index);

        if halted.is_none() {
            debug!(step_id = %step.id, iterations = iterations.len(), "loop complete");
        }
        Ok(Dispatched {
            payload: Value::Array(iterations),
            sub_results,
            halted,
        })
    }

    /// Run nested steps in order; stops at the first terminal error, which
    /// is returned alongside the results gathered so far.
    async fn run_nested(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> (Vec<StepResult>, Option<IntentError>) {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let (result, abort) = self.run_step(step, ctx, cancel).await;
            results.push(result);
            if abort.is_some() {
                return (results, abort);
            }
        }
        (results, None)
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("config", &self.config)
            .field("runners", &self.runners)
            .field("live", &self.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
